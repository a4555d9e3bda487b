//! CSV rendering of derived series for spreadsheet import.

use crate::error::{AppError, Result};
use crate::models::DerivedPoint;
use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Ts,
    ActivePowerW,
    TotalImportKwh,
    TotalCurrentA,
    ActiveCurrentL1A,
    ActiveCurrentL2A,
    ActiveCurrentL3A,
    VoltageL1V,
    VoltageL2V,
    VoltageL3V,
    ImbalanceA,
    ImbalancePct,
}

impl Column {
    pub const DEFAULT: [Column; 11] = [
        Column::Ts,
        Column::ActivePowerW,
        Column::TotalCurrentA,
        Column::ActiveCurrentL1A,
        Column::ActiveCurrentL2A,
        Column::ActiveCurrentL3A,
        Column::VoltageL1V,
        Column::VoltageL2V,
        Column::VoltageL3V,
        Column::ImbalanceA,
        Column::ImbalancePct,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Ts => "ts",
            Column::ActivePowerW => "active_power_w",
            Column::TotalImportKwh => "total_import_kwh",
            Column::TotalCurrentA => "total_current_a",
            Column::ActiveCurrentL1A => "active_current_l1_a",
            Column::ActiveCurrentL2A => "active_current_l2_a",
            Column::ActiveCurrentL3A => "active_current_l3_a",
            Column::VoltageL1V => "voltage_l1_v",
            Column::VoltageL2V => "voltage_l2_v",
            Column::VoltageL3V => "voltage_l3_v",
            Column::ImbalanceA => "imbalance_a",
            Column::ImbalancePct => "imbalance_pct",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        let column = match name {
            "ts" => Column::Ts,
            "active_power_w" => Column::ActivePowerW,
            "total_import_kwh" => Column::TotalImportKwh,
            "total_current_a" => Column::TotalCurrentA,
            "active_current_l1_a" => Column::ActiveCurrentL1A,
            "active_current_l2_a" => Column::ActiveCurrentL2A,
            "active_current_l3_a" => Column::ActiveCurrentL3A,
            "voltage_l1_v" => Column::VoltageL1V,
            "voltage_l2_v" => Column::VoltageL2V,
            "voltage_l3_v" => Column::VoltageL3V,
            "imbalance_a" => Column::ImbalanceA,
            "imbalance_pct" => Column::ImbalancePct,
            other => {
                return Err(AppError::Validation(format!("unknown column '{}'", other)));
            }
        };
        Ok(column)
    }

    fn number(self, point: &DerivedPoint) -> Option<f64> {
        let m = &point.measurement;
        match self {
            Column::Ts => None,
            Column::ActivePowerW => m.active_power_w,
            Column::TotalImportKwh => m.total_import_kwh,
            Column::TotalCurrentA => Some(point.total_current_a),
            Column::ActiveCurrentL1A => m.active_current_l1_a,
            Column::ActiveCurrentL2A => m.active_current_l2_a,
            Column::ActiveCurrentL3A => m.active_current_l3_a,
            Column::VoltageL1V => m.voltage_l1_v,
            Column::VoltageL2V => m.voltage_l2_v,
            Column::VoltageL3V => m.voltage_l3_v,
            Column::ImbalanceA => Some(point.imbalance_a),
            Column::ImbalancePct => Some(point.imbalance_pct),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalMark {
    #[default]
    Dot,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// RFC 3339 with whole seconds and a `Z` suffix.
    #[default]
    Iso,
    /// `YYYY-MM-DD HH:MM:SS`, which spreadsheets read as a datetime.
    Sv,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFormat {
    pub separator: char,
    pub decimal: DecimalMark,
    pub time_format: TimeFormat,
    pub columns: Vec<Column>,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            separator: ',',
            decimal: DecimalMark::Dot,
            time_format: TimeFormat::Iso,
            columns: Column::DEFAULT.to_vec(),
        }
    }
}

impl CsvFormat {
    /// Build from the raw query parameters; `None` means "use the default".
    pub fn from_params(
        sep: Option<&str>,
        decimal: Option<&str>,
        timefmt: Option<&str>,
        cols: Option<&str>,
    ) -> Result<Self> {
        let mut format = Self::default();

        if let Some(sep) = sep {
            format.separator = parse_separator(sep)?;
        }

        if let Some(decimal) = decimal {
            format.decimal = match decimal.to_ascii_lowercase().as_str() {
                "dot" => DecimalMark::Dot,
                "comma" => DecimalMark::Comma,
                other => {
                    return Err(AppError::Validation(format!(
                        "decimal must be 'dot' or 'comma', got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(timefmt) = timefmt {
            format.time_format = match timefmt.to_ascii_lowercase().as_str() {
                "iso" => TimeFormat::Iso,
                "sv" => TimeFormat::Sv,
                other => {
                    return Err(AppError::Validation(format!(
                        "timefmt must be 'iso' or 'sv', got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(cols) = cols {
            let columns = cols
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(Column::parse)
                .collect::<Result<Vec<_>>>()?;
            if !columns.is_empty() {
                format.columns = columns;
            }
        }

        Ok(format)
    }

    pub fn header(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name()).collect();
        let mut line = names.join(&self.separator.to_string());
        line.push('\n');
        line
    }

    pub fn row(&self, point: &DerivedPoint) -> String {
        let cells: Vec<String> = self
            .columns
            .iter()
            .map(|column| match column {
                Column::Ts => self.timestamp(point.measurement.measured_at),
                other => other
                    .number(point)
                    .map(|v| self.number(v))
                    .unwrap_or_default(),
            })
            .collect();
        let mut line = cells.join(&self.separator.to_string());
        line.push('\n');
        line
    }

    fn timestamp(&self, ts: DateTime<Utc>) -> String {
        match self.time_format {
            TimeFormat::Iso => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            TimeFormat::Sv => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Up to six decimals with trailing zeros dropped.
    fn number(&self, value: f64) -> String {
        let fixed = format!("{:.6}", value);
        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
        match self.decimal {
            DecimalMark::Dot => trimmed.to_string(),
            DecimalMark::Comma => trimmed.replace('.', ","),
        }
    }
}

fn parse_separator(sep: &str) -> Result<char> {
    if sep == "\\t" {
        return Ok('\t');
    }
    let mut chars = sep.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(AppError::Validation(format!(
            "sep must be a single character or \\t, got '{}'",
            sep
        ))),
    }
}

/// `p1_export_<from>_<to>.csv` with compact UTC timestamps.
pub fn file_name(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    format!(
        "p1_export_{}_{}.csv",
        from.format("%Y%m%dT%H%M%S"),
        to.format("%Y%m%dT%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::enrich;
    use crate::models::Measurement;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn point() -> DerivedPoint {
        enrich(Measurement {
            measured_at: Utc.with_ymd_and_hms(2025, 3, 14, 7, 5, 9).unwrap(),
            active_power_w: Some(1523.5),
            total_import_kwh: Some(10234.125),
            voltage_l1_v: Some(231.2),
            voltage_l2_v: None,
            voltage_l3_v: Some(229.0),
            active_current_l1_a: Some(4.0),
            active_current_l2_a: Some(6.0),
            active_current_l3_a: Some(5.0),
        })
    }

    #[test]
    fn test_default_header_omits_total_import() {
        let format = CsvFormat::default();
        assert_eq!(
            format.header(),
            "ts,active_power_w,total_current_a,active_current_l1_a,active_current_l2_a,\
active_current_l3_a,voltage_l1_v,voltage_l2_v,voltage_l3_v,imbalance_a,imbalance_pct\n"
        );
    }

    #[test]
    fn test_row_formatting_with_nulls() {
        let format = CsvFormat::default();
        assert_eq!(
            format.row(&point()),
            "2025-03-14T07:05:09Z,1523.5,15,4,6,5,231.2,,229,2,33.333333\n"
        );
    }

    #[test]
    fn test_excel_friendly_options() {
        let format = CsvFormat::from_params(
            Some(";"),
            Some("comma"),
            Some("sv"),
            Some("ts, total_import_kwh ,imbalance_pct"),
        )
        .unwrap();

        assert_eq!(format.header(), "ts;total_import_kwh;imbalance_pct\n");
        assert_eq!(
            format.row(&point()),
            "2025-03-14 07:05:09;10234,125;33,333333\n"
        );
    }

    #[test]
    fn test_tab_escape() {
        let format = CsvFormat::from_params(Some("\\t"), None, None, Some("ts,active_power_w"))
            .unwrap();
        assert_eq!(format.separator, '\t');
        assert_eq!(format.header(), "ts\tactive_power_w\n");
    }

    #[test]
    fn test_invalid_options_are_validation_errors() {
        for (sep, decimal, timefmt, cols) in [
            (Some(";;"), None, None, None),
            (Some(""), None, None, None),
            (None, Some("period"), None, None),
            (None, None, Some("unix"), None),
            (None, None, None, Some("ts,frequency_hz")),
        ] {
            let err = CsvFormat::from_params(sep, decimal, timefmt, cols).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_number_trimming() {
        let format = CsvFormat::default();
        assert_eq!(format.number(0.0), "0");
        assert_eq!(format.number(-350.0), "-350");
        assert_eq!(format.number(0.1234567), "0.123457");
    }

    #[test]
    fn test_file_name() {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 1, 2, 12, 30, 0).unwrap();
        assert_eq!(
            file_name(from, to),
            "p1_export_20250101T000000_20250102T123000.csv"
        );
    }
}
