use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored meter reading. Rows are append-only and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub measured_at: DateTime<Utc>,
    pub active_power_w: Option<f64>,
    pub total_import_kwh: Option<f64>,
    pub voltage_l1_v: Option<f64>,
    pub voltage_l2_v: Option<f64>,
    pub voltage_l3_v: Option<f64>,
    pub active_current_l1_a: Option<f64>,
    pub active_current_l2_a: Option<f64>,
    pub active_current_l3_a: Option<f64>,
}

impl Measurement {
    pub fn currents(&self) -> [Option<f64>; 3] {
        [
            self.active_current_l1_a,
            self.active_current_l2_a,
            self.active_current_l3_a,
        ]
    }
}

/// Per-minute means of every numeric column. Nulls are skipped per column,
/// so a column is `None` only when every row in the bucket lacked it.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedPoint {
    pub bucket_start: DateTime<Utc>,
    pub sample_count: i64,
    pub active_power_w: Option<f64>,
    pub total_import_kwh: Option<f64>,
    pub voltage_l1_v: Option<f64>,
    pub voltage_l2_v: Option<f64>,
    pub voltage_l3_v: Option<f64>,
    pub active_current_l1_a: Option<f64>,
    pub active_current_l2_a: Option<f64>,
    pub active_current_l3_a: Option<f64>,
}

impl AggregatedPoint {
    /// The bucket's means as a measurement stamped at the bucket start.
    pub fn as_measurement(&self) -> Measurement {
        Measurement {
            measured_at: self.bucket_start,
            active_power_w: self.active_power_w,
            total_import_kwh: self.total_import_kwh,
            voltage_l1_v: self.voltage_l1_v,
            voltage_l2_v: self.voltage_l2_v,
            voltage_l3_v: self.voltage_l3_v,
            active_current_l1_a: self.active_current_l1_a,
            active_current_l2_a: self.active_current_l2_a,
            active_current_l3_a: self.active_current_l3_a,
        }
    }
}

/// A measurement plus the fields computed on read. This is the only shape
/// viewers ever receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedPoint {
    #[serde(flatten)]
    pub measurement: Measurement,
    pub total_current_a: f64,
    pub imbalance_a: f64,
    pub imbalance_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<i64>,
}
