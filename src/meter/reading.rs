use crate::error::{AppError, Result};
use crate::models::Measurement;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

// Firmware versions disagree on key names. Each logical field lists its
// candidates in priority order; the first key holding a number wins.
const ACTIVE_POWER_W: &[&str] = &["active_power_w"];
const TOTAL_IMPORT_KWH: &[&str] = &[
    "total_power_import_kwh",
    "total_import_kwh",
    "total_import_t1_kwh",
];
const VOLTAGE_L1_V: &[&str] = &["voltage_l1_v", "active_voltage_l1_v"];
const VOLTAGE_L2_V: &[&str] = &["voltage_l2_v", "active_voltage_l2_v"];
const VOLTAGE_L3_V: &[&str] = &["voltage_l3_v", "active_voltage_l3_v"];
const CURRENT_L1_A: &[&str] = &["active_current_l1_a"];
const CURRENT_L2_A: &[&str] = &["active_current_l2_a"];
const CURRENT_L3_A: &[&str] = &["active_current_l3_a"];

/// One normalized snapshot from the meter, not yet timestamped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    pub active_power_w: Option<f64>,
    pub total_import_kwh: Option<f64>,
    pub voltage_l1_v: Option<f64>,
    pub voltage_l2_v: Option<f64>,
    pub voltage_l3_v: Option<f64>,
    pub active_current_l1_a: Option<f64>,
    pub active_current_l2_a: Option<f64>,
    pub active_current_l3_a: Option<f64>,
}

impl RawReading {
    pub fn from_json(body: &Value) -> Result<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| AppError::Fetch("expected a JSON object from meter".into()))?;

        Ok(Self {
            active_power_w: first_number(obj, ACTIVE_POWER_W),
            total_import_kwh: first_number(obj, TOTAL_IMPORT_KWH),
            voltage_l1_v: first_number(obj, VOLTAGE_L1_V),
            voltage_l2_v: first_number(obj, VOLTAGE_L2_V),
            voltage_l3_v: first_number(obj, VOLTAGE_L3_V),
            active_current_l1_a: first_number(obj, CURRENT_L1_A),
            active_current_l2_a: first_number(obj, CURRENT_L2_A),
            active_current_l3_a: first_number(obj, CURRENT_L3_A),
        })
    }

    pub fn into_measurement(self, measured_at: DateTime<Utc>) -> Measurement {
        Measurement {
            measured_at,
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

/// Null and non-numeric values count as absent; 0 is a real reading.
fn first_number(obj: &Map<String, Value>, candidates: &[&str]) -> Option<f64> {
    candidates
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_canonical_keys() {
        let body = json!({
            "active_power_w": -350.0,
            "total_power_import_kwh": 12345.678,
            "voltage_l1_v": 230.1,
            "voltage_l2_v": 231.2,
            "voltage_l3_v": 229.9,
            "active_current_l1_a": 4.0,
            "active_current_l2_a": 6.0,
            "active_current_l3_a": 5.0
        });

        let r = RawReading::from_json(&body).unwrap();
        assert_eq!(r.active_power_w, Some(-350.0));
        assert_eq!(r.total_import_kwh, Some(12345.678));
        assert_eq!(r.voltage_l2_v, Some(231.2));
        assert_eq!(r.active_current_l3_a, Some(5.0));
    }

    #[test]
    fn test_voltage_falls_back_to_active_voltage() {
        let body = json!({ "active_voltage_l1_v": 228.0, "voltage_l2_v": 230.0, "active_voltage_l2_v": 1.0 });

        let r = RawReading::from_json(&body).unwrap();
        assert_eq!(r.voltage_l1_v, Some(228.0));
        assert_eq!(r.voltage_l2_v, Some(230.0));
        assert_eq!(r.voltage_l3_v, None);
    }

    #[test]
    fn test_import_counter_priority() {
        let t1_only = json!({ "total_import_t1_kwh": 10.5 });
        assert_eq!(
            RawReading::from_json(&t1_only).unwrap().total_import_kwh,
            Some(10.5)
        );

        let both = json!({ "total_import_kwh": 20.0, "total_import_t1_kwh": 10.5 });
        assert_eq!(
            RawReading::from_json(&both).unwrap().total_import_kwh,
            Some(20.0)
        );
    }

    #[test]
    fn test_null_candidate_is_skipped_but_zero_is_kept() {
        let body = json!({
            "voltage_l1_v": null,
            "active_voltage_l1_v": 229.0,
            "active_current_l1_a": 0
        });

        let r = RawReading::from_json(&body).unwrap();
        assert_eq!(r.voltage_l1_v, Some(229.0));
        assert_eq!(r.active_current_l1_a, Some(0.0));
    }

    #[test]
    fn test_absent_keys_stay_unknown() {
        let r = RawReading::from_json(&json!({})).unwrap();
        assert_eq!(r, RawReading::default());
    }

    #[test]
    fn test_non_object_body_is_fetch_error() {
        let err = RawReading::from_json(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }
}
