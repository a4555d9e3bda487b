//! Fields computed on every read path, never stored.

use crate::models::{AggregatedPoint, DerivedPoint, Measurement};

/// Attach total current and phase imbalance to a row. Absent phase currents
/// count as 0 A.
pub fn enrich(row: Measurement) -> DerivedPoint {
    let currents = row.currents().map(|c| c.unwrap_or(0.0));
    let max = currents.iter().copied().fold(f64::MIN, f64::max);
    let min = currents.iter().copied().fold(f64::MAX, f64::min);

    let imbalance_a = max - min;
    let imbalance_pct = if max > 0.0 {
        imbalance_a / max * 100.0
    } else {
        0.0
    };

    DerivedPoint {
        total_current_a: currents.iter().sum(),
        imbalance_a,
        imbalance_pct,
        sample_count: None,
        measurement: row,
    }
}

pub fn enrich_aggregated(point: &AggregatedPoint) -> DerivedPoint {
    DerivedPoint {
        sample_count: Some(point.sample_count),
        ..enrich(point.as_measurement())
    }
}
