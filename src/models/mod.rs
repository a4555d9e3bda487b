pub mod measurement;

pub use measurement::{AggregatedPoint, DerivedPoint, Measurement};
