use crate::collector::CollectorStatus;
use crate::config::LimitsConfig;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub collector: CollectorStatus,
    pub subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct LimitsResponse {
    pub phase_limit_a: f64,
    pub volt_low: f64,
    pub volt_high: f64,
    pub volt_nominal: f64,
}

impl From<&LimitsConfig> for LimitsResponse {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            phase_limit_a: limits.phase_limit_a,
            volt_low: limits.volt_low,
            volt_high: limits.volt_high,
            volt_nominal: limits.volt_nominal,
        }
    }
}
