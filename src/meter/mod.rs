pub mod client;
pub mod reading;

pub use client::MeterClient;
pub use reading::RawReading;

use crate::error::Result;
use async_trait::async_trait;

/// Anything that can produce one meter snapshot per call.
#[async_trait]
pub trait MeterSource: Send + Sync {
    async fn fetch(&self) -> Result<RawReading>;
}
