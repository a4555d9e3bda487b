pub mod series;
pub mod status;

pub use series::SeriesResponse;
pub use status::{LimitsResponse, StatusResponse};
