pub mod export;
pub mod meta;
pub mod series;
