pub mod query;

pub use query::{QueryService, ResolvedWindow, Series};
