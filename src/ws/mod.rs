pub mod broadcaster;
pub mod connection;
pub mod handler;

pub use broadcaster::{Broadcaster, LiveMessage, SubscriberId, Subscription};
pub use handler::{health_check, ws_handler, AppState};
