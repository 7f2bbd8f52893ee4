pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod proxy;
pub mod shutdown;

pub mod kafka;
pub mod pipeline;
pub mod telegram;

pub use config::Config;
pub use error::{Error, Result};
pub use proxy::InboxProxy;
pub use shutdown::{EventSource, ShutdownCoordinator, ShutdownState};
