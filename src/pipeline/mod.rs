//! The per-message pipeline: filter → handle → send.

pub mod dispatch;
pub mod filter;
pub mod handler;
pub mod pipe;
pub mod sender;
pub mod validate;

pub use dispatch::{report_outcome, Dispatcher};
pub use filter::{AllowlistFilter, Filter, FilterChain};
pub use handler::{HandledRecord, RecordHandler, TextMessageHandler};
pub use pipe::Pipe;
pub use sender::{FileSender, Sender};
pub use validate::validate;
