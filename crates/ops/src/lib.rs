#![forbid(unsafe_code)]

mod envelope;
mod handlers;

pub use envelope::{Envelope, OpError, OpResponse};
pub use handlers::dispatch;
