//! Update loop shared by both bots.
//!
//! Each incoming message is handled in its own task behind one error
//! barrier; a periodic sweep evicts idle state.

mod runner;
mod source;

pub use runner::{RunnerMessage, UpdateRunner};
pub use source::{UpdateHandler, UpdateSource};
