//! advent-core: session engine for interactive text adventures.
//!
//! Drives a line-oriented game process over its standard streams, frames
//! its prompt-terminated output, scripts its save dialog, and keeps one
//! session per external identity with idle-timeout save-and-close.

pub mod codec;
pub mod config;
pub mod error;
pub mod process;
pub mod session;

#[cfg(test)]
mod test_support;

// Re-export commonly used items at crate root.
pub use codec::{clean_token, PromptCodec};
pub use config::SessionConfig;
pub use error::{AdventError, AdventResult};
pub use process::{Diagnostic, GameProcess, GameStreams, StreamKind};
pub use session::{Session, SessionManager, SessionState};
