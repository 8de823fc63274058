//! Session management: per-identity game lifecycle, idle timeout, registry.

mod instance;
pub mod manager;
pub mod state;

pub use instance::Session;
pub use manager::SessionManager;
pub use state::SessionState;
