//! Chat transport boundary.
//!
//! A transport delivers inbound events tagged with a room and accepts
//! outbound text for a room. The bot treats each room as one identity.

pub mod console;
pub mod websocket;

use advent_core::AdventResult;
use std::future::Future;

/// An inbound event from a chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Someone wrote `body` in `room`.
    Message { room: String, body: String },
    /// A participant joined `room`.
    Joined { room: String },
}

/// Outbound half of a chat transport.
pub trait ChatTransport: Send + Sync + 'static {
    /// Deliver `text` to everyone in `room`.
    fn send_text(&self, room: &str, text: &str) -> impl Future<Output = AdventResult<()>> + Send;
}
