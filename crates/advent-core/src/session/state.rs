use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{AdventError, AdventResult};

/// Lifecycle of a session. `Invalid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Process launch in progress.
    Starting = 0,
    /// Accepting input, output and saves.
    Live = 1,
    /// Closed; the process handle has been released.
    Invalid = 2,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Starting, SessionState::Live)
                | (SessionState::Live, SessionState::Invalid)
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Starting,
            1 => SessionState::Live,
            _ => SessionState::Invalid,
        }
    }
}

/// Lock-free view of a session's state.
///
/// Transitions happen under the session lock; reads may happen anywhere,
/// which lets the manager check liveness without taking a session lock.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(SessionState::Starting as u8))
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn advance(&self, to: SessionState) -> AdventResult<()> {
        let from = self.get();
        if !from.can_transition_to(to) {
            return Err(AdventError::InvalidTransition { from, to });
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| AdventError::InvalidTransition {
                from: SessionState::from_u8(actual),
                to,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_starting_live_invalid() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), SessionState::Starting);
        cell.advance(SessionState::Live).unwrap();
        assert_eq!(cell.get(), SessionState::Live);
        cell.advance(SessionState::Invalid).unwrap();
        assert_eq!(cell.get(), SessionState::Invalid);
    }

    #[test]
    fn rejects_skipping_and_reviving() {
        let cell = StateCell::new();
        assert!(matches!(
            cell.advance(SessionState::Invalid),
            Err(AdventError::InvalidTransition {
                from: SessionState::Starting,
                to: SessionState::Invalid
            })
        ));

        cell.advance(SessionState::Live).unwrap();
        cell.advance(SessionState::Invalid).unwrap();
        assert!(cell.advance(SessionState::Live).is_err());
        assert!(cell.advance(SessionState::Invalid).is_err());
        assert_eq!(cell.get(), SessionState::Invalid);
    }
}
