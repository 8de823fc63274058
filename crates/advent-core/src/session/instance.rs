//! One game bound to one identity.
//!
//! All mutable state sits behind a single async lock. Validity lives in a
//! [`StateCell`] that only changes under that lock, so the manager can ask
//! "is this live?" without ever taking a session lock.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::Registry;
use super::state::{SessionState, StateCell};
use crate::config::SessionConfig;
use crate::error::{AdventError, AdventResult};
use crate::process::{Diagnostic, GameProcess};

/// A live or expired game session.
pub struct Session {
    id: String,
    /// Distinguishes this session from later ones for the same identity.
    serial: u64,
    save_file: PathBuf,
    /// Used only to deregister this session on close.
    registry: Weak<Registry>,
    state: StateCell,
    timeout: Duration,
    save_timeout: Option<Duration>,
    deadline: watch::Sender<Instant>,
    abort: CancellationToken,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    process: Option<GameProcess>,
    output: Option<mpsc::Receiver<String>>,
    diagnostics: Option<mpsc::Receiver<Diagnostic>>,
    /// No input since the last successful save.
    saved: bool,
    /// A save dialog timed out; the game may never exit on its own.
    hung: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    SaveFirst,
    SkipSave,
}

impl Session {
    /// Launch (or resume) the game for `id` and arm the idle timer.
    pub(crate) async fn start(
        id: &str,
        serial: u64,
        config: &SessionConfig,
        registry: Weak<Registry>,
    ) -> AdventResult<Arc<Self>> {
        let save_file = config.save_file_for(id);
        tokio::fs::create_dir_all(&config.save_path).await?;

        let mut process = GameProcess::new_or_resume(&config.executable, &config.args, &save_file);
        let resumed = process.is_resumed();
        let streams = process.start()?;

        let (deadline, deadline_rx) = watch::channel(Instant::now() + config.session_timeout);
        let session = Arc::new(Self {
            id: id.to_string(),
            serial,
            save_file,
            registry,
            state: StateCell::new(),
            timeout: config.session_timeout,
            save_timeout: config.save_timeout,
            deadline,
            abort: CancellationToken::new(),
            inner: Mutex::new(SessionInner {
                process: Some(process),
                output: Some(streams.output),
                diagnostics: Some(streams.diagnostics),
                saved: false,
                hung: false,
            }),
        });
        session.state.advance(SessionState::Live)?;

        tokio::spawn(idle_watch(Arc::clone(&session), deadline_rx));

        info!(session = %id, resumed, "session started");
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn save_file(&self) -> &Path {
        &self.save_file
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Live
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// Game output with save-dialog prompts removed. Handed out once.
    ///
    /// The caller must keep draining it; an unread line stalls the game's
    /// output, save dialog included.
    pub async fn take_output(&self) -> Option<mpsc::Receiver<String>> {
        self.inner.lock().await.output.take()
    }

    /// Stderr lines and read failures. Handed out once.
    pub async fn take_diagnostics(&self) -> Option<mpsc::Receiver<Diagnostic>> {
        self.inner.lock().await.diagnostics.take()
    }

    fn push_deadline(&self) {
        self.deadline.send_replace(Instant::now() + self.timeout);
    }

    /// Postpone the idle timeout without sending input.
    pub async fn reset_timer(&self) -> AdventResult<()> {
        let _inner = self.inner.lock().await;
        if !self.is_live() {
            return Err(AdventError::Expired);
        }
        self.push_deadline();
        Ok(())
    }

    /// Send one line of input to the game. Counts as activity.
    pub async fn write_line(&self, text: &str) -> AdventResult<()> {
        let mut inner = self.inner.lock().await;
        if !self.is_live() {
            return Err(AdventError::Expired);
        }
        self.push_deadline();
        inner.saved = false;

        let process = inner.process.as_mut().ok_or(AdventError::Expired)?;
        process.write_line(text).await
    }

    /// Run the game's save dialog without closing the session.
    ///
    /// Saving an expired session succeeds trivially.
    pub async fn save(&self) -> AdventResult<()> {
        let mut inner = self.inner.lock().await;
        if !self.is_live() {
            return Ok(());
        }

        let process = inner.process.as_mut().ok_or(AdventError::Expired)?;
        let result = bounded(self.save_timeout, process.save(&self.save_file)).await;
        match result {
            Ok(()) => {
                inner.saved = true;
                info!(session = %self.id, path = %self.save_file.display(), "session saved");
            }
            Err(AdventError::Timeout) => inner.hung = true,
            Err(_) => {}
        }
        result
    }

    /// Save, stop the game and deregister. Closing an expired session is a
    /// no-op.
    ///
    /// A failed save is reported, but the session is invalidated anyway.
    pub async fn close(&self) -> AdventResult<()> {
        self.teardown(Teardown::SaveFirst).await
    }

    async fn teardown(&self, mode: Teardown) -> AdventResult<()> {
        let mut inner = self.inner.lock().await;
        if !self.is_live() {
            return Ok(());
        }
        let Some(mut process) = inner.process.take() else {
            return Ok(());
        };

        let run_dialog = mode == Teardown::SaveFirst && !inner.saved && !inner.hung;
        let result = if run_dialog && self.save_timeout.is_none() {
            process.save_and_close(&self.save_file).await
        } else {
            let saved = if run_dialog {
                bounded(self.save_timeout, process.save(&self.save_file)).await
            } else {
                Ok(())
            };
            if matches!(saved, Err(AdventError::Timeout)) {
                inner.hung = true;
            }
            if inner.hung {
                if let Err(e) = process.kill() {
                    warn!(session = %self.id, error = %e, "failed to kill hung game");
                }
            }
            let closed = process.close().await;
            saved.and(closed)
        };

        self.state.advance(SessionState::Invalid)?;
        inner.output = None;
        inner.diagnostics = None;
        self.abort.cancel();

        // Session lock before registry lock, never the other way round.
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(&self.id, self.serial).await;
        }
        drop(inner);

        match &result {
            Ok(()) => info!(session = %self.id, "session closed"),
            Err(e) => warn!(session = %self.id, error = %e, "session closed with error"),
        }
        result
    }
}

async fn bounded<F>(limit: Option<Duration>, fut: F) -> AdventResult<()>
where
    F: Future<Output = AdventResult<()>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AdventError::Timeout)?,
        None => fut.await,
    }
}

/// Saves and closes the session once it has been idle for its timeout.
async fn idle_watch(session: Arc<Session>, mut deadline: watch::Receiver<Instant>) {
    loop {
        let at = *deadline.borrow_and_update();
        tokio::select! {
            _ = session.abort.cancelled() => {
                debug!(session = %session.id, "idle timer aborted");
                return;
            }
            changed = deadline.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = tokio::time::sleep_until(at) => break,
        }
    }

    info!(session = %session.id, "session idle, saving");
    if let Err(e) = session.save().await {
        warn!(session = %session.id, error = %e, "auto-save failed");
    }
    if let Err(e) = session.teardown(Teardown::SkipSave).await {
        warn!(session = %session.id, error = %e, "closing idle session failed");
    }
}
