//! Routes chat events to game sessions, one session per room.

pub mod commands;
pub mod text;

use crate::transport::{ChatEvent, ChatTransport};
use advent_core::{AdventError, AdventResult, Diagnostic, Session, SessionManager};
use commands::Command;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct Bot<T: ChatTransport> {
    transport: Arc<T>,
    sessions: Arc<SessionManager>,
}

impl<T: ChatTransport> Bot<T> {
    pub fn new(transport: Arc<T>, sessions: Arc<SessionManager>) -> Self {
        Self {
            transport,
            sessions,
        }
    }

    /// Handle events until the transport's event stream ends.
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>) {
        info!("bot running");
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("chat event stream ended");
    }

    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Message { room, body } => self.recv_message(&room, &body).await,
            ChatEvent::Joined { room } => {
                let welcome = text::welcome_text(self.sessions.config().session_timeout);
                self.send(&room, &welcome).await;
            }
        }
    }

    async fn recv_message(&self, room: &str, body: &str) {
        let text = body.trim();
        if text.is_empty() {
            return;
        }

        match Command::parse(text) {
            Some(command) => self.handle_command(room, command).await,
            None => self.handle_game(room, text).await,
        }
    }

    async fn handle_command(&self, room: &str, command: Command) {
        debug!(room, ?command, "command");
        match command {
            Command::Help => self.send(room, text::HELP_TEXT).await,
            Command::Start => {
                if self.sessions.has_session(room).await {
                    self.send(room, text::ALREADY_RUNNING_TEXT).await;
                } else if let Err(e) = self.start(room).await {
                    self.send_error(room, &e).await;
                }
            }
            Command::Save => self.save(room).await,
            Command::Unknown(name) => {
                self.send(room, &text::unknown_command_text(&name)).await;
            }
        }
    }

    async fn handle_game(&self, room: &str, text: &str) {
        let result = match self.start(room).await {
            Ok(session) => match session.write_line(text).await {
                // Closed by the idle timer between lookup and write.
                Err(AdventError::Expired) => match self.start(room).await {
                    Ok(session) => session.write_line(text).await,
                    Err(e) => Err(e),
                },
                other => other,
            },
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.send_error(room, &e).await;
        }
    }

    async fn save(&self, room: &str) {
        let Some(session) = self.sessions.get_session(room).await else {
            self.send(room, text::NO_GAME_TEXT).await;
            return;
        };

        match session.close().await {
            Ok(()) => self.send(room, text::SAVED_TEXT).await,
            Err(e) => self.send_error(room, &e).await,
        }
    }

    /// Get the room's session, starting it if needed. A freshly started
    /// session gets its output relayed to the room.
    async fn start(&self, room: &str) -> AdventResult<Arc<Session>> {
        let session = self.sessions.get_or_create_session(room).await?;

        if let Some(output) = session.take_output().await {
            tokio::spawn(forward_output(
                Arc::clone(&self.transport),
                room.to_string(),
                output,
            ));
        }
        if let Some(diagnostics) = session.take_diagnostics().await {
            tokio::spawn(log_diagnostics(room.to_string(), diagnostics));
        }

        Ok(session)
    }

    async fn send(&self, room: &str, text: &str) {
        if let Err(e) = self.transport.send_text(room, text).await {
            error!(room, error = %e, "failed to send message");
        }
    }

    async fn send_error(&self, room: &str, err: &AdventError) {
        warn!(room, error = %err, "request failed");
        self.send(room, &err.to_string()).await;
    }
}

/// Text to relay for one output line, or `None` if there is nothing to say.
pub fn filter_output(text: &str) -> Option<&str> {
    let text = text.trim();
    (!text.is_empty()).then_some(text)
}

async fn forward_output<T: ChatTransport>(
    transport: Arc<T>,
    room: String,
    mut output: mpsc::Receiver<String>,
) {
    while let Some(line) = output.recv().await {
        let Some(text) = filter_output(&line) else {
            continue;
        };
        if let Err(e) = transport.send_text(&room, text).await {
            error!(room = %room, error = %e, "failed to relay game output");
        }
    }
    debug!(room = %room, "game output ended");
}

async fn log_diagnostics(room: String, mut diagnostics: mpsc::Receiver<Diagnostic>) {
    while let Some(diagnostic) = diagnostics.recv().await {
        match diagnostic {
            Diagnostic::Stderr(text) => warn!(room = %room, text = %text, "game stderr"),
            Diagnostic::ReadFailed { stream, error } => {
                warn!(room = %room, stream = ?stream, error = %error, "game stream failed")
            }
        }
    }
}
