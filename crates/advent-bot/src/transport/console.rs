//! Local console transport: stdin lines in, game text out on stdout.
//!
//! Useful for playing or debugging without a chat server. Everything is
//! attributed to the single room [`CONSOLE_ROOM`].

use super::{ChatEvent, ChatTransport};
use advent_core::AdventResult;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Identity used for the console player.
pub const CONSOLE_ROOM: &str = "console";

pub struct ConsoleTransport {
    stdout: Mutex<tokio::io::Stdout>,
}

impl ConsoleTransport {
    /// Start reading stdin. The event stream begins with a join.
    pub fn start() -> (Arc<Self>, mpsc::Receiver<ChatEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let joined = ChatEvent::Joined {
                room: CONSOLE_ROOM.to_string(),
            };
            if events_tx.send(joined).await.is_err() {
                return;
            }

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(body)) => {
                        let event = ChatEvent::Message {
                            room: CONSOLE_ROOM.to_string(),
                            body,
                        };
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
            debug!("console input closed");
        });

        let transport = Arc::new(Self {
            stdout: Mutex::new(tokio::io::stdout()),
        });
        (transport, events_rx)
    }
}

impl ChatTransport for ConsoleTransport {
    async fn send_text(&self, _room: &str, text: &str) -> AdventResult<()> {
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(text.as_bytes()).await?;
        stdout.write_all(b"\n\n").await?;
        stdout.flush().await?;
        Ok(())
    }
}
