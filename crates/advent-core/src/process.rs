//! Game process controller.
//!
//! Owns the child's three pipes and runs three tasks once started:
//! a stdout reader that frames prompts, a stderr reader that splits lines,
//! and a demultiplexer that diverts save-dialog prompts into an internal
//! tick channel and forwards everything else to the caller.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{clean_token, PromptCodec};
use crate::error::{AdventError, AdventResult};

/// First part of the save dialog, shown after `save`.
pub const SAVE_DIALOG_PREAMBLE: &str =
    "I can suspend your Adventure for you so that you can resume later";

/// Second part of the save dialog, shown after confirming with `yes`.
pub const SAVE_DIALOG_FILE_NAME: &str = "File name:";

/// Command-line flag that makes the game resume from a save file.
pub const RESUME_FLAG: &str = "-r";

const TOKEN_CHANNEL_CAPACITY: usize = 1;
const OUTPUT_CHANNEL_CAPACITY: usize = 1;
const TICK_CHANNEL_CAPACITY: usize = 1;
const DIAGNOSTIC_CHANNEL_CAPACITY: usize = 4;

/// Longest stdout run without a prompt before it is cut into a token.
const MAX_STDOUT_TOKEN: usize = 64 * 1024;

/// Longest stderr line before it is split.
const MAX_STDERR_LINE: usize = 8 * 1024;

const LINE_DELIMITER: &[u8] = b"\n";

/// Which of the child's output pipes something came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Out-of-band reports from the read loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A non-blank line the game wrote to stderr, trimmed.
    Stderr(String),
    /// A pipe failed with something other than a clean end of stream.
    ReadFailed { stream: StreamKind, error: String },
}

/// Caller-visible streams handed out by [`GameProcess::start`].
#[derive(Debug)]
pub struct GameStreams {
    /// Framed stdout with save-dialog prompts removed.
    pub output: mpsc::Receiver<String>,
    pub diagnostics: mpsc::Receiver<Diagnostic>,
}

struct Running {
    child: Child,
    stdin: Option<ChildStdin>,
    ticks: mpsc::Receiver<()>,
    quit_out: CancellationToken,
    quit_err: CancellationToken,
}

/// One adventure child process.
pub struct GameProcess {
    command: Command,
    resumed: bool,
    running: Option<Running>,
    closed: bool,
}

impl GameProcess {
    /// Prepare a fresh game.
    pub fn new<S: AsRef<OsStr>>(executable: S, args: &[String]) -> Self {
        let mut command = Command::new(executable);
        command.args(args);
        Self::from_command(command, false)
    }

    /// Prepare a game resumed from `save_file`.
    pub fn resume<S: AsRef<OsStr>>(executable: S, args: &[String], save_file: &Path) -> Self {
        let mut command = Command::new(executable);
        command.args(args).arg(RESUME_FLAG).arg(save_file);
        Self::from_command(command, true)
    }

    /// Resume when `save_file` is an existing regular file, otherwise start fresh.
    pub fn new_or_resume<S: AsRef<OsStr>>(
        executable: S,
        args: &[String],
        save_file: &Path,
    ) -> Self {
        if save_file.is_file() {
            Self::resume(executable, args, save_file)
        } else {
            Self::new(executable, args)
        }
    }

    fn from_command(command: Command, resumed: bool) -> Self {
        Self {
            command,
            resumed,
            running: None,
            closed: false,
        }
    }

    /// Whether this process was launched with the resume flag.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Spawn the child and its read loops.
    pub fn start(&mut self) -> AdventResult<GameStreams> {
        if self.running.is_some() || self.closed {
            return Err(AdventError::AlreadyStarted);
        }

        self.command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(resumed = self.resumed, "starting game process");
        let mut child = self.command.spawn().map_err(AdventError::Spawn)?;
        let stdin = child.stdin.take().ok_or(AdventError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(AdventError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(AdventError::MissingPipe("stderr"))?;

        let (token_tx, token_rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (tick_tx, tick_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let (diag_tx, diag_rx) = mpsc::channel(DIAGNOSTIC_CHANNEL_CAPACITY);

        let quit_out = CancellationToken::new();
        let quit_err = CancellationToken::new();

        tokio::spawn(demultiplex(token_rx, output_tx, tick_tx));
        tokio::spawn(read_stdout(stdout, token_tx, diag_tx.clone(), quit_out.clone()));
        tokio::spawn(read_stderr(stderr, diag_tx, quit_err.clone()));

        debug!(pid = child.id(), "game process started");
        self.running = Some(Running {
            child,
            stdin: Some(stdin),
            ticks: tick_rx,
            quit_out,
            quit_err,
        });

        Ok(GameStreams {
            output: output_rx,
            diagnostics: diag_rx,
        })
    }

    fn running_mut(&mut self) -> AdventResult<&mut Running> {
        if self.closed {
            return Err(AdventError::ProcessClosed);
        }
        self.running.as_mut().ok_or(AdventError::NotStarted)
    }

    /// Write `text` plus a newline to the game's stdin.
    pub async fn write_line(&mut self, text: &str) -> AdventResult<()> {
        let stdin = self
            .running_mut()?
            .stdin
            .as_mut()
            .ok_or(AdventError::ProcessClosed)?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(AdventError::Write)?;
        stdin.flush().await.map_err(AdventError::Write)?;

        debug!(text, "written to game process");
        Ok(())
    }

    async fn await_tick(&mut self, step: &'static str) -> AdventResult<()> {
        self.running_mut()?
            .ticks
            .recv()
            .await
            .ok_or(AdventError::SaveDialog(step))
    }

    /// Walk the game's save dialog: `save`, `yes`, then the file name, each
    /// step gated on one save-dialog prompt.
    ///
    /// Waits for as long as the game takes to prompt. Returns
    /// [`AdventError::SaveDialog`] if the game's output ends mid-dialog.
    pub async fn save(&mut self, save_file: &Path) -> AdventResult<()> {
        debug!(path = %save_file.display(), "saving game");

        let running = self.running_mut()?;
        while running.ticks.try_recv().is_ok() {
            debug!("discarding stale save dialog tick");
        }

        self.write_line("save").await?;
        self.await_tick("confirmation").await?;
        self.write_line("yes").await?;
        self.await_tick("file name").await?;
        self.write_line(&save_file.to_string_lossy()).await?;

        debug!(path = %save_file.display(), "game saved");
        Ok(())
    }

    /// Run the save dialog, then close. The process is closed even when the
    /// dialog fails; the first error is returned.
    pub async fn save_and_close(&mut self, save_file: &Path) -> AdventResult<()> {
        let saved = self.save(save_file).await;
        let closed = self.close().await;
        saved.and(closed)
    }

    /// Ask the OS to kill the child. Used when a save dialog hangs.
    pub fn kill(&mut self) -> AdventResult<()> {
        let running = self.running_mut()?;
        running.child.start_kill()?;
        Ok(())
    }

    /// Stop the read loops, close stdin and wait for the child to exit.
    ///
    /// The loops stop delivering but keep reading their pipes until the
    /// child closes them, so late output never hits a closed pipe.
    ///
    /// Calling this again after it has run is a no-op.
    pub async fn close(&mut self) -> AdventResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        debug!("closing game process");
        running.quit_out.cancel();
        running.quit_err.cancel();

        // End of input makes the game exit.
        drop(running.stdin.take());

        let status = running.child.wait().await?;
        debug!(%status, "game process exited");
        if status.success() {
            Ok(())
        } else {
            Err(AdventError::Exited(status))
        }
    }
}

/// Whether a cleaned stdout token belongs to the save dialog.
pub fn is_save_dialog(text: &str) -> bool {
    text.contains(SAVE_DIALOG_PREAMBLE) || text.contains(SAVE_DIALOG_FILE_NAME)
}

fn report_read_failure(
    diagnostics: &mpsc::Sender<Diagnostic>,
    stream: StreamKind,
    error: &dyn std::fmt::Display,
) {
    warn!(stream = ?stream, error = %error, "error reading game output");
    let _ = diagnostics.try_send(Diagnostic::ReadFailed {
        stream,
        error: error.to_string(),
    });
}

async fn read_stdout(
    stdout: ChildStdout,
    tokens: mpsc::Sender<Bytes>,
    diagnostics: mpsc::Sender<Diagnostic>,
    quit: CancellationToken,
) {
    debug!("stdout loop started");
    let codec = PromptCodec::default().with_max_length(MAX_STDOUT_TOKEN);
    let mut frames = FramedRead::new(stdout, codec);

    loop {
        let token = tokio::select! {
            _ = quit.cancelled() => break,
            next = frames.next() => match next {
                Some(Ok(token)) => token,
                Some(Err(e)) => {
                    report_read_failure(&diagnostics, StreamKind::Stdout, &e);
                    break;
                }
                None => {
                    debug!("stdout loop stopped at end of stream");
                    return;
                }
            },
        };

        tokio::select! {
            _ = quit.cancelled() => break,
            sent = tokens.send(token) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    drop(tokens);
    drain(frames, StreamKind::Stdout).await;
}

async fn read_stderr(
    stderr: ChildStderr,
    diagnostics: mpsc::Sender<Diagnostic>,
    quit: CancellationToken,
) {
    debug!("stderr loop started");
    let codec = PromptCodec::new([LINE_DELIMITER]).with_max_length(MAX_STDERR_LINE);
    let mut lines = FramedRead::new(stderr, codec);

    loop {
        let line = tokio::select! {
            _ = quit.cancelled() => break,
            next = lines.next() => match next {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    report_read_failure(&diagnostics, StreamKind::Stderr, &e);
                    break;
                }
                None => {
                    debug!("stderr loop stopped at end of stream");
                    return;
                }
            },
        };

        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        warn!(text, "output on stderr");

        // Keep draining stderr even when nobody listens, so the game never
        // blocks on a full pipe.
        tokio::select! {
            _ = quit.cancelled() => break,
            _ = diagnostics.send(Diagnostic::Stderr(text.to_string())) => {}
        }
    }

    drop(diagnostics);
    drain(lines, StreamKind::Stderr).await;
}

/// Read and discard until the child closes the pipe.
async fn drain<R: AsyncRead + Unpin>(mut frames: FramedRead<R, PromptCodec>, stream: StreamKind) {
    let mut discarded = 0;
    while let Some(Ok(frame)) = frames.next().await {
        discarded += frame.len();
    }
    debug!(stream = ?stream, discarded, "read loop stopped");
}

async fn demultiplex(
    mut tokens: mpsc::Receiver<Bytes>,
    output: mpsc::Sender<String>,
    ticks: mpsc::Sender<()>,
) {
    debug!("demultiplexer started");
    let mut output = Some(output);

    while let Some(token) = tokens.recv().await {
        let text = clean_token(&token);
        debug!(text = %text, "output on stdout");

        if is_save_dialog(&text) {
            match ticks.try_send(()) {
                Ok(()) => debug!("save dialog tick"),
                Err(TrySendError::Full(())) => debug!("save dialog tick already pending"),
                Err(TrySendError::Closed(())) => {}
            }
            continue;
        }
        if text.is_empty() {
            continue;
        }

        if let Some(tx) = &output {
            if tx.send(text).await.is_err() {
                debug!("output receiver dropped, discarding further output");
                output = None;
            }
        }
    }

    debug!("demultiplexer stopped");
}
