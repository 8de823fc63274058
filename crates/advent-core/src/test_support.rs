//! A shell-script stand-in for the adventure game.
//!
//! It prints the same kind of prompts as the real game, walks the save
//! dialog, honours the resume flag, and on save writes every line it read
//! into the save file so tests can check what the engine sent. Like the
//! real game it keeps printing after it has read the file name.

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::SessionConfig;

pub const FAKE_GAME_SHELL: &str = "sh";

pub const WELCOME: &str = "Welcome to Adventure!!  Would you like instructions?";

const FAKE_GAME: &str = r#"
if [ "$1" = "-r" ]; then
  printf 'Restored from %s.\n\n> ' "$2"
else
  printf 'Welcome to Adventure!!  Would you like instructions?\n\n> '
fi
log=""
state=""
while IFS= read -r line; do
  log="$log$line
"
  if [ "$state" = "filename" ]; then
    sleep 0.2
    printf '\nSaving to %s.\n' "$line"
    printf '%s' "$log" > "$line"
    printf 'Done.\n'
    exit 0
  fi
  case "$line" in
    save)
      state="confirm"
      printf '\nI can suspend your Adventure for you so that you can resume later, but\nyou will have to wait at least 45 minutes before continuing.\n\nIs this what you want to do? > '
      ;;
    yes)
      if [ "$state" = "confirm" ]; then
        state="filename"
        printf '\nOK\n\nFile name: '
      else
        printf '\nYes what?\n\n> '
      fi
      ;;
    oops)
      state=""
      printf '\n\n  something went wrong  \n' >&2
      printf '\nHuh?\n\n> '
      ;;
    garble)
      state=""
      printf '\377\376 latin junk\n' >&2
      printf 'second stderr line\n' >&2
      printf '\nHuh?\n\n> '
      ;;
    quit)
      exit 3
      ;;
    *)
      state=""
      printf '\nYou said: %s\n\n> ' "$line"
      ;;
  esac
done
exit 0
"#;

/// Greets, then never answers. Once stdin closes it turns into a `sleep`
/// that only a kill ends.
const MUTE_GAME: &str = r#"
printf 'Welcome to Adventure!!  Would you like instructions?\n\n> '
while :; do
  IFS= read -r line || exec sleep 30
done
"#;

/// Arguments that make `sh` run the fake game; the resume flag lands in `$1`.
pub fn fake_game_args() -> Vec<String> {
    vec!["-c".into(), FAKE_GAME.into(), "fake-advent".into()]
}

pub fn fake_config(save_path: &Path, session_timeout: Duration) -> SessionConfig {
    SessionConfig {
        session_timeout,
        save_path: save_path.to_path_buf(),
        executable: FAKE_GAME_SHELL.into(),
        args: fake_game_args(),
        save_timeout: Some(Duration::from_secs(5)),
    }
}

/// Next output line, or `None` once the stream ends or stays quiet for 5s.
pub async fn next_output(output: &mut mpsc::Receiver<String>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(5), output.recv())
        .await
        .ok()
        .flatten()
}

/// Config for a game that never shows the save dialog.
pub fn mute_config(
    save_path: &Path,
    session_timeout: Duration,
    save_timeout: Option<Duration>,
) -> SessionConfig {
    SessionConfig {
        args: vec!["-c".into(), MUTE_GAME.into(), "mute-advent".into()],
        save_timeout,
        ..fake_config(save_path, session_timeout)
    }
}
