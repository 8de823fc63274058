//! Session settings shared by every game the manager starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extension appended to an identity to name its save file.
pub const SAVE_FILE_EXTENSION: &str = "advent";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which a session is saved and closed.
    pub session_timeout: Duration,
    /// Directory holding one save file per identity.
    pub save_path: PathBuf,
    /// The adventure executable.
    pub executable: PathBuf,
    /// Arguments passed before the resume flag on every launch.
    pub args: Vec<String>,
    /// Upper bound for one scripted save dialog. `None` waits forever.
    pub save_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            save_path: PathBuf::from("/tmp/advent"),
            executable: PathBuf::from("/usr/bin/advent"),
            args: Vec::new(),
            save_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl SessionConfig {
    /// Save file for `id`: `<save_path>/<id>.advent`.
    pub fn save_file_for(&self, id: &str) -> PathBuf {
        save_file_name(&self.save_path, id)
    }
}

/// Path separators in `id` become `_` so the file stays inside `save_path`.
pub fn save_file_name(save_path: &Path, id: &str) -> PathBuf {
    let stem: String = id
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    save_path.join(format!("{stem}.{SAVE_FILE_EXTENSION}"))
}
