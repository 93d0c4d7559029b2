//! Recognizer executable checks and version lookup.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use lipsync_common::error::{LipsyncError, LipsyncResult};
use lipsync_cue_model::protocol::parse_version;

use crate::command::version_args;

/// Make sure `path` is an executable file.
///
/// Archive extraction and some packaging steps drop the executable bit, so on
/// unix a file without any execute bit gets `+x` instead of an error.
pub fn ensure_executable(path: &Path) -> LipsyncResult<()> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        LipsyncError::config(format!(
            "recognizer executable not found at {}: {e}",
            path.display()
        ))
    })?;

    if !metadata.is_file() {
        return Err(LipsyncError::config(format!(
            "recognizer executable {} is not a file",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = metadata.permissions();
        let mode = permissions.mode();
        if mode & 0o111 == 0 {
            permissions.set_mode(mode | 0o111);
            std::fs::set_permissions(path, permissions).map_err(|e| {
                LipsyncError::config(format!(
                    "recognizer {} is not executable and its mode could not be changed: {e}",
                    path.display()
                ))
            })?;
            tracing::info!(
                path = %path.display(),
                old_mode = %format_args!("{mode:o}"),
                "Set executable bit on recognizer"
            );
        }
    }

    Ok(())
}

/// Look a bare program name up in `PATH`.
///
/// Paths with a directory part, and names not found in `PATH`, are returned
/// unchanged so that [`ensure_executable`] reports them.
pub fn resolve_executable(path: &Path) -> PathBuf {
    if path.components().count() != 1 || path.exists() {
        return path.to_path_buf();
    }
    let Some(search) = std::env::var_os("PATH") else {
        return path.to_path_buf();
    };
    std::env::split_paths(&search)
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Run `<path> --version` and extract the version number.
///
/// Returns an empty string when the output has no recognizable version.
pub fn query_version(path: &Path) -> LipsyncResult<String> {
    ensure_executable(path)?;

    let output = Command::new(path)
        .args(version_args())
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            LipsyncError::config(format!("failed to run {} --version: {e}", path.display()))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut version = parse_version(&stdout);
    if version.is_empty() {
        version = parse_version(&String::from_utf8_lossy(&output.stderr));
    }

    tracing::debug!(path = %path.display(), version = %version, "Queried recognizer version");
    Ok(version)
}

/// A recognizer executable with a memoized version.
///
/// The version is looked up only by [`ExecutableInfo::ensure_version`] and is
/// dropped whenever the path changes.
#[derive(Debug, Clone)]
pub struct ExecutableInfo {
    path: PathBuf,
    version: Option<String>,
}

impl ExecutableInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point at a different executable, forgetting the cached version.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if path != self.path {
            self.path = path;
            self.invalidate();
        }
    }

    /// Cached version, if computed.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn invalidate(&mut self) {
        self.version = None;
    }

    /// Look up the version once and cache it.
    pub fn ensure_version(&mut self) -> LipsyncResult<&str> {
        if self.version.is_none() {
            self.version = Some(query_version(&self.path)?);
        }
        Ok(self.version.as_deref().unwrap_or_default())
    }
}
