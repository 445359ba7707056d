//! File mutation plan. Components describe what they want on disk; only this
//! module touches the project tree.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// One planned mutation, with a project-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// Create or overwrite a file with raw bytes, creating parent directories.
    Copy {
        /// Full new content.
        content: Vec<u8>,
        /// File to write.
        path: PathBuf,
    },
    /// Delete a directory and everything under it.
    RemoveDir {
        /// Directory to delete.
        path: PathBuf,
    },
    /// Delete a single file.
    RemoveFile {
        /// File to delete.
        path: PathBuf,
    },
    /// Create or overwrite a file, creating parent directories.
    Write {
        /// Full new content.
        content: String,
        /// File to write.
        path: PathBuf,
    },
}

/// Effect a change had (or would have) on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A file that didn't exist was written.
    Created,
    /// A file or directory was deleted.
    Removed,
    /// Nothing to do: content matches, or the target is already gone.
    Unchanged,
    /// An existing file got new content.
    Updated,
}

impl Outcome {
    /// Report label, or `None` for no-ops.
    pub const fn label(self) -> Option<&'static str> {
        return match self {
            Self::Created => Some("created"),
            Self::Removed => Some("removed"),
            Self::Unchanged => None,
            Self::Updated => Some("updated"),
        };
    }
}

impl FileChange {
    /// Apply the change under `root`, skipping writes whose content already matches.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if a directory can't be created or a file can't be
    /// written or removed.
    pub fn apply(&self, root: &Path) -> Result<Outcome, Error> {
        let outcome = self.preview(root);
        if outcome == Outcome::Unchanged {
            return Ok(outcome);
        }
        let target = root.join(self.path());
        match self {
            Self::Copy { content, .. } => write_file(&target, content)?,
            Self::RemoveDir { .. } => std::fs::remove_dir_all(&target)?,
            Self::RemoveFile { .. } => std::fs::remove_file(&target)?,
            Self::Write { content, .. } => write_file(&target, content.as_bytes())?,
        }
        tracing::info!(path = %self.path().display(), outcome = ?outcome, "applied change");
        return Ok(outcome);
    }

    /// Project-relative path the change targets.
    pub fn path(&self) -> &Path {
        return match self {
            Self::Copy { path, .. } | Self::RemoveDir { path } | Self::RemoveFile { path } | Self::Write { path, .. } => {
                path
            },
        };
    }

    /// What `apply` would do under `root`, without touching anything.
    /// Unreadable existing files count as different content.
    pub fn preview(&self, root: &Path) -> Outcome {
        let target = root.join(self.path());
        return match self {
            Self::Copy { content, .. } => compare(&target, content),
            Self::RemoveDir { .. } => {
                if target.is_dir() { Outcome::Removed } else { Outcome::Unchanged }
            },
            Self::RemoveFile { .. } => {
                if target.is_file() { Outcome::Removed } else { Outcome::Unchanged }
            },
            Self::Write { content, .. } => compare(&target, content.as_bytes()),
        };
    }
}

/// Outcome of writing `content` over whatever is at `target`.
fn compare(target: &Path, content: &[u8]) -> Outcome {
    return match std::fs::read(target) {
        Ok(existing) if existing == content => Outcome::Unchanged,
        Ok(_) => Outcome::Updated,
        Err(_) if target.exists() => Outcome::Updated,
        Err(_) => Outcome::Created,
    };
}

/// Write bytes, creating parent directories.
fn write_file(target: &Path, content: &[u8]) -> Result<(), Error> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, content)?;
    return Ok(());
}
