//! Local record of the last task outcome per host (`state.json`).
//!
//! The file maps a host to the distribution, task, and outcome of the most
//! recent invocation against it. Tasks never fail because the record could
//! not be written; callers log the error and move on.

use std::collections::BTreeMap;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the state file, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = "state.json";

/// Errors raised while reading or writing the state file.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the file holds invalid JSON or an unexpected shape.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the path has no file name component.
    #[error("state file path {path} is missing a filename")]
    MissingFileName {
        /// Offending path.
        path: Utf8PathBuf,
    },
}

/// Outcome of a task recorded for a host.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task completed.
    Succeeded,
    /// The task stopped on an error.
    Failed,
}

/// Last known provisioning status of one host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HostRecord {
    /// Distribution the task targeted.
    pub distribution: String,
    /// Task name (`bootstrap` or `tests`).
    pub task: String,
    /// Outcome.
    pub status: TaskStatus,
    /// Seconds since the Unix epoch when the record was written.
    pub updated_at: u64,
}

impl HostRecord {
    /// Builds a record stamped with the current time.
    #[must_use]
    pub fn now(distribution: &str, task: &str, status: TaskStatus) -> Self {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self {
            distribution: distribution.to_owned(),
            task: task.to_owned(),
            status,
            updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct StateFile {
    #[serde(default)]
    hosts: BTreeMap<String, HostRecord>,
}

/// Abstraction over state persistence for dependency injection.
pub trait StateRecorder {
    /// Returns the record stored for `host`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the state cannot be read.
    fn load(&self, host: &str) -> Result<Option<HostRecord>, StateStoreError>;

    /// Stores `record` for `host`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the state cannot be written.
    fn record(&self, host: &str, record: HostRecord) -> Result<(), StateStoreError>;
}

/// JSON file backed [`StateRecorder`].
#[derive(Clone, Debug)]
pub struct StateStore {
    path: Utf8PathBuf,
}

impl StateStore {
    /// Creates a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn read_state(&self) -> Result<StateFile, StateStoreError> {
        let (dir, file_name) = self.open_parent(false)?;
        let contents = match dir.read_to_string(file_name) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(err) => return Err(self.io_error(&err)),
        };
        if contents.trim().is_empty() {
            return Ok(StateFile::default());
        }
        serde_json::from_str(&contents).map_err(|err| StateStoreError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    fn write_state(&self, state: &StateFile) -> Result<(), StateStoreError> {
        let rendered =
            serde_json::to_string_pretty(state).map_err(|err| StateStoreError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        let (dir, file_name) = self.open_parent(true)?;
        dir.write(file_name, rendered)
            .map_err(|err| self.io_error(&err))
    }

    fn open_parent(&self, create: bool) -> Result<(Dir, &str), StateStoreError> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| StateStoreError::MissingFileName {
                path: self.path.clone(),
            })?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };

        if create {
            Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
                StateStoreError::Io {
                    path: parent.to_path_buf(),
                    message: err.to_string(),
                }
            })?;
        }

        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
            StateStoreError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        Ok((dir, file_name))
    }

    fn io_error(&self, err: &io::Error) -> StateStoreError {
        StateStoreError::Io {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl StateRecorder for StateStore {
    fn load(&self, host: &str) -> Result<Option<HostRecord>, StateStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut state = self.read_state()?;
        Ok(state.hosts.remove(host))
    }

    fn record(&self, host: &str, record: HostRecord) -> Result<(), StateStoreError> {
        let mut state = if self.path.exists() {
            self.read_state()?
        } else {
            StateFile::default()
        };
        state.hosts.insert(host.to_owned(), record);
        self.write_state(&state)
    }
}
