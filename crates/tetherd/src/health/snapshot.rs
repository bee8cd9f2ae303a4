use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::lifecycle::SupervisorState;
use crate::process::{ChildInfo, Generation};

use super::HEALTH_TARGET;

/// Errors raised while writing the health snapshot.
#[derive(Debug, Error)]
pub enum HealthWriteError {
    /// Writing the file failed.
    #[error("failed to write health snapshot '{path}': {source}")]
    Io {
        /// Health file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Serialising the snapshot failed.
    #[error("failed to serialise health snapshot: {source}")]
    Serialise {
        /// Underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
    /// Obtaining the current timestamp failed.
    #[error("failed to read system time: {source}")]
    Clock {
        /// Underlying system time error.
        #[source]
        source: SystemTimeError,
    },
}

#[derive(Debug, Serialize)]
struct HealthSnapshot {
    status: SupervisorState,
    child_pid: Option<u32>,
    generation: Option<Generation>,
    timestamp: u64,
}

/// JSON file mirroring the supervisor state, removed on drop.
#[derive(Debug)]
pub struct HealthFile {
    path: Utf8PathBuf,
}

impl HealthFile {
    /// Targets `path`; nothing is written until [`write`](Self::write).
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Health file path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Replaces the file contents with a snapshot of `state` and `child`.
    ///
    /// # Errors
    ///
    /// Returns a [`HealthWriteError`] when the snapshot cannot be written.
    pub fn write(
        &self,
        state: SupervisorState,
        child: Option<ChildInfo>,
    ) -> Result<(), HealthWriteError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|source| HealthWriteError::Clock { source })?
            .as_secs();
        let snapshot = HealthSnapshot {
            status: state,
            child_pid: child.map(ChildInfo::pid),
            generation: child.map(ChildInfo::generation),
            timestamp,
        };
        let mut payload = serde_json::to_vec(&snapshot)?;
        payload.push(b'\n');

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let io_error = |source| HealthWriteError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = options.open(&self.path).map_err(io_error)?;
        file.write_all(&payload).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        debug!(
            target: HEALTH_TARGET,
            status = %state,
            file = %self.path,
            "health snapshot updated"
        );
        Ok(())
    }
}

impl Drop for HealthFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: HEALTH_TARGET,
                    file = %self.path,
                    error = %error,
                    "failed to remove health file"
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        _dir: TempDir,
        path: Utf8PathBuf,
    }

    #[fixture]
    fn target() -> Fixture {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("tether.health")).expect("utf-8");
        Fixture { _dir: dir, path }
    }

    fn read(path: &Utf8Path) -> Value {
        let content = fs::read_to_string(path).expect("health file readable");
        serde_json::from_str(&content).expect("health file is json")
    }

    #[rstest]
    fn writes_state_and_child(target: Fixture) {
        let file = HealthFile::new(target.path.clone());
        let child = ChildInfo::new(4321, Generation::new(2));
        file.write(SupervisorState::Running, Some(child))
            .expect("write snapshot");

        let snapshot = read(&target.path);
        assert_eq!(snapshot["status"], "running");
        assert_eq!(snapshot["child_pid"], 4321);
        assert_eq!(snapshot["generation"], 2);
        assert!(snapshot["timestamp"].as_u64().is_some_and(|ts| ts > 0));
    }

    #[rstest]
    fn records_missing_child_as_null(target: Fixture) {
        let file = HealthFile::new(target.path.clone());
        file.write(SupervisorState::Starting, None)
            .expect("write snapshot");
        let snapshot = read(&target.path);
        assert_eq!(snapshot["status"], "starting");
        assert!(snapshot["child_pid"].is_null());
        assert!(snapshot["generation"].is_null());
    }

    #[cfg(unix)]
    #[rstest]
    fn snapshot_is_private(target: Fixture) {
        use std::os::unix::fs::PermissionsExt;

        let file = HealthFile::new(target.path.clone());
        file.write(SupervisorState::Running, None)
            .expect("write snapshot");
        let mode = fs::metadata(&target.path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[rstest]
    fn drop_removes_the_file(target: Fixture) {
        let file = HealthFile::new(target.path.clone());
        file.write(SupervisorState::Terminated, None)
            .expect("write snapshot");
        assert!(target.path.exists());
        drop(file);
        assert!(!target.path.exists());
    }
}
