use crate::Result;
use chrono::{DateTime, Utc};
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "     state";

/// Persisted progress of a sharded run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(rename = "job-time")]
    pub job_time: DateTime<Utc>,

    /// Attempts made on the current shard.
    pub attempt: u32,

    /// Index of the shard being processed.
    pub shard: u32,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl RunState {
    /// Load the state stored at `path`, or start a fresh one if there is none.
    pub fn load(path: impl AsRef<Path>, now: DateTime<Utc>) -> Result<Self> {
        let path = path.as_ref();

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!(target: LOG_TARGET, "No run state at '{}', starting fresh", path.display());
                return Ok(Self {
                    job_time: now,
                    attempt: 0,
                    shard: 0,
                    path: Some(path.to_path_buf()),
                });
            }
            Err(e) => return Err(e).into_app_err_with(|| format!("unable to open run state '{}'", path.display())),
        };

        let mut state: Self = serde_json::from_reader(BufReader::new(file))
            .into_app_err_with(|| format!("unable to parse run state '{}'", path.display()))?;
        state.path = Some(path.to_path_buf());

        log::debug!(
            target: LOG_TARGET,
            "Loaded run state at '{}': shard {}, attempt {}",
            path.display(),
            state.shard,
            state.attempt
        );
        Ok(state)
    }

    /// Persist the state, replacing the previous file atomically.
    pub fn save(&self) -> Result<()> {
        let path = self.path()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{}'", parent.display()))?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let file = File::create(&tmp).into_app_err_with(|| format!("unable to create '{}'", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).into_app_err_with(|| format!("unable to write '{}'", tmp.display()))?;
        writer
            .flush()
            .into_app_err_with(|| format!("unable to flush '{}'", tmp.display()))?;
        drop(writer);

        fs::rename(&tmp, path).into_app_err_with(|| format!("unable to replace run state '{}'", path.display()))
    }

    /// Delete the persisted state. The state cannot be saved again afterwards.
    pub fn clear(&mut self) -> Result<()> {
        let path = self.path.take().into_app_err("run state has already been cleared")?;

        match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(e).into_app_err_with(|| format!("unable to remove run state '{}'", path.display()))
            }
            _ => Ok(()),
        }
    }

    fn path(&self) -> Result<&Path> {
        self.path.as_deref().into_app_err("run state has been cleared")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_is_a_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = RunState::load(dir.path().join("state.json"), now()).unwrap();
        assert_eq!(state.shard, 0);
        assert_eq!(state.attempt, 0);
        assert_eq!(state.job_time, now());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = RunState::load(&path, now()).unwrap();
        state.shard = 3;
        state.attempt = 2;
        state.save().unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["shard"], 3);
        assert_eq!(json["attempt"], 2);
        assert_eq!(json["job-time"], "2024-03-01T12:00:00Z");

        let loaded = RunState::load(&path, Utc::now()).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn clear_removes_the_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = RunState::load(&path, now()).unwrap();
        state.save().unwrap();
        assert!(path.exists());

        state.clear().unwrap();
        assert!(!path.exists());
        let _ = state.clear().unwrap_err();
        let _ = state.save().unwrap_err();
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();
        let _ = RunState::load(&path, now()).unwrap_err();
    }
}
