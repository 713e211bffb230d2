use crate::Result;
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "     state";

/// Holds the exclusive lock on a run state until dropped.
#[derive(Debug)]
pub struct StateLockGuard(File);

impl Drop for StateLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            log::warn!(target: LOG_TARGET, "Could not unlock run state: {e:#}");
        }
    }
}

/// Path of the lock file guarding `state_path`.
#[must_use]
pub fn lock_path(state_path: &Path) -> PathBuf {
    let mut path = state_path.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

/// Take an exclusive advisory lock on the run state at `state_path`, waiting for any other
/// runner that holds it.
pub async fn acquire_state_lock(state_path: &Path) -> Result<StateLockGuard> {
    let lock_path = lock_path(state_path);

    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{}'", parent.display()))?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .into_app_err_with(|| format!("opening run state lock file at '{}'", lock_path.display()))?;

    // Blocks until the lock is free.
    let file = tokio::task::spawn_blocking(move || {
        file.lock_exclusive()
            .into_app_err_with(|| format!("acquiring exclusive lock on '{}'", lock_path.display()))?;
        log::debug!(target: LOG_TARGET, "Acquired run state lock at '{}'", lock_path.display());
        Ok::<_, ohno::AppError>(file)
    })
    .await
    .into_app_err("lock task panicked")??;

    Ok(StateLockGuard(file))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_file_sits_next_to_the_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("run.json");

        let guard = acquire_state_lock(&state).await.unwrap();
        assert!(dir.path().join("run.json.lock").exists());
        drop(guard);
    }

    #[tokio::test]
    async fn lock_can_be_reacquired_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("run.json");

        drop(acquire_state_lock(&state).await.unwrap());
        let _guard = acquire_state_lock(&state).await.unwrap();
    }

    #[tokio::test]
    async fn second_holder_waits_for_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("run.json");

        let guard = acquire_state_lock(&state).await.unwrap();
        let state_clone = state.clone();
        let waiter = tokio::spawn(async move { acquire_state_lock(&state_clone).await });

        tokio::time::sleep(core::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        let _second = waiter.await.unwrap().unwrap();
    }
}
