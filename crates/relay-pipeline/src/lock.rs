use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::Result;

pub const LOCK_FILE: &str = "bot.lock";

/// Exclusive per-identity lock held for the life of a bot process.
///
/// Released when dropped or when the process exits.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Try to take `<dir>/bot.lock` without blocking and record our pid in it.
    ///
    /// `Ok(None)` means another process already holds the lock.
    pub fn acquire(dir: &Path) -> Result<Option<Self>> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if is_contended(&e) {
                debug!(path = %path.display(), "instance lock is held elsewhere");
                return Ok(None);
            }
            return Err(e.into());
        }

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Some(Self { file, path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release instance lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let first = InstanceLock::acquire(dir.path()).unwrap();
        assert!(first.is_some());
        assert!(InstanceLock::acquire(dir.path()).unwrap().is_none());

        drop(first);
        assert!(InstanceLock::acquire(dir.path()).unwrap().is_some());
    }

    #[test]
    fn lock_file_holds_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock = InstanceLock::acquire(&dir.path().join("alpha"))
            .unwrap()
            .unwrap();
        let contents = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents, std::process::id().to_string());
    }
}
