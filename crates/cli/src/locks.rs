//! Scanner exclusivity
//!
//! At most one process may run debounce passes against a table. The
//! daemon takes the lock when it runs the scanner role, and the one-shot
//! `scan` command takes it for the duration of its pass.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "scanner.lock";

/// Held scanner lock; released on drop
///
/// The lock file is never unlinked (waiters must all contend on one inode);
/// releasing only clears its owner record.
pub struct ScannerLock {
    path: PathBuf,
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl ScannerLock {
    /// Acquire the lock under `locks_dir`
    ///
    /// Fails if another process holds it. A lock file left behind by a dead
    /// process is unlocked and simply reused.
    pub fn acquire(locks_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(locks_dir).context("Failed to create locks directory")?;
        let lock_path = locks_dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .context("Failed to open lock file")?;

        // The kernel releases a flock when its holder exits; a held lock is never stale
        if !try_flock_exclusive(&file)? {
            match read_owner(&mut file) {
                Ok(owner) => anyhow::bail!(
                    "Scanner already running (pid {}, since {})",
                    owner.pid,
                    owner.started_at.to_rfc3339()
                ),
                Err(_) => anyhow::bail!("Scanner already running (owner still starting)"),
            }
        }

        write_owner(&mut file)?;

        Ok(Self {
            path: lock_path,
            file,
        })
    }

    /// Clear the owner record and release the lock
    pub fn release(self) -> Result<()> {
        self.file
            .set_len(0)
            .with_context(|| format!("Failed to clear lock file {}", self.path.display()))?;
        Ok(())
    }

    /// Recorded holder, if that process is still alive
    pub fn owner(locks_dir: &Path) -> Option<LockOwner> {
        let mut file = File::open(locks_dir.join(LOCK_FILE)).ok()?;
        read_owner(&mut file)
            .ok()
            .filter(|owner| is_process_alive(owner.pid))
    }
}

impl Drop for ScannerLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
    }
}

fn write_owner(file: &mut File) -> Result<()> {
    let owner = LockOwner {
        pid: std::process::id(),
        started_at: chrono::Utc::now(),
    };
    let serialized = serde_json::to_string(&owner).context("Failed to serialize lock owner")?;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn read_owner(file: &mut File) -> Result<LockOwner> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).context("Failed to deserialize lock owner")
}

/// Try to acquire an exclusive file lock (non-blocking)
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Null signal probe: existence check without delivering anything
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        // EPERM: exists but owned by someone else
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_acquisition() {
        let temp_dir = TempDir::new().unwrap();
        let locks_dir = temp_dir.path().join("locks");

        let lock1 = ScannerLock::acquire(&locks_dir);
        assert!(lock1.is_ok());

        // Held by a live process (this one)
        let lock2 = ScannerLock::acquire(&locks_dir);
        assert!(lock2.is_err());

        drop(lock1);

        let lock3 = ScannerLock::acquire(&locks_dir);
        assert!(lock3.is_ok());
    }

    #[test]
    fn test_lock_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock = ScannerLock::acquire(temp_dir.path()).unwrap();
        let lock_path = lock.path.clone();
        assert!(ScannerLock::owner(temp_dir.path()).is_some());

        lock.release().unwrap();
        assert!(lock_path.exists());
        assert!(ScannerLock::owner(temp_dir.path()).is_none());
        assert!(ScannerLock::acquire(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_owner_is_current_process() {
        let temp_dir = TempDir::new().unwrap();
        let _lock = ScannerLock::acquire(temp_dir.path()).unwrap();

        let owner = ScannerLock::owner(temp_dir.path()).unwrap();
        assert_eq!(owner.pid, std::process::id());
    }

    #[test]
    fn test_unlocked_file_from_dead_process_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(LOCK_FILE),
            r#"{"pid":999999,"started_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        // Left-over file: no live owner
        assert!(ScannerLock::owner(temp_dir.path()).is_none());

        let _lock = ScannerLock::acquire(temp_dir.path()).unwrap();
        assert_eq!(
            ScannerLock::owner(temp_dir.path()).unwrap().pid,
            std::process::id()
        );
    }

    #[test]
    fn test_held_lock_without_owner_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(LOCK_FILE);

        // Holder has taken the flock but not written its pid yet
        let holder = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        assert!(try_flock_exclusive(&holder).unwrap());

        let err = ScannerLock::acquire(temp_dir.path()).err().unwrap();
        assert!(err.to_string().contains("Scanner already running"));
        assert!(path.exists());

        drop(holder);
        assert!(ScannerLock::acquire(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_process_alive() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(999999));
    }
}
