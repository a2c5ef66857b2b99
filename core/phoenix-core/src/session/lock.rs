//! Advisory file locks serializing read-modify-write cycles.
//!
//! Hook processes for the same session can overlap. Every whole-file rewrite
//! (event log, metadata, registry) happens while holding an exclusive `flock`
//! on a sibling lock file, so concurrent writers queue instead of losing
//! updates. The data files themselves are replaced by atomic rename, which
//! keeps lock-free readers from ever seeing a torn file.

use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use fs_err as fs;
use fs_err::OpenOptions;

/// Exclusive lock held until dropped.
pub struct FileLock {
    file: fs::File,
    path: PathBuf,
}

impl FileLock {
    /// Blocks until the exclusive lock on `path` is acquired.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        loop {
            // SAFETY: flock on a descriptor we own for the lifetime of `file`.
            #[allow(unsafe_code)]
            let rc = unsafe { libc::flock(file.file().as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // SAFETY: same descriptor as acquired; closing would also release it.
        #[allow(unsafe_code)]
        unsafe {
            libc::flock(self.file.file().as_raw_fd(), libc::LOCK_UN);
        }
    }
}
