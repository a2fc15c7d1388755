//! Removal of what is left of the old root once the new one is in place.

use std::{
    fs::OpenOptions,
    os::{
        fd::{AsRawFd, IntoRawFd, OwnedFd},
        unix::fs::OpenOptionsExt,
    },
};

use log::debug;

use crate::{
    error::{io_errno, last_errno, Errno},
    string::c_str,
};

/// A directory whose entries can be removed by relative path. The
/// directory is released when the value is dropped.
pub trait CleanupTarget {
    fn remove(&self, path: &str, is_dir: bool) -> Result<(), Errno>;

    /// Release the directory, reporting a failed close.
    fn close(self) -> Result<(), Errno>
    where
        Self: Sized,
    {
        drop(self);
        Ok(())
    }
}

/// Path-only handle on the old root, still usable after it left the tree.
#[derive(Debug)]
pub struct OldRoot {
    fd: OwnedFd,
}

impl OldRoot {
    pub fn open(path: &str) -> Result<Self, Errno> {
        let dir = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_PATH | libc::O_DIRECTORY)
            .open(path)
            .map_err(|err| io_errno(&err))?;

        Ok(Self { fd: dir.into() })
    }
}

impl CleanupTarget for OldRoot {
    fn remove(&self, path: &str, is_dir: bool) -> Result<(), Errno> {
        let path = c_str(path)?;
        let flags = if is_dir { libc::AT_REMOVEDIR } else { 0 };

        unsafe {
            if libc::unlinkat(self.fd.as_raw_fd(), path.as_ptr(), flags) != 0 {
                return Err(last_errno());
            }
        }

        Ok(())
    }

    fn close(self) -> Result<(), Errno> {
        let fd = self.fd.into_raw_fd();

        unsafe {
            if libc::close(fd) != 0 {
                return Err(last_errno());
            }
        }

        Ok(())
    }
}

/// Best-effort removal of the init executable, the console node and the
/// mount points of the old root, then release of the handle.
pub fn clean_old_root<T: CleanupTarget>(old_root: T, executable: &str) {
    debug!("Removing initramfs contents");

    let executable = executable.trim_start_matches('/');
    let entries = [
        (executable, false),
        ("dev/console", false),
        ("dev", true),
        ("boot", true),
        ("root", true),
    ];

    for (path, is_dir) in entries {
        if path.is_empty() {
            continue;
        }

        if let Err(errno) = old_root.remove(path, is_dir) {
            debug!("Failed to remove '/{path}': {errno}");
        }
    }

    if let Err(errno) = old_root.close() {
        debug!("Failed to close initramfs: {errno}");
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test]
    fn test_clean_old_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("mininit"), b"\x7fELF").unwrap();
        fs::create_dir(root.join("dev")).unwrap();
        fs::write(root.join("dev/console"), b"").unwrap();
        fs::create_dir(root.join("boot")).unwrap();
        fs::create_dir(root.join("root")).unwrap();
        fs::write(root.join("root/keep"), b"").unwrap();
        fs::write(root.join("other"), b"").unwrap();

        let old_root = OldRoot::open(root.to_str().unwrap()).unwrap();
        clean_old_root(old_root, "/mininit");

        assert!(!root.join("mininit").exists());
        assert!(!root.join("dev").exists());
        assert!(!root.join("boot").exists());
        // not empty, left in place
        assert!(root.join("root/keep").exists());
        assert!(root.join("other").exists());
    }

    #[test]
    fn test_open_requires_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            OldRoot::open(file.path().to_str().unwrap()).unwrap_err(),
            libc::ENOTDIR
        );
    }
}
