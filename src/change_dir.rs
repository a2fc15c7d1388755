use std::path::Path;

use crate::{
    error::{last_errno, Errno},
    string::{c_path, c_str},
};

pub fn chdir(path: &str) -> Result<(), Errno> {
    let path = c_str(path)?;

    unsafe {
        /*
         * On success, zero is returned.  On error, -1 is returned, and errno
         * is set to indicate the error.
         */
        if libc::chdir(path.as_ptr()) != 0 {
            return Err(last_errno());
        }
    }

    Ok(())
}

pub fn chroot(path: &str) -> Result<(), Errno> {
    let path = c_str(path)?;

    unsafe {
        if libc::chroot(path.as_ptr()) != 0 {
            return Err(last_errno());
        }
    }

    Ok(())
}

/// Make sure a directory exists at `path`, an existing entry is fine.
pub fn make_mount_point(path: &str) -> Result<(), Errno> {
    let dir = c_str(path)?;

    unsafe {
        if libc::mkdir(dir.as_ptr(), 0o755) != 0 {
            let errno = last_errno();
            if errno != libc::EEXIST {
                return Err(errno);
            }
        }
    }

    Ok(())
}

/// `access(2)` probe; `mode` is a combination of `F_OK`, `R_OK`, `W_OK`, `X_OK`.
pub fn access(path: &Path, mode: libc::c_int) -> Result<(), Errno> {
    let path = c_path(path)?;

    unsafe {
        if libc::access(path.as_ptr(), mode) != 0 {
            return Err(last_errno());
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_make_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("boot");
        let target = target.to_str().unwrap();

        make_mount_point(target).unwrap();
        assert!(Path::new(target).is_dir());
        // existing directories are accepted
        make_mount_point(target).unwrap();

        let nested = dir.path().join("missing/root");
        assert_eq!(
            make_mount_point(nested.to_str().unwrap()),
            Err(libc::ENOENT)
        );
    }

    #[test]
    fn test_access() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rootfs.squashfs");
        assert_eq!(access(&file, libc::F_OK), Err(libc::ENOENT));
        std::fs::write(&file, b"hsqs").unwrap();
        assert_eq!(access(&file, libc::R_OK), Ok(()));
    }

    #[test]
    fn test_chdir_missing() {
        assert_eq!(chdir("/nonexistent/mininit"), Err(libc::ENOENT));
    }
}
