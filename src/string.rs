use std::{ffi::CString, os::unix::ffi::OsStrExt, path::Path};

use crate::error::Errno;

/// NUL-terminated copy of `str`, ready to be handed to the kernel.
pub fn c_str(str: &str) -> Result<CString, Errno> {
    CString::new(str).map_err(|_| libc::EINVAL)
}

pub fn c_path(path: &Path) -> Result<CString, Errno> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| libc::EINVAL)
}

/// Iterate over the non-empty entries of a `delim`-separated list,
/// borrowing from `list` in order.
pub fn split_list(list: &str, delim: char) -> impl Iterator<Item = &str> + Clone {
    list.split(delim).filter(|entry| !entry.is_empty())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_list() {
        let entries: Vec<_> = split_list("/dev/mmcblk1p1,/dev/mmcblk0p1", ',').collect();
        assert_eq!(entries, ["/dev/mmcblk1p1", "/dev/mmcblk0p1"]);

        let entries: Vec<_> = split_list(",/dev/sda1,,", ',').collect();
        assert_eq!(entries, ["/dev/sda1"]);

        assert_eq!(split_list("", ',').count(), 0);
    }

    #[test]
    fn test_c_str_rejects_nul() {
        assert_eq!(c_str("/dev\0/loop0").unwrap_err(), libc::EINVAL);
        assert_eq!(c_str("/dev/loop0").unwrap().as_bytes(), b"/dev/loop0");
        assert_eq!(c_path(Path::new("/boot")).unwrap().as_bytes(), b"/boot");
    }
}
