use std::ffi::CString;

use crate::{error::Errno, string::c_str};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MountFlag {
    Move,
    Remount,
    NoAccessTime,
    ReadOnly,
}

impl MountFlag {
    fn bits(self) -> libc::c_ulong {
        match self {
            MountFlag::Move => libc::MS_MOVE,
            MountFlag::Remount => libc::MS_REMOUNT,
            MountFlag::NoAccessTime => libc::MS_NOATIME,
            MountFlag::ReadOnly => libc::MS_RDONLY,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MountpointFlags {
    bits: libc::c_ulong,
}

impl MountpointFlags {
    pub fn new(flags: &[MountFlag]) -> Self {
        let bits = flags.iter().fold(0, |bits, flag| bits | flag.bits());

        Self { bits }
    }

    pub fn with(self, flag: MountFlag) -> Self {
        Self {
            bits: self.bits | flag.bits(),
        }
    }

    pub fn contains(&self, flag: MountFlag) -> bool {
        self.bits & flag.bits() == flag.bits()
    }

    pub(crate) fn bits(&self) -> libc::c_ulong {
        self.bits
    }
}

pub struct Mountpoint {
    src: Option<CString>,
    target: CString,
    fstype: Option<CString>,
    flags: MountpointFlags,
}

impl Mountpoint {
    pub fn new(
        src: Option<&str>,
        target: &str,
        fstype: Option<&str>,
        flags: MountpointFlags,
    ) -> Result<Self, Errno> {
        let src = src.map(c_str).transpose()?;
        let target = c_str(target)?;
        let fstype = fstype.map(c_str).transpose()?;

        Ok(Self {
            src,
            target,
            fstype,
            flags,
        })
    }

    pub fn mount(&self) -> Result<(), Errno> {
        let src = self
            .src
            .as_ref()
            .map_or(core::ptr::null(), |src| src.as_ptr());

        let fstype = self
            .fstype
            .as_ref()
            .map_or(core::ptr::null(), |fstype| fstype.as_ptr());

        unsafe {
            /*
             * On success, zero is returned.  On error, -1 is returned, and errno
             * is set to indicate the error.
             */
            if libc::mount(
                src,
                self.target.as_ptr(),
                fstype,
                self.flags.bits(),
                core::ptr::null(),
            ) != 0
            {
                return Err(crate::error::last_errno());
            }
        }

        Ok(())
    }
}

/// Atomically relocate the mount at `src` to `target`.
pub fn move_mount(src: &str, target: &str) -> Result<(), Errno> {
    Mountpoint::new(
        Some(src),
        target,
        None,
        MountpointFlags::new(&[MountFlag::Move]),
    )?
    .mount()
}

/// Change the flags of the filesystem already mounted at `target`.
pub fn remount(target: &str, flags: &[MountFlag]) -> Result<(), Errno> {
    let flags = MountpointFlags::new(flags).with(MountFlag::Remount);

    Mountpoint::new(None, target, None, flags)?.mount()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flags() {
        let flags = MountpointFlags::new(&[MountFlag::Remount, MountFlag::ReadOnly]);
        assert_eq!(flags.bits(), libc::MS_REMOUNT | libc::MS_RDONLY);
        assert!(flags.contains(MountFlag::ReadOnly));
        assert!(!flags.contains(MountFlag::Move));
        assert_eq!(MountpointFlags::new(&[]).bits(), 0);

        let remount = MountpointFlags::new(&[MountFlag::ReadOnly]).with(MountFlag::Remount);
        assert_eq!(remount, flags);
        assert!(remount.with(MountFlag::Remount).contains(MountFlag::Remount));
    }

    #[test]
    fn test_invalid_target() {
        assert_eq!(
            Mountpoint::new(None, "/ro\0ot", None, MountpointFlags::default()).err(),
            Some(libc::EINVAL)
        );
    }

    #[test]
    fn test_move_missing_mount() {
        // either not a mount point or not permitted, never a success
        assert!(move_mount("/nonexistent/mininit/src", "/nonexistent/mininit/dst").is_err());
    }
}
