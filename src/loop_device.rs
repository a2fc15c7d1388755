//! Binding of a regular file to a loop block device through the loop ioctls.

use std::{
    fs::{File, OpenOptions},
    os::{fd::AsRawFd, unix::ffi::OsStrExt},
    path::{Path, PathBuf},
};

use log::{debug, error, warn};

use crate::error::{io_errno, last_errno, Errno};

/// Interface handing out free loop devices.
pub const LOOP_CONTROL: &str = "/dev/loop-control";

const LOOP_SET_FD: libc::c_ulong = 0x4C00;
const LOOP_SET_STATUS64: libc::c_ulong = 0x4C04;
const LOOP_CTL_GET_FREE: libc::c_ulong = 0x4C82;

const LO_NAME_SIZE: usize = 64;
const LO_KEY_SIZE: usize = 32;

/// Mirror of the kernel `struct loop_info64`.
#[allow(dead_code)]
#[repr(C)]
struct LoopInfo64 {
    lo_device: u64,
    lo_inode: u64,
    lo_rdevice: u64,
    lo_offset: u64,
    lo_sizelimit: u64,
    lo_number: u32,
    lo_encrypt_type: u32,
    lo_encrypt_key_size: u32,
    lo_flags: u32,
    lo_file_name: [u8; LO_NAME_SIZE],
    lo_crypt_name: [u8; LO_NAME_SIZE],
    lo_encrypt_key: [u8; LO_KEY_SIZE],
    lo_init: [u64; 2],
}

impl LoopInfo64 {
    fn with_file_name(backing_file: &Path) -> Self {
        let mut info = Self {
            lo_device: 0,
            lo_inode: 0,
            lo_rdevice: 0,
            lo_offset: 0,
            lo_sizelimit: 0,
            lo_number: 0,
            lo_encrypt_type: 0,
            lo_encrypt_key_size: 0,
            lo_flags: 0,
            lo_file_name: [0; LO_NAME_SIZE],
            lo_crypt_name: [0; LO_NAME_SIZE],
            lo_encrypt_key: [0; LO_KEY_SIZE],
            lo_init: [0; 2],
        };

        // keep the last byte as terminator, the kernel truncates the same way
        let name = backing_file.as_os_str().as_bytes();
        let len = name.len().min(LO_NAME_SIZE - 1);
        info.lo_file_name[..len].copy_from_slice(&name[..len]);

        info
    }
}

/// A loop device bound to a backing file. Once bound the device stays
/// attached for as long as the kernel keeps it, nothing here detaches it.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopBinding {
    pub minor: u32,
    pub backing_file: PathBuf,
}

impl LoopBinding {
    pub fn device_path(&self) -> String {
        device_path(self.minor)
    }
}

pub fn device_path(minor: u32) -> String {
    format!("/dev/loop{minor}")
}

/// Ask `control` for the minor number of a free loop device.
pub fn acquire_free_device_at(control: &str) -> Result<u32, Errno> {
    let control = OpenOptions::new()
        .read(true)
        .write(true)
        .open(control)
        .map_err(|err| io_errno(&err))?;

    let minor = unsafe { libc::ioctl(control.as_raw_fd(), LOOP_CTL_GET_FREE as _) };
    if minor < 0 {
        return Err(last_errno());
    }

    Ok(minor as u32)
}

/// Minor number of a free loop device. Loop device 0 is assumed when none
/// can be acquired: early in the boot nothing else has claimed it yet.
pub fn free_minor() -> u32 {
    if cfg!(feature = "no-loop-control") {
        return 0;
    }

    free_minor_from(acquire_free_device_at(LOOP_CONTROL))
}

pub(crate) fn free_minor_from(acquired: Result<u32, Errno>) -> u32 {
    match acquired {
        Ok(minor) => {
            debug!("Got free loop device: {minor}");
            minor
        }
        Err(errno) => {
            warn!("Failed to acquire free loop device: {errno}");
            0
        }
    }
}

/// Set `backing_file` as the backing file of the loop device `device`.
///
/// Recording the file name in the device status happens after the
/// descriptor is bound; its failure is only reported since the device
/// is already usable.
pub fn bind(device: &str, backing_file: &Path) -> Result<(), Errno> {
    debug!(
        "Setting up loop: '{}' via '{device}'",
        backing_file.display()
    );

    let file = File::open(backing_file).map_err(|err| {
        error!("losetup: cannot open '{}': {err}", backing_file.display());
        io_errno(&err)
    })?;

    let loop_dev = File::open(device).map_err(|err| {
        error!("losetup: cannot open '{device}': {err}");
        io_errno(&err)
    })?;

    unsafe {
        if libc::ioctl(loop_dev.as_raw_fd(), LOOP_SET_FD as _, file.as_raw_fd()) < 0 {
            let errno = last_errno();
            error!("Cannot setup loop device '{device}': {errno}");
            return Err(errno);
        }
    }

    let info = LoopInfo64::with_file_name(backing_file);
    unsafe {
        if libc::ioctl(
            loop_dev.as_raw_fd(),
            LOOP_SET_STATUS64 as _,
            &info as *const LoopInfo64,
        ) < 0
        {
            warn!(
                "Cannot set status of loop device '{device}': {}",
                last_errno()
            );
        }
    }

    Ok(())
}

/// Grab a free loop device and bind `backing_file` to it. A failed bind is
/// only logged, mounting the device is what decides the fate of the boot.
pub fn setup(backing_file: &Path) -> LoopBinding {
    let binding = LoopBinding {
        minor: free_minor(),
        backing_file: backing_file.to_path_buf(),
    };

    let _ = bind(&binding.device_path(), backing_file);

    binding
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_device_path() {
        assert_eq!(device_path(0), "/dev/loop0");
        let binding = LoopBinding {
            minor: 255,
            backing_file: PathBuf::from("/boot/rootfs.squashfs"),
        };
        assert_eq!(binding.device_path(), "/dev/loop255");
    }

    #[test]
    fn test_acquire_fallback() {
        let missing = acquire_free_device_at("/nonexistent/loop-control");
        assert_eq!(missing, Err(libc::ENOENT));
        assert_eq!(free_minor_from(missing), 0);
        assert_eq!(free_minor_from(Ok(3)), 3);
    }

    #[test]
    fn test_acquire_not_a_control_device() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let errno = acquire_free_device_at(file.path().to_str().unwrap()).unwrap_err();
        assert_eq!(errno, libc::ENOTTY);
    }

    #[test]
    fn test_bind_failures() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("rootfs.squashfs");

        assert_eq!(bind("/dev/loop0", &image), Err(libc::ENOENT));

        std::fs::write(&image, b"hsqs").unwrap();
        let not_a_device = dir.path().join("loop0");
        std::fs::write(&not_a_device, b"").unwrap();
        assert_eq!(
            bind(not_a_device.to_str().unwrap(), &image),
            Err(libc::ENOTTY)
        );
    }

    #[test]
    fn test_status_file_name_truncated() {
        let long = PathBuf::from(format!("/boot/{}", "a".repeat(100)));
        let info = LoopInfo64::with_file_name(&long);
        assert_eq!(info.lo_file_name[LO_NAME_SIZE - 1], 0);
        assert_eq!(&info.lo_file_name[..6], b"/boot/");

        let short = LoopInfo64::with_file_name(Path::new("rootfs.squashfs"));
        assert_eq!(&short.lo_file_name[..16], b"rootfs.squashfs\0");
    }

    #[test]
    fn test_loop_info_layout() {
        assert_eq!(core::mem::size_of::<LoopInfo64>(), 232);
    }
}
