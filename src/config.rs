//! Fixed layout of the boot medium and the parameters handed over by the kernel.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

/// Filesystem type of the rootfs image.
pub const ROOTFS_TYPE: &str = "squashfs";

/// Live rootfs image on the boot medium.
pub const ROOTFS_CURRENT: &str = "rootfs.squashfs";

/// Previous rootfs image, kept around by updates.
pub const ROOTFS_BACKUP: &str = "rootfs.squashfs.bak";

/// Argument token asking to boot the backup rootfs image.
pub const BACKUP_FLAG: &str = "rootfs_bak";

/// Environment variable with the comma-separated list of boot devices.
pub const BOOT_DEVICES_VAR: &str = "boot";

/// Filesystem type of the boot partition.
pub const BOOTFS_TYPE: &str = "vfat";

/// Suffix of the checksum file accompanying every image.
pub const CHECKSUM_SUFFIX: &str = ".sha1";

/// Suffix appended to an image when it is rotated out.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Kernel log device, preferred log sink.
pub const KMSG: &str = "/dev/kmsg";

/// Console node, relative to the new root.
pub const CONSOLE: &str = "dev/console";

/// Passes over the boot device list before giving up (about 2 seconds).
pub const BOOT_MOUNT_RETRIES: u32 = 20;

/// Parameters of this boot as requested by the kernel command line.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BootEnvironment {
    pub is_backup: bool,
}

impl BootEnvironment {
    /// Scan the process arguments (the program name included) for [`BACKUP_FLAG`].
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let is_backup = args
            .into_iter()
            .skip(1)
            .any(|arg| arg.as_ref() == OsStr::new(BACKUP_FLAG));

        Self { is_backup }
    }

    /// Rootfs image to boot from `boot_dir`: the backup when it was asked
    /// for and exists, the current image otherwise.
    pub fn rootfs_image(&self, boot_dir: &Path) -> PathBuf {
        let backup = boot_dir.join(ROOTFS_BACKUP);
        if self.is_backup && backup.exists() {
            backup
        } else {
            boot_dir.join(ROOTFS_CURRENT)
        }
    }
}
