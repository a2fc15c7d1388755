//! Backend for an init living in an initramfs: the boot partition is a
//! separate device to be found and mounted, and moved into the new root
//! before that root is moved over the initramfs.

use log::{debug, error, warn};

use crate::{
    backend::BootBackend,
    change_dir::make_mount_point,
    cleanup::OldRoot,
    config::{BOOTFS_TYPE, BOOT_DEVICES_VAR, BOOT_MOUNT_RETRIES},
    error::{Error, Result},
    mount::{move_mount, MountFlag, MountpointFlags},
    multi_mount::multi_mount,
    switch_root::move_root,
    NEW_ROOT,
};

/// Mount point of the boot partition inside the initramfs.
pub const BOOT_MOUNT: &str = "/boot";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Initramfs {
    /// Comma-separated candidate boot devices.
    pub boot_devices: Option<String>,
}

impl Initramfs {
    pub fn from_env() -> Self {
        Self {
            boot_devices: std::env::var(BOOT_DEVICES_VAR).ok(),
        }
    }
}

impl BootBackend for Initramfs {
    type Cleanup = OldRoot;

    fn mount_boot(&self) -> Result<&str> {
        let Some(boot_devices) = self.boot_devices.as_deref() else {
            error!("'{BOOT_DEVICES_VAR}' parameter not found");
            return Err(Error::MissingParameter(BOOT_DEVICES_VAR));
        };

        // Most likely fatal, but let the mount itself tell.
        for path in [BOOT_MOUNT, NEW_ROOT] {
            if let Err(errno) = make_mount_point(path) {
                warn!("Failed to create '{path}' mount point: {errno}");
            }
        }

        multi_mount(
            boot_devices,
            BOOT_MOUNT,
            Some(BOOTFS_TYPE),
            MountpointFlags::new(&[MountFlag::ReadOnly]),
            BOOT_MOUNT_RETRIES,
        )?;

        Ok(BOOT_MOUNT)
    }

    fn open_handle_to_clean(&self) -> Option<OldRoot> {
        OldRoot::open("/")
            .map_err(|errno| debug!("Failed to open '/' before switch: {errno}"))
            .ok()
    }

    fn switch_root(&self) -> Result<()> {
        debug!("Switching root");

        // The boot mount would be lost once the new root covers it.
        move_mount(BOOT_MOUNT, "boot").map_err(|errno| {
            error!("Unable to move the '{BOOT_MOUNT}' mount: {errno}");
            Error::sys("move mount", BOOT_MOUNT, errno)
        })?;

        move_root().map_err(|errno| {
            error!("Unable to switch to the new root: {errno}");
            Error::sys("move mount", NEW_ROOT, errno)
        })
    }
}
