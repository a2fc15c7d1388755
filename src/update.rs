//! Promotion of staged image updates found on the boot medium.
//!
//! Every slot is a live image plus its checksum file. A staged payload
//! replaces the live image, which is first rotated to `.bak`. The renames
//! are not grouped into a transaction: nothing else writes the boot medium
//! at this point of the boot.

use std::{
    fs::{self, Permissions},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use log::{debug, error, info};

use crate::{
    change_dir::access,
    config::{BACKUP_SUFFIX, CHECKSUM_SUFFIX, ROOTFS_CURRENT},
    error::Errno,
    mount::{remount, MountFlag},
};

/// One staged-update slot of the boot medium.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UpdateSlot {
    pub name: &'static str,
    pub staged: &'static str,
    pub live: &'static str,
}

pub const MODULES: UpdateSlot = UpdateSlot {
    name: "modules",
    staged: "update_m.bin",
    live: "modules.squashfs",
};

pub const ROOTFS: UpdateSlot = UpdateSlot {
    name: "rootfs",
    staged: "update_r.bin",
    live: ROOTFS_CURRENT,
};

impl UpdateSlot {
    fn staged(&self, dir: &Path) -> PathBuf {
        dir.join(self.staged)
    }

    fn live(&self, dir: &Path) -> PathBuf {
        dir.join(self.live)
    }

    fn backup(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}{BACKUP_SUFFIX}", self.live))
    }

    /// Rotate the live image to `.bak`, unless booting from the backup
    /// which must then be kept, then promote the staged payload.
    fn apply(&self, dir: &Path, is_backup: bool) -> bool {
        info!("performing {} update", self.name);

        let backup = self.backup(dir);
        if !is_backup || !backup.exists() {
            rename_with_checksum(&self.live(dir), &backup);
        }

        rename_with_checksum(&self.staged(dir), &self.live(dir))
    }
}

/// Staged payloads present on the boot medium.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct UpdateBundle {
    pub modules: bool,
    pub rootfs: bool,
}

impl UpdateBundle {
    pub fn detect(dir: &Path) -> Self {
        let staged = |slot: UpdateSlot| access(&slot.staged(dir), libc::R_OK).is_ok();

        Self {
            modules: staged(MODULES),
            rootfs: staged(ROOTFS),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.modules && !self.rootfs
    }

    fn slots(&self) -> impl Iterator<Item = UpdateSlot> {
        [(self.modules, MODULES), (self.rootfs, ROOTFS)]
            .into_iter()
            .filter_map(|(present, slot)| present.then_some(slot))
    }
}

/// Write access to the filesystem holding the images.
pub trait BootMedium {
    fn is_read_only(&self) -> bool;
    fn remount_read_write(&self) -> Result<(), Errno>;
    fn remount_read_only(&self) -> Result<(), Errno>;
    fn sync(&self);
}

/// The boot medium mounted at the current working directory.
#[derive(Copy, Clone, Debug, Default)]
pub struct MountedBoot;

impl BootMedium for MountedBoot {
    fn is_read_only(&self) -> bool {
        access(Path::new("."), libc::W_OK) == Err(libc::EROFS)
    }

    fn remount_read_write(&self) -> Result<(), Errno> {
        remount(".", &[MountFlag::NoAccessTime])
    }

    fn remount_read_only(&self) -> Result<(), Errno> {
        remount(".", &[MountFlag::ReadOnly])
    }

    fn sync(&self) {
        unsafe { libc::sync() };
    }
}

/// Apply the updates staged in `dir`, the mount point of `medium`.
///
/// Nothing is remounted when no update is staged. When the medium cannot be
/// made writable the updates are skipped and the live images left alone.
/// Returns the bundle that was applied.
pub fn apply_updates(dir: &Path, is_backup: bool, medium: &impl BootMedium) -> UpdateBundle {
    let bundle = UpdateBundle::detect(dir);
    if bundle.is_empty() {
        return bundle;
    }

    if medium.is_read_only() {
        info!("remounting boot device read-write");
        if let Err(errno) = medium.remount_read_write() {
            error!("Unable to remount boot device read-write: {errno}");
            return UpdateBundle::default();
        }
    }

    for slot in bundle.slots() {
        if slot.apply(dir, is_backup) && slot == ROOTFS {
            seal_rootfs(&slot.live(dir));
        }
    }

    medium.sync();

    info!("remounting boot device read-only");
    if let Err(errno) = medium.remount_read_only() {
        error!("Unable to remount boot device read-only: {errno}");
    }

    bundle
}

/// Rename `from` to `to` along with their checksum files. Returns whether
/// the image itself was moved.
fn rename_with_checksum(from: &Path, to: &Path) -> bool {
    let moved = rename(from, to);
    rename(&with_checksum(from), &with_checksum(to));
    moved
}

fn rename(from: &Path, to: &Path) -> bool {
    match fs::rename(from, to) {
        Ok(()) => true,
        Err(err) => {
            debug!(
                "Failed to rename '{}' to '{}': {err}",
                from.display(),
                to.display()
            );
            false
        }
    }
}

fn with_checksum(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

/// The live rootfs belongs to root and is never written in place.
fn seal_rootfs(image: &Path) {
    if let Err(err) = std::os::unix::fs::chown(image, Some(0), Some(0)) {
        debug!("Failed to chown '{}': {err}", image.display());
    }

    if let Err(err) = fs::set_permissions(image, Permissions::from_mode(0o444)) {
        debug!("Failed to chmod '{}': {err}", image.display());
    }
}
