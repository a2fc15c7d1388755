//! Where the boot medium lives and how the root gets switched depends on
//! the platform. Exactly one backend is built in, picked by the `syspart`
//! feature.

use crate::{cleanup::CleanupTarget, error::Result};

pub trait BootBackend {
    type Cleanup: CleanupTarget;

    /// Make the partition holding the rootfs image available and return
    /// its mount point.
    fn mount_boot(&self) -> Result<&str>;

    /// Handle on the directory to clean up once the root is switched, if
    /// there is anything to clean up.
    fn open_handle_to_clean(&self) -> Option<Self::Cleanup>;

    /// Make the current directory the root, keeping the boot medium
    /// reachable as its `boot` subdirectory.
    fn switch_root(&self) -> Result<()>;
}

#[cfg(not(feature = "syspart"))]
pub type Selected = crate::initramfs::Initramfs;

#[cfg(feature = "syspart")]
pub type Selected = crate::syspart::SystemPartition;

/// The backend this image was built for.
pub fn selected() -> Selected {
    #[cfg(not(feature = "syspart"))]
    return crate::initramfs::Initramfs::from_env();

    #[cfg(feature = "syspart")]
    return crate::syspart::SystemPartition;
}
