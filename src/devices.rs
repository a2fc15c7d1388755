//! Device nodes for the boot: devtmpfs when the kernel has it, a tmpfs
//! with a fixed set of static nodes otherwise (`static-dev` feature).

use log::info;

use crate::{
    error::Errno,
    mount::{move_mount, Mountpoint, MountpointFlags},
    DEV_DIR,
};

/// Nodes created on the tmpfs `/dev`: name, block device, major, minor.
#[cfg(feature = "static-dev")]
pub const STATIC_NODES: [(&str, bool, u32, u32); 7] = [
    ("kmsg", false, 1, 11),
    ("console", false, 5, 1),
    ("loop0", true, 7, 0),
    ("mmcblk0", true, 179, 0),
    ("mmcblk0p1", true, 179, 1),
    ("mmcblk0p2", true, 179, 2),
    ("mmcblk0p3", true, 179, 3),
];

/// Populate `/dev`. Failures are only logged: static nodes shipped along
/// this program may be enough to boot.
pub fn mount_devices() {
    #[cfg(not(feature = "static-dev"))]
    let (source, fstype) = ("devtmpfs", "devtmpfs");

    #[cfg(feature = "static-dev")]
    let (source, fstype) = ("tmpfs", "tmpfs");

    let mounted = Mountpoint::new(Some(source), DEV_DIR, Some(fstype), MountpointFlags::default())
        .and_then(|mountpoint| mountpoint.mount());

    match mounted {
        // already mounted by the kernel
        Ok(()) | Err(libc::EBUSY) => {}
        Err(errno) => info!("Couldn't mount {fstype} on {DEV_DIR}: {errno}"),
    }

    #[cfg(feature = "static-dev")]
    make_static_nodes();
}

#[cfg(feature = "static-dev")]
fn make_static_nodes() {
    for (name, block, major, minor) in STATIC_NODES {
        let path = format!("{DEV_DIR}/{name}");
        let Ok(node) = crate::string::c_str(&path) else {
            continue;
        };
        let kind = if block { libc::S_IFBLK } else { libc::S_IFCHR };

        unsafe {
            if libc::mknod(node.as_ptr(), kind | 0o644, libc::makedev(major, minor)) != 0 {
                log::debug!(
                    "Failed to create '{path}': {}",
                    crate::error::last_errno()
                );
            }
        }
    }
}

/// Move the `/dev` mount into the new root, the current directory.
/// Static nodes stay behind: the new root brings its own.
pub fn move_into_new_root() -> Result<(), Errno> {
    if cfg!(feature = "static-dev") {
        return Ok(());
    }

    log::debug!("Moving '{DEV_DIR}' mount");
    move_mount(DEV_DIR, "dev")
}
