extern crate libc;

pub mod backend;
pub mod boot;
pub mod change_dir;
pub mod cleanup;
pub mod config;
pub mod devices;
pub mod error;
pub mod initramfs;
pub mod logger;
pub mod loop_device;
pub mod mount;
pub mod multi_mount;
pub mod string;
pub mod switch_root;
pub mod syspart;
pub mod update;

pub use error::{Error, Result};

/// Directory holding the device nodes, devtmpfs gets mounted here.
pub const DEV_DIR: &str = "/dev";

/// Mount point of the rootfs image before it becomes `/`.
pub const NEW_ROOT: &str = "/root";

/// Programs tried, in order, as the init of the new root.
pub const INITS: [&str; 4] = ["/sbin/init", "/etc/init", "/bin/init", "/bin/sh"];
