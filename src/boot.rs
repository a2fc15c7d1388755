//! The boot sequence: from the boot medium to the exec of the real init.
//!
//! Every step depends on the previous one. Failures either abort the boot
//! (returned as [`Error`]) or are logged and skipped, as noted per step.

use std::{
    convert::Infallible,
    ffi::OsStr,
    fs::OpenOptions,
    io,
    os::fd::{AsRawFd, IntoRawFd, OwnedFd},
    path::{Path, PathBuf},
};

use log::{error, info};

use crate::{
    backend::BootBackend,
    change_dir::{chdir, chroot},
    cleanup::clean_old_root,
    config::{BootEnvironment, CONSOLE, ROOTFS_TYPE},
    devices,
    error::{Errno, Error, Result},
    logger, loop_device,
    mount::{MountFlag, Mountpoint, MountpointFlags},
    switch_root::{execute, find_init},
    update::{apply_updates, BootMedium, MountedBoot},
    INITS, NEW_ROOT,
};

/// The privileged operations of the boot, backend aside.
pub trait System {
    type Medium: BootMedium;

    /// Write access to the boot medium mounted on the working directory.
    fn boot_medium(&self) -> &Self::Medium;

    /// Where the files of the boot medium mounted at `boot_mount` are found.
    fn boot_dir(&self, boot_mount: &str) -> PathBuf {
        PathBuf::from(boot_mount)
    }

    fn change_dir(&self, path: &str) -> core::result::Result<(), Errno>;

    /// Loop-mount `image` read-only on [`NEW_ROOT`].
    fn mount_rootfs(&self, image: &Path) -> Result<()>;

    /// Move `/dev` inside the new root, the working directory.
    fn move_devices(&self) -> core::result::Result<(), Errno>;

    /// Point stdin, stdout and stderr at the console of the new root.
    fn reopen_console(&self) -> Result<()>;

    /// Make the working directory the root of this process.
    fn enter_root(&self) -> Result<()>;

    fn find_init(&self) -> Option<String>;

    /// Replace this process with `init`. Only returns on failure.
    fn exec<A, E>(&self, init: &str, args: A, env: E) -> Errno
    where
        A: IntoIterator,
        A::Item: AsRef<OsStr>,
        E: IntoIterator,
        E::Item: AsRef<OsStr>;
}

/// The running kernel.
#[derive(Copy, Clone, Debug, Default)]
pub struct LiveSystem;

impl System for LiveSystem {
    type Medium = MountedBoot;

    fn boot_medium(&self) -> &MountedBoot {
        &MountedBoot
    }

    fn change_dir(&self, path: &str) -> core::result::Result<(), Errno> {
        chdir(path)
    }

    fn mount_rootfs(&self, image: &Path) -> Result<()> {
        mount_rootfs(image)
    }

    fn move_devices(&self) -> core::result::Result<(), Errno> {
        devices::move_into_new_root()
    }

    fn reopen_console(&self) -> Result<()> {
        reopen_console()
    }

    fn enter_root(&self) -> Result<()> {
        chroot(".").map_err(|errno| {
            error!("'chroot' to new root failed: {errno}");
            Error::sys("chroot", ".", errno)
        })?;

        chdir("/").map_err(|errno| {
            error!("'chdir' to new root failed: {errno}");
            Error::sys("chdir", "/", errno)
        })
    }

    fn find_init(&self) -> Option<String> {
        find_init(&INITS).map(str::to_string)
    }

    fn exec<A, E>(&self, init: &str, args: A, env: E) -> Errno
    where
        A: IntoIterator,
        A::Item: AsRef<OsStr>,
        E: IntoIterator,
        E::Item: AsRef<OsStr>,
    {
        execute(init, args, env)
    }
}

/// Run the whole sequence with `backend` on `system`. `args` and `env` are
/// handed over to the init program, `args[0]` being this program.
///
/// Only returns when the boot failed.
pub fn run<B, S, A, E>(backend: &B, system: &S, args: &[A], env: E) -> Result<Infallible>
where
    B: BootBackend,
    S: System,
    A: AsRef<OsStr>,
    E: IntoIterator,
    E::Item: AsRef<OsStr>,
{
    let boot_env = BootEnvironment::from_args(args);

    let boot_mount = backend.mount_boot()?;
    system.change_dir(boot_mount).map_err(|errno| {
        error!("Unable to change to '{boot_mount}' directory: {errno}");
        Error::sys("chdir", boot_mount, errno)
    })?;

    let boot_dir = system.boot_dir(boot_mount);
    apply_updates(&boot_dir, boot_env.is_backup, system.boot_medium());

    let rootfs_image = boot_env.rootfs_image(&boot_dir);
    system.mount_rootfs(&rootfs_image)?;

    system.change_dir(NEW_ROOT).map_err(|errno| {
        error!("Unable to change to '{NEW_ROOT}' directory: {errno}");
        Error::sys("chdir", NEW_ROOT, errno)
    })?;

    system.move_devices().map_err(|errno| {
        error!("Unable to move the '{}' mount: {errno}", crate::DEV_DIR);
        Error::sys("move mount", crate::DEV_DIR, errno)
    })?;

    system.reopen_console()?;

    let old_root = enter_new_root(backend, || system.enter_root())?;
    info!("root switch done");

    if let Some(old_root) = old_root {
        let executable = args
            .first()
            .and_then(|program| program.as_ref().to_str())
            .unwrap_or_default();
        clean_old_root(old_root, executable);
    }

    let Some(init) = system.find_init() else {
        error!("Unable to find the 'init' executable");
        return Err(Error::InitNotFound);
    };
    info!("starting {init}");

    logger::use_stderr();
    let errno = system.exec(&init, args, env);
    error!("Exec of 'init' failed: {errno}");

    Err(Error::Exec {
        init,
        source: io::Error::from_raw_os_error(errno),
    })
}

/// Bind `image` to a loop device and mount it read-only on [`NEW_ROOT`].
fn mount_rootfs(image: &Path) -> Result<()> {
    let binding = loop_device::setup(image);
    let device = binding.device_path();

    log::debug!("Loop-mounting '{}' on '{NEW_ROOT}'", image.display());
    Mountpoint::new(
        Some(device.as_str()),
        NEW_ROOT,
        Some(ROOTFS_TYPE),
        MountpointFlags::new(&[MountFlag::ReadOnly]),
    )
    .and_then(|mountpoint| mountpoint.mount())
    .map_err(|errno| {
        error!("Failed to mount the rootfs image: {errno}");
        Error::sys("mount", &device, errno)
    })?;

    info!("{} mounted on {NEW_ROOT}", image.display());
    Ok(())
}

fn reopen_console() -> Result<()> {
    let console: OwnedFd = OpenOptions::new()
        .read(true)
        .write(true)
        .open(CONSOLE)
        .map_err(|err| {
            error!("Unable to re-open console: {err}");
            Error::Sys {
                op: "open",
                path: CONSOLE.to_string(),
                source: err,
            }
        })?
        .into();

    let fd = console.as_raw_fd();
    let duplicated = (0..=2).all(|target| unsafe { libc::dup2(fd, target) } == target);
    let err = io::Error::last_os_error();

    // a console landing on a standard descriptor must stay open
    if fd <= 2 {
        let _ = console.into_raw_fd();
    }

    if !duplicated {
        error!("Unable to duplicate console handles");
        return Err(Error::Console(err));
    }

    Ok(())
}

/// Switch to the new root and make it the root of this process with
/// `enter`, holding the handle on the old root across both.
///
/// The handle is closed whenever a step fails; on success it is returned
/// for the cleanup to consume.
pub fn enter_new_root<B, F>(backend: &B, enter: F) -> Result<Option<B::Cleanup>>
where
    B: BootBackend,
    F: FnOnce() -> Result<()>,
{
    let old_root = backend.open_handle_to_clean();

    backend.switch_root()?;
    enter()?;

    Ok(old_root)
}
