//! Mounting one of several candidate devices, with retries for media that
//! show up late (hotplugged SD cards and the like).

use std::{thread, time::Duration};

use log::{debug, error, info};

use crate::{
    error::{io_errno, Errno, Error, Result},
    mount::{MountFlag, Mountpoint, MountpointFlags},
    string::split_list,
};

/// Pause between two passes over the candidate list.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Filesystems registered in the running kernel.
pub const PROC_FILESYSTEMS: &str = "/proc/filesystems";

/// Try every entry of the comma-separated `sources` in order, restarting
/// from the first one after `backoff` until `retries` passes are done.
///
/// Returns the first candidate for which `attempt` succeeded.
pub fn try_candidates<'a, A, B>(
    sources: &'a str,
    retries: u32,
    mut attempt: A,
    mut backoff: B,
) -> Option<&'a str>
where
    A: FnMut(&str) -> bool,
    B: FnMut(),
{
    for pass in 0..retries {
        if pass > 0 {
            backoff();
        }

        if let Some(found) = split_list(sources, ',').find(|candidate| attempt(candidate)) {
            return Some(found);
        }
    }

    None
}

/// Mount the first available device of `sources` on `target`.
///
/// Without a filesystem type every filesystem registered in the kernel is
/// tried in turn.
pub fn multi_mount<'a>(
    sources: &'a str,
    target: &str,
    fstype: Option<&str>,
    flags: MountpointFlags,
    retries: u32,
) -> Result<&'a str> {
    let found = try_candidates(
        sources,
        retries,
        |source| mount_any(source, target, fstype, flags).is_ok(),
        || thread::sleep(RETRY_INTERVAL),
    );

    match found {
        Some(source) => {
            info!("{source} mounted on {target}");
            Ok(source)
        }
        None => {
            error!("Cannot mount {sources} on {target}");
            Err(Error::MountExhausted {
                sources: sources.to_string(),
                target: target.to_string(),
            })
        }
    }
}

fn mount_any(
    source: &str,
    target: &str,
    fstype: Option<&str>,
    flags: MountpointFlags,
) -> core::result::Result<(), Errno> {
    if fstype.is_some() || flags.contains(MountFlag::Move) {
        return Mountpoint::new(Some(source), target, fstype, flags)?.mount();
    }

    let content = std::fs::read_to_string(PROC_FILESYSTEMS).map_err(|err| {
        error!("Unable to read '{PROC_FILESYSTEMS}': {err}");
        io_errno(&err)
    })?;

    for fstype in registered_filesystems(&content).into_iter().rev() {
        if Mountpoint::new(Some(source), target, Some(fstype), flags)?
            .mount()
            .is_ok()
        {
            return Ok(());
        }
    }

    debug!("Failed attempt to mount {source} on {target}");
    Err(libc::ENODEV)
}

/// Block-device filesystems listed in a `/proc/filesystems` dump, in file
/// order. `nodev` entries are skipped, except `ubifs` which needs no block
/// device yet is mountable from a volume name.
pub fn registered_filesystems(content: &str) -> Vec<&str> {
    content
        .lines()
        .filter_map(|line| match line.strip_prefix("nodev\t") {
            Some("ubifs") => Some("ubifs"),
            Some(_) => None,
            None => line.strip_prefix('\t'),
        })
        .map(str::trim_end)
        .filter(|fstype| !fstype.is_empty())
        .collect()
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_first_success_stops() {
        let mut calls = Vec::new();
        let found = try_candidates(
            "/dev/mmcblk1p1,/dev/mmcblk0p1,/dev/sda1",
            20,
            |source| {
                calls.push(source.to_string());
                source == "/dev/mmcblk0p1"
            },
            || panic!("no backoff expected"),
        );
        assert_eq!(found, Some("/dev/mmcblk0p1"));
        assert_eq!(calls, ["/dev/mmcblk1p1", "/dev/mmcblk0p1"]);
    }

    #[test]
    fn test_bounded_attempts() {
        for (sources, count) in [("a", 1), ("a,b", 2), ("a,b,c,d", 4)] {
            for retries in [0, 1, 5, 20] {
                let mut attempts = 0;
                let mut backoffs = 0;
                let found = try_candidates(
                    sources,
                    retries,
                    |_| {
                        attempts += 1;
                        false
                    },
                    || backoffs += 1,
                );
                assert_eq!(found, None);
                assert_eq!(attempts, count * retries, "{sources} x {retries}");
                assert_eq!(backoffs, retries.saturating_sub(1));
            }
        }
    }

    #[test]
    fn test_late_device() {
        // the second candidate only appears during the sixth pass
        let pass = Cell::new(0);
        let mut attempts = 0;
        let found = try_candidates(
            "/dev/mmcblk1p1,/dev/mmcblk0p1",
            20,
            |source| {
                attempts += 1;
                source == "/dev/mmcblk0p1" && pass.get() >= 5
            },
            || pass.set(pass.get() + 1),
        );
        assert_eq!(found, Some("/dev/mmcblk0p1"));
        assert_eq!(pass.get(), 5);
        assert_eq!(attempts, 12);
    }

    #[test]
    fn test_every_pass_restarts_from_top() {
        let pass = Cell::new(0);
        let mut calls = Vec::new();
        let found = try_candidates(
            "first,second",
            3,
            |source| {
                calls.push((pass.get(), source.to_string()));
                source == "first" && pass.get() == 1
            },
            || pass.set(pass.get() + 1),
        );
        assert_eq!(found, Some("first"));
        assert_eq!(
            calls,
            [
                (0, "first".to_string()),
                (0, "second".to_string()),
                (1, "first".to_string())
            ]
        );
    }

    #[test]
    fn test_registered_filesystems() {
        let content = "nodev\tsysfs\nnodev\ttmpfs\n\text4\nnodev\tproc\n\tvfat\n\tsquashfs\nnodev\tubifs\n";
        assert_eq!(
            registered_filesystems(content),
            ["ext4", "vfat", "squashfs", "ubifs"]
        );
        assert!(registered_filesystems("").is_empty());
    }

    #[test]
    fn test_multi_mount_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().to_str().unwrap();
        let err = multi_mount(
            "/nonexistent/sdcard,/nonexistent/internal",
            target,
            Some("vfat"),
            MountpointFlags::new(&[MountFlag::ReadOnly]),
            2,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MountExhausted { .. }));
    }
}
