//! Backend for an init living on the boot partition itself: the running
//! root already is the boot medium and gets pivoted away under `boot`.

use log::{debug, error};

use crate::{
    backend::BootBackend,
    cleanup::OldRoot,
    error::{Error, Result},
    switch_root::pivot_root,
};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SystemPartition;

impl BootBackend for SystemPartition {
    type Cleanup = OldRoot;

    fn mount_boot(&self) -> Result<&str> {
        Ok("/")
    }

    fn open_handle_to_clean(&self) -> Option<OldRoot> {
        None
    }

    fn switch_root(&self) -> Result<()> {
        debug!("Pivoting root");

        pivot_root(".", "boot").map_err(|errno| {
            error!("Unable to pivot root: {errno}");
            Error::sys("pivot_root", ".", errno)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_boot_is_running_root() {
        let backend = SystemPartition;
        assert_eq!(backend.mount_boot().unwrap(), "/");
        assert!(backend.open_handle_to_clean().is_none());
    }
}
