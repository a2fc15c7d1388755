use std::{ffi::OsString, process::ExitCode};

use log::{error, info, warn};
use mininit::{backend, boot, devices, logger};

fn main() -> ExitCode {
    // stderr until the kernel log is reachable
    let _ = logger::init();

    devices::mount_devices();

    let kmsg = logger::use_kernel_log();
    info!("mininit {}", env!("CARGO_PKG_VERSION"));
    if let Err(err) = kmsg {
        warn!("Failed to open '{}': {err}", mininit::config::KMSG);
    }

    let args: Vec<OsString> = std::env::args_os().collect();
    let backend = backend::selected();

    let env = std::env::vars_os().map(env_entry);

    match boot::run(&backend, &boot::LiveSystem, &args, env) {
        Ok(never) => match never {},
        Err(err) => {
            error!("{err}");
            logger::use_stderr();
            // the C convention of init returning -1
            ExitCode::from(u8::MAX)
        }
    }
}

fn env_entry((key, value): (OsString, OsString)) -> OsString {
    let mut entry = key;
    entry.push("=");
    entry.push(value);
    entry
}
