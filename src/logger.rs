//! Severity-tagged log lines, written to the kernel log once it is
//! reachable and to stderr until then.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Write},
    sync::Mutex,
};

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::config::KMSG;

#[cfg(feature = "trace")]
const MAX_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(not(feature = "trace"))]
const MAX_LEVEL: LevelFilter = LevelFilter::Info;

enum Sink {
    Stderr,
    Kernel(File),
}

pub struct KernelLogger {
    sink: Mutex<Sink>,
}

static LOGGER: KernelLogger = KernelLogger {
    sink: Mutex::new(Sink::Stderr),
};

/// Install the process-wide logger, writing to stderr.
pub fn init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(MAX_LEVEL);

    Ok(())
}

/// Send every further line to the kernel log.
pub fn use_kernel_log() -> io::Result<()> {
    let kmsg = OpenOptions::new().write(true).open(KMSG)?;
    LOGGER.replace(Sink::Kernel(kmsg));

    Ok(())
}

/// Go back to stderr, closing the kernel log.
pub fn use_stderr() {
    LOGGER.replace(Sink::Stderr);
}

impl KernelLogger {
    fn replace(&self, sink: Sink) {
        if let Ok(mut current) = self.sink.lock() {
            *current = sink;
        }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= MAX_LEVEL
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record.level(), record.args());

        // one write per line: the kernel log turns every write into a record
        if let Ok(mut sink) = self.sink.lock() {
            let _ = match &mut *sink {
                Sink::Stderr => io::stderr().write_all(line.as_bytes()),
                Sink::Kernel(kmsg) => kmsg.write_all(line.as_bytes()),
            };
        }
    }

    fn flush(&self) {}
}

/// Syslog priority and tag of a log level.
fn prefix(level: Level) -> &'static str {
    match level {
        Level::Error => "<11>mininit: ERROR: ",
        Level::Warn => "<12>mininit: WARNING: ",
        Level::Info => "<14>mininit: ",
        Level::Debug | Level::Trace => "<15>mininit: ",
    }
}

fn format_line(level: Level, args: &fmt::Arguments<'_>) -> String {
    let mut line = format!("{}{args}", prefix(level));
    if !line.ends_with('\n') {
        line.push('\n');
    }

    line
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(Level::Info, &format_args!("{} mounted on {}", "/dev/loop0", "/root")),
            "<14>mininit: /dev/loop0 mounted on /root\n"
        );
        assert_eq!(
            format_line(Level::Error, &format_args!("Unable to re-open console")),
            "<11>mininit: ERROR: Unable to re-open console\n"
        );
        assert_eq!(
            format_line(Level::Warn, &format_args!("already terminated\n")),
            "<12>mininit: WARNING: already terminated\n"
        );
        assert_eq!(
            format_line(Level::Trace, &format_args!("x")),
            "<15>mininit: x\n"
        );
    }

    #[test]
    fn test_enabled() {
        let info = Metadata::builder().level(Level::Info).build();
        let error = Metadata::builder().level(Level::Error).build();
        assert!(LOGGER.enabled(&info));
        assert!(LOGGER.enabled(&error));

        let debug = Metadata::builder().level(Level::Debug).build();
        assert_eq!(LOGGER.enabled(&debug), cfg!(feature = "trace"));
    }
}
