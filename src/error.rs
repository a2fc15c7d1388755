use std::{fmt::Display, io};

/// Raw errno as reported by the kernel for a failed call.
pub type Errno = libc::c_int;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{op} '{path}' failed: {source}")]
    Sys {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot mount {sources} on {target}")]
    MountExhausted { sources: String, target: String },

    #[error("'{0}' parameter not found")]
    MissingParameter(&'static str),

    #[error("unable to duplicate console handles: {0}")]
    Console(#[source] io::Error),

    #[error("unable to find the 'init' executable")]
    InitNotFound,

    #[error("exec of '{init}' failed: {source}")]
    Exec {
        init: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn sys(op: &'static str, path: impl Display, errno: Errno) -> Self {
        Self::Sys {
            op,
            path: path.to_string(),
            source: io::Error::from_raw_os_error(errno),
        }
    }
}

/// Errno of the last failed libc call on this thread.
pub(crate) fn last_errno() -> Errno {
    io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

/// Errno carried by an [`io::Error`] coming from std, `EIO` if there is none.
pub(crate) fn io_errno(err: &io::Error) -> Errno {
    err.raw_os_error().unwrap_or(libc::EIO)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sys_error_keeps_errno() {
        let err = Error::sys("mount", "/root", libc::ENOENT);
        let Error::Sys { source, .. } = &err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
        let msg = err.to_string();
        assert!(msg.starts_with("mount '/root' failed: "), "{msg}");
    }

    #[test]
    fn test_logical_errors() {
        assert_eq!(
            Error::InitNotFound.to_string(),
            "unable to find the 'init' executable"
        );
        assert_eq!(
            Error::MissingParameter("boot").to_string(),
            "'boot' parameter not found"
        );
    }
}
