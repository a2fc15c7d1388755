use std::{
    ffi::{CString, OsStr},
    os::unix::ffi::OsStrExt,
    path::Path,
};

use crate::{
    change_dir::access,
    error::{last_errno, Errno},
    mount::move_mount,
    string::c_str,
};

/// Swap the root with `new_root`, the old root reappearing at `put_old`
/// (relative to `new_root`).
pub fn pivot_root(new_root: &str, put_old: &str) -> Result<(), Errno> {
    let new_root_str = c_str(new_root)?;
    let put_old_str = c_str(put_old)?;

    unsafe {
        /*
         * On success, zero is returned. On error, -1 is returned, and errno
         * is set to indicate the error.
         */
        if libc::syscall(
            libc::SYS_pivot_root,
            new_root_str.as_ptr(),
            put_old_str.as_ptr(),
        ) != 0
        {
            return Err(last_errno());
        }
    }

    Ok(())
}

/// Mount the current working directory over `/`.
pub fn move_root() -> Result<(), Errno> {
    move_mount(".", "/")
}

/// First of `candidates` that is executable.
pub fn find_init<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .inspect(|init| log::debug!("Checking for 'init' executable: {init}"))
        .find(|init| access(Path::new(init), libc::X_OK).is_ok())
}

/// Replace this process with `program`, handing over `args` with the
/// program name swapped for `program`, and `env` untouched.
///
/// Only returns on failure.
pub fn execute<A, E>(program: &str, args: A, env: E) -> Errno
where
    A: IntoIterator,
    A::Item: AsRef<OsStr>,
    E: IntoIterator,
    E::Item: AsRef<OsStr>,
{
    let program_str = match c_str(program) {
        Ok(str) => str,
        Err(errno) => return errno,
    };

    let argv: Vec<CString> = core::iter::once(program_str.clone())
        .chain(args.into_iter().skip(1).filter_map(|arg| to_c_string(arg.as_ref())))
        .collect();
    let envp: Vec<CString> = env
        .into_iter()
        .filter_map(|var| to_c_string(var.as_ref()))
        .collect();

    let argv_ptrs = null_terminated(&argv);
    let envp_ptrs = null_terminated(&envp);

    unsafe {
        /*
         * On success, execve() does not return, on error -1 is returned, and
         * errno is set to indicate the error.
         */
        libc::execve(program_str.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
    }

    last_errno()
}

/// Pointer array as expected by `execve`, borrowing from `items`.
fn null_terminated(items: &[CString]) -> Vec<*const libc::c_char> {
    items
        .iter()
        .map(|str| str.as_ptr())
        .chain(core::iter::once(core::ptr::null()))
        .collect()
}

fn to_c_string(str: &OsStr) -> Option<CString> {
    CString::new(str.as_bytes()).ok()
}
