use std::io;

/// Converts a C return value to a Rust `Result`.
#[inline]
pub(crate) fn from_c_ret(ret: i32) -> io::Result<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(ret))
    }
}

/// Converts a non-zero C return value to a Rust `Result`.
#[inline]
pub(crate) fn from_c_err<T>(code: i32) -> io::Result<T> {
    Err(io::Error::from_raw_os_error(code))
}
