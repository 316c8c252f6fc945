//! Opening files for direct I/O.

#[cfg_attr(unix, path = "unix.rs")]
mod platform;
mod shared;

pub use platform::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// I/O goes through the page cache.
    Buffered,
    /// I/O bypasses the page cache (`O_DIRECT` where the platform has it).
    Unbuffered,
}
