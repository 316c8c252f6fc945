//! Unix file opening with optional direct I/O.
//!
//! Direct I/O (`O_DIRECT`) requires:
//! - buffer addresses aligned to the device alignment
//! - transfer offsets and sizes that are multiples of the device block size
//!
//! Not every filesystem supports it; [`create_temporary_in`] falls back to buffered
//! mode when it is refused.

use std::{
    fs::OpenOptions,
    os::unix::fs::OpenOptionsExt,
    path::Path,
};

use crate::fs::{IoMode, shared};

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn mode_flags(io_mode: IoMode) -> libc::c_int {
    match io_mode {
        IoMode::Buffered => 0,
        IoMode::Unbuffered => libc::O_DIRECT,
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn mode_flags(_io_mode: IoMode) -> libc::c_int {
    0
}

/// Opens an existing file (or block device) for reading.
pub fn open(file_path: &Path, io_mode: IoMode) -> std::io::Result<std::fs::File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(mode_flags(io_mode))
        .open(file_path)
}

/// Opens an existing file (or block device) for reading and writing.
pub fn open_rw(file_path: &Path, io_mode: IoMode) -> std::io::Result<std::fs::File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(mode_flags(io_mode))
        .open(file_path)
}

/// Creates a new file with read and write access.
///
/// Fails if the file already exists.
pub fn create(file_path: &Path, io_mode: IoMode) -> std::io::Result<std::fs::File> {
    OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .custom_flags(mode_flags(io_mode))
        .open(file_path)
}

/// Creates an anonymous temporary file in `folder_path`.
///
/// On Linux `O_TMPFILE` is tried first; otherwise a named file is created with
/// mode 0600 and unlinked immediately. If the filesystem refuses unbuffered mode,
/// the file is created buffered instead.
pub fn create_temporary_in(folder_path: &Path, io_mode: IoMode) -> std::io::Result<std::fs::File> {
    match create_temp(folder_path, io_mode) {
        Ok(file) => Ok(file),
        Err(e) if io_mode == IoMode::Unbuffered => {
            log::debug!("unbuffered temporary file refused ({e}), using buffered mode");
            create_temp(folder_path, IoMode::Buffered)
        }
        Err(e) => Err(e),
    }
}

fn create_temp(folder_path: &Path, io_mode: IoMode) -> std::io::Result<std::fs::File> {
    #[cfg(target_os = "linux")]
    {
        let res = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_TMPFILE | mode_flags(io_mode))
            .open(folder_path);
        if res.is_ok() {
            return res;
        }
    }

    let file_path = folder_path.join(shared::temp_file_name(12));
    create_temp_generic(&file_path, io_mode)
}

fn create_temp_generic(file_path: &Path, io_mode: IoMode) -> std::io::Result<std::fs::File> {
    let tmp;
    let file_path = if !file_path.is_absolute() {
        tmp = std::env::current_dir()?.join(file_path);
        tmp.as_path()
    } else {
        file_path
    };

    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(mode_flags(io_mode))
        .open(file_path)?;
    let _ = std::fs::remove_file(file_path);
    Ok(f)
}
