//! Block-device topology on Linux, read through the block layer ioctls.

use std::{
    fs::File,
    os::{
        fd::{AsRawFd, BorrowedFd},
        unix::fs::FileTypeExt,
    },
};

use dirio_common::{Error, Result};

use super::DeviceTopology;

const PHASE: &str = "block device";

// _IO(0x12, nr): these requests carry no size, so the encoding is the same on
// every architecture.
const BLKSSZGET: u32 = 0x1268;
const BLKIOMIN: u32 = 0x1278;
const BLKIOOPT: u32 = 0x1279;
const BLKALIGNOFF: u32 = 0x127a;
const BLKPBSZGET: u32 = 0x127b;

/// Reads the topology of the block device `fd` refers to.
///
/// Works on a duplicate of `fd`, which is closed on every return path. Fails if
/// the descriptor cannot be duplicated, does not refer to a block device, or none
/// of the topology queries succeed. Individual queries that fail leave their
/// field at 0.
pub(super) fn probe_block_device(fd: BorrowedFd<'_>) -> Result<DeviceTopology> {
    let dup = fd
        .try_clone_to_owned()
        .map_err(|e| Error::io("duplicate descriptor for device probe", e))?;
    let device = File::from(dup);

    let file_type = device
        .metadata()
        .map_err(|e| Error::io("stat descriptor for device probe", e))?
        .file_type();
    if !file_type.is_block_device() {
        return Err(Error::topology_unavailable(PHASE, "not a block device"));
    }

    let alignment_offset = query_int(&device, BLKALIGNOFF);
    let minimum_io_size = query_uint(&device, BLKIOMIN);
    let optimal_io_size = query_uint(&device, BLKIOOPT);
    let logical_sector_size = query_int(&device, BLKSSZGET);
    let physical_sector_size = query_uint(&device, BLKPBSZGET);

    let answered = [
        alignment_offset,
        minimum_io_size,
        optimal_io_size,
        logical_sector_size,
        physical_sector_size,
    ];
    if answered.iter().all(Option::is_none) {
        return Err(Error::topology_unavailable(
            PHASE,
            format!(
                "no topology queries succeeded: {}",
                std::io::Error::last_os_error()
            ),
        ));
    }

    Ok(DeviceTopology {
        alignment_offset: alignment_offset.unwrap_or(0),
        minimum_io_size: minimum_io_size.unwrap_or(0),
        optimal_io_size: optimal_io_size.unwrap_or(0),
        logical_sector_size: logical_sector_size.unwrap_or(0),
        physical_sector_size: physical_sector_size.unwrap_or(0),
    })
}

fn query_int(device: &File, request: u32) -> Option<u64> {
    let mut value: libc::c_int = 0;
    let rv = unsafe { libc::ioctl(device.as_raw_fd(), request as _, &mut value) };
    if rv < 0 {
        return None;
    }
    // A negative alignment offset means the device is misaligned; nothing usable.
    Some(u64::try_from(value).unwrap_or(0))
}

fn query_uint(device: &File, request: u32) -> Option<u64> {
    let mut value: libc::c_uint = 0;
    let rv = unsafe { libc::ioctl(device.as_raw_fd(), request as _, &mut value) };
    if rv < 0 {
        return None;
    }
    Some(value as u64)
}
