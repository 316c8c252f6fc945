//! Platforms without a block-device topology source.

use std::os::fd::BorrowedFd;

use dirio_common::{Error, Result};

use super::DeviceTopology;

pub(super) fn probe_block_device(_fd: BorrowedFd<'_>) -> Result<DeviceTopology> {
    Err(Error::topology_unavailable(
        "block device",
        "device probing is not supported on this platform",
    ))
}
