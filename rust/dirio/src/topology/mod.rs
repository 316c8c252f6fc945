//! Discovery of the alignment and transfer granularity behind a descriptor.
//!
//! Probing is a two-phase ordered fallback:
//!
//! 1. **Block device**: a duplicate of the descriptor is queried for the topology of
//!    the block device it refers to. This is the most accurate source, but only
//!    applies to descriptors of block devices.
//! 2. **Filesystem**: the path-configuration limits of the open file
//!    (`_PC_REC_XFER_ALIGN`, `_PC_REC_MIN_XFER_SIZE`) provide a conservative
//!    uniform estimate.
//!
//! The probe never fails: fields that cannot be determined are reported as 0, and
//! consumers apply their own defaults (see [`DirectIoOptions`](crate::DirectIoOptions)).

use std::os::fd::{AsRawFd, BorrowedFd};

#[cfg_attr(target_os = "linux", path = "linux.rs")]
#[cfg_attr(not(target_os = "linux"), path = "fallback.rs")]
mod platform;

/// Storage topology hints, in bytes. A value of 0 means "undetermined".
///
/// The fields are independent hints; no relationship between them is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DeviceTopology {
    /// Alignment hint used as the memory alignment for direct I/O buffers.
    pub alignment_offset: u64,
    /// Smallest transfer the device accepts without a read-modify-write cycle.
    pub minimum_io_size: u64,
    /// Preferred transfer size of the device.
    pub optimal_io_size: u64,
    /// Smallest addressable unit of the device.
    pub logical_sector_size: u64,
    /// Unit the device writes atomically.
    pub physical_sector_size: u64,
}

impl DeviceTopology {
    /// Returns `true` if no field could be determined.
    pub fn is_unknown(&self) -> bool {
        *self == DeviceTopology::default()
    }
}

/// The probe phase a [`DeviceTopology`] was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologySource {
    BlockDevice,
    Filesystem,
}

/// Determines the topology of the storage behind `fd`.
///
/// See the [module documentation](self) for the probing strategy.
pub fn probe(fd: BorrowedFd<'_>) -> DeviceTopology {
    probe_with_source(fd).1
}

/// Like [`probe`], additionally reporting which phase produced the result.
pub fn probe_with_source(fd: BorrowedFd<'_>) -> (TopologySource, DeviceTopology) {
    match platform::probe_block_device(fd) {
        Ok(topology) => {
            log::debug!("fd {}: block device topology {topology:?}", fd.as_raw_fd());
            (TopologySource::BlockDevice, topology)
        }
        Err(e) => {
            log::debug!("fd {}: {e}; falling back to filesystem limits", fd.as_raw_fd());
            let topology = probe_filesystem(fd);
            log::debug!("fd {}: filesystem topology {topology:?}", fd.as_raw_fd());
            (TopologySource::Filesystem, topology)
        }
    }
}

/// Queries the path-configuration transfer limits of the open file.
///
/// The minimum transfer size stands in for the logical, physical, minimum and
/// optimal sizes alike; unavailable (negative) limits become 0.
pub fn probe_filesystem(fd: BorrowedFd<'_>) -> DeviceTopology {
    let xfer = fpathconf(fd, libc::_PC_REC_MIN_XFER_SIZE);
    let align = fpathconf(fd, libc::_PC_REC_XFER_ALIGN);
    DeviceTopology {
        alignment_offset: align,
        minimum_io_size: xfer,
        optimal_io_size: xfer,
        logical_sector_size: xfer,
        physical_sector_size: xfer,
    }
}

fn fpathconf(fd: BorrowedFd<'_>, name: libc::c_int) -> u64 {
    let rv = unsafe { libc::fpathconf(fd.as_raw_fd(), name) };
    u64::try_from(rv).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsFd;

    use super::{DeviceTopology, TopologySource, probe, probe_filesystem, probe_with_source};

    #[test]
    fn test_regular_file_uses_filesystem_limits() {
        let file = tempfile::tempfile().unwrap();
        let (source, topo) = probe_with_source(file.as_fd());
        assert_eq!(source, TopologySource::Filesystem);
        assert_eq!(topo, probe_filesystem(file.as_fd()));
        assert_eq!(probe(file.as_fd()), topo);
    }

    #[test]
    fn test_filesystem_estimate_is_uniform() {
        let file = tempfile::tempfile().unwrap();
        let topo = probe_filesystem(file.as_fd());
        assert_eq!(topo.logical_sector_size, topo.minimum_io_size);
        assert_eq!(topo.physical_sector_size, topo.minimum_io_size);
        assert_eq!(topo.optimal_io_size, topo.minimum_io_size);
    }

    #[test]
    fn test_probe_leaves_descriptor_open() {
        let file = tempfile::tempfile().unwrap();
        let _ = probe(file.as_fd());
        // The caller's descriptor is still usable after probing.
        assert!(file.metadata().is_ok());
        crate::file::write_all(&file, b"still open").unwrap();
    }

    #[test]
    fn test_unknown() {
        assert!(DeviceTopology::default().is_unknown());
        let topo = DeviceTopology {
            logical_sector_size: 512,
            ..Default::default()
        };
        assert!(!topo.is_unknown());
    }
}
