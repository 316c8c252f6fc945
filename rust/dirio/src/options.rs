//! Configuration of readers and writers.

use dirio_bytes::align::is_valid_memory_alignment;

use crate::{BlockFile, topology::DeviceTopology};

/// Alignment and transfer size used when the topology leaves them undetermined.
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// Settings shared by [`AlignedReader`](crate::AlignedReader) and
/// [`BlockWriter`](crate::BlockWriter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectIoOptions {
    /// Memory alignment used when the topology reports none, or reports one that
    /// cannot be used as a buffer alignment.
    pub default_alignment: usize,
    /// Transfer size used when neither the optimal nor the minimum I/O size is known.
    pub default_transfer_size: u64,
    /// Topology to use instead of probing the file.
    pub topology: Option<DeviceTopology>,
}

impl Default for DirectIoOptions {
    fn default() -> DirectIoOptions {
        DirectIoOptions {
            default_alignment: DEFAULT_BLOCK_SIZE as usize,
            default_transfer_size: DEFAULT_BLOCK_SIZE,
            topology: None,
        }
    }
}

impl DirectIoOptions {
    pub fn with_default_alignment(mut self, alignment: usize) -> Self {
        self.default_alignment = alignment;
        self
    }

    pub fn with_default_transfer_size(mut self, transfer_size: u64) -> Self {
        self.default_transfer_size = transfer_size;
        self
    }

    pub fn with_topology(mut self, topology: DeviceTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Returns the configured topology, probing `file` if none was given.
    pub fn topology_for<F: BlockFile + ?Sized>(&self, file: &F) -> DeviceTopology {
        self.topology.unwrap_or_else(|| file.topology())
    }

    /// Resolves the geometry a reader or writer uses for its lifetime.
    ///
    /// * alignment: `alignment_offset` if non-zero (and usable), else the default.
    /// * transfer size: `optimal_io_size` if non-zero, else `minimum_io_size` if
    ///   non-zero, else the default.
    pub fn resolve(&self, topology: &DeviceTopology) -> IoGeometry {
        let alignment = match usize::try_from(topology.alignment_offset) {
            Ok(0) | Err(_) => self.default_alignment,
            Ok(align) if is_valid_memory_alignment(align) => align,
            Ok(align) => {
                log::warn!(
                    "reported alignment {align} is not a usable buffer alignment, using {}",
                    self.default_alignment
                );
                self.default_alignment
            }
        };

        let transfer_size = if topology.optimal_io_size > 0 {
            topology.optimal_io_size
        } else if topology.minimum_io_size > 0 {
            topology.minimum_io_size
        } else {
            self.default_transfer_size.max(1)
        };

        if alignment != 0 && transfer_size % alignment as u64 != 0 {
            log::debug!("transfer size {transfer_size} is not a multiple of alignment {alignment}");
        }
        IoGeometry {
            alignment,
            transfer_size,
        }
    }
}

/// The memory alignment and transfer granularity fixed for one reader or writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoGeometry {
    /// Address alignment of scratch buffers.
    pub alignment: usize,
    /// Granularity of physical transfers; every physical read or write is a
    /// multiple of it.
    pub transfer_size: u64,
}
