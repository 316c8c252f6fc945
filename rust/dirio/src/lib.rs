//! Byte-addressable reads and writes over descriptors opened for direct I/O.
//!
//! Direct I/O requires memory buffers aligned to a device-specific boundary and
//! transfers quantized to a device-specific block size. This crate translates
//! arbitrary caller ranges into such transfers:
//!
//! - [`AlignedReader`]: serves any `(offset, len)` read with a single block-aligned
//!   physical read into aligned scratch memory, copying out the requested bytes.
//! - [`BlockWriter`]: accumulates caller bytes into an aligned block and writes
//!   whole blocks; [`BlockWriter::flush`] zero-pads a partial block.
//! - [`topology`]: discovers the alignment and transfer granularity of the storage
//!   behind a descriptor.
//! - [`fs`]: opens files with or without the platform's direct-I/O flags.

#[cfg(not(unix))]
compile_error!("dirio requires a Unix-like platform");

pub mod file;
pub mod fs;
pub mod memory;
pub mod options;
pub mod reader;
pub mod topology;
pub mod writer;

pub use dirio_bytes::AlignedBuffer;
pub use dirio_common::{Error, ErrorKind, Result};
pub use file::BlockFile;
pub use memory::MemFile;
pub use options::{DirectIoOptions, IoGeometry};
pub use reader::AlignedReader;
pub use topology::{DeviceTopology, TopologySource};
pub use writer::{BlockWriter, ShortWrite};
