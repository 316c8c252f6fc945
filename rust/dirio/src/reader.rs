//! Arbitrary-range reads over direct-I/O descriptors.

use std::io::SeekFrom;

use dirio_bytes::{
    AlignedBuffer,
    align::{round_up_to_multiple, split_at_block},
};
use dirio_common::{Error, Result};

use crate::{
    BlockFile,
    options::{DirectIoOptions, IoGeometry},
    topology::DeviceTopology,
};

/// A reader that serves reads of any offset and length from a file opened for
/// direct I/O.
///
/// Each request is widened to whole transfer blocks, read with a single physical
/// read into freshly allocated aligned scratch memory, and the requested bytes are
/// copied out. This favors simplicity over throughput: the scratch buffer is
/// allocated per call and data is always copied.
///
/// The reader holds no locks. The stream-style methods ([`read`](Self::read),
/// [`read_byte`](Self::read_byte)) move the file position, which is shared with
/// every other user of the descriptor.
pub struct AlignedReader<F> {
    file: F,
    topology: DeviceTopology,
    geometry: IoGeometry,
}

impl<F: BlockFile> AlignedReader<F> {
    /// Creates a reader over `file`, probing its topology.
    ///
    /// The file is expected to have been opened with the platform's direct-I/O flags.
    pub fn new(file: F) -> AlignedReader<F> {
        Self::with_options(file, &DirectIoOptions::default())
    }

    pub fn with_options(file: F, options: &DirectIoOptions) -> AlignedReader<F> {
        let topology = options.topology_for(&file);
        let geometry = options.resolve(&topology);
        log::debug!("aligned reader: {geometry:?}");
        AlignedReader {
            file,
            topology,
            geometry,
        }
    }

    /// Granularity of every physical read issued by this reader.
    pub fn transfer_size(&self) -> u64 {
        self.geometry.transfer_size
    }

    /// Address alignment of the scratch memory physical reads land in.
    pub fn alignment(&self) -> usize {
        self.geometry.alignment
    }

    /// The topology the geometry was resolved from.
    pub fn topology(&self) -> &DeviceTopology {
        &self.topology
    }

    pub fn get_ref(&self) -> &F {
        &self.file
    }

    pub fn into_inner(self) -> F {
        self.file
    }

    /// Reads `buf.len()` bytes starting at the absolute byte `offset`.
    ///
    /// Neither `offset` nor the length need to be block-aligned. Returns the number
    /// of bytes copied into `buf`, which is short only when end-of-file falls inside
    /// the requested range; it is never more than `buf.len()`.
    ///
    /// # Process
    ///
    /// 1. Split `offset` into the start of its containing block and the distance
    ///    into that block.
    /// 2. Round the distance plus the requested length up to whole blocks.
    /// 3. Read that span with one positioned read into aligned scratch memory.
    /// 4. Copy the requested sub-range, clipped to what the read returned.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let xfer = self.geometry.transfer_size;
        let (aligned_start, block_offset) = split_at_block(offset, xfer);
        let span = block_offset
            .checked_add(buf.len() as u64)
            .and_then(|n| round_up_to_multiple(n, xfer))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                Error::invalid_arg(
                    "buf",
                    format!("read of {} bytes at {offset} overflows", buf.len()),
                )
            })?;

        let mut scratch = AlignedBuffer::allocate(self.geometry.alignment, span)?;
        let bytes_read = self
            .file
            .read_at(scratch.as_bytes_mut(), aligned_start)
            .map_err(|e| Error::io(format!("read {span} bytes at {aligned_start}"), e))?;
        log::trace!("read {bytes_read}/{span} bytes at {aligned_start}");

        let block_offset = block_offset as usize;
        let n = bytes_read.saturating_sub(block_offset).min(buf.len());
        buf[..n].copy_from_slice(&scratch.as_bytes()[block_offset..block_offset + n]);
        Ok(n)
    }

    /// Reads from the current file position, then advances the position by
    /// `buf.len()`.
    ///
    /// **NOTE**: the position advances by the requested length even when the read
    /// comes up short at end-of-file, or fails. The position behaves as a
    /// forward-only cursor over requested ranges, not over delivered bytes.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pos = self.tell()?;
        let result = self.read_at(buf, pos);
        let advanced = self
            .file
            .seek(SeekFrom::Current(buf.len() as i64))
            .map_err(|e| Error::io("advance file position", e));
        let n = result?;
        advanced?;
        Ok(n)
    }

    /// Reads one byte at the current position, advancing it by one.
    ///
    /// Fails with `UnexpectedEof` if the position is at or past end-of-file.
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            1 => Ok(byte[0]),
            _ => Err(Error::io(
                "read byte",
                std::io::ErrorKind::UnexpectedEof.into(),
            )),
        }
    }

    fn tell(&self) -> Result<u64> {
        self.file
            .seek(SeekFrom::Current(0))
            .map_err(|e| Error::io("query file position", e))
    }
}

impl<F: BlockFile> std::io::Read for AlignedReader<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        AlignedReader::read(self, buf).map_err(Into::into)
    }
}
