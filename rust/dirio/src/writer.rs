//! Block-accumulating writes over direct-I/O descriptors.

use dirio_bytes::AlignedBuffer;
use dirio_common::{Error, Result};

use crate::{
    BlockFile,
    options::{DirectIoOptions, IoGeometry},
    topology::DeviceTopology,
};

/// A buffered writer whose physical writes are always whole, aligned blocks.
///
/// Bytes accumulate in an aligned scratch block of exactly one transfer size. The
/// block is written at the file's current position as soon as it fills up;
/// [`flush`](Self::flush) writes a partially filled block after padding it with
/// zeros. The file therefore always grows in whole blocks, and callers that need
/// the exact logical length must record it themselves (see
/// [`logical_len`](Self::logical_len)).
///
/// # Errors
///
/// A failed physical write poisons the writer: the error is kept, no further bytes
/// are accepted, and every subsequent [`write`](Self::write) or
/// [`flush`](Self::flush) returns that same error without touching the file.
pub struct BlockWriter<F> {
    file: F,
    topology: DeviceTopology,
    geometry: IoGeometry,
    /// Scratch block, exactly `geometry.transfer_size` bytes.
    buffer: AlignedBuffer,
    /// Write cursor into `buffer`, in `[0, buffer.len())`.
    pos: usize,
    /// Terminal error of the first failed physical write.
    error: Option<Error>,
    /// Caller bytes accepted so far, excluding flush padding.
    logical_len: u64,
}

/// A write that accepted only part of its input before the writer was poisoned.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{accepted} bytes accepted before failure: {error}")]
pub struct ShortWrite {
    /// Bytes of this call's input that reached the file.
    pub accepted: usize,
    /// The writer's sticky error.
    #[source]
    pub error: Error,
}

impl<F: BlockFile> BlockWriter<F> {
    /// Creates a writer appending at the current position of `file`, probing its
    /// topology.
    ///
    /// The file is expected to have been opened with the platform's direct-I/O flags.
    pub fn new(file: F) -> Result<BlockWriter<F>> {
        Self::with_options(file, &DirectIoOptions::default())
    }

    pub fn with_options(file: F, options: &DirectIoOptions) -> Result<BlockWriter<F>> {
        let topology = options.topology_for(&file);
        let geometry = options.resolve(&topology);
        let block_size = usize::try_from(geometry.transfer_size).map_err(|_| {
            Error::invalid_arg(
                "transfer_size",
                format!("{} does not fit in memory", geometry.transfer_size),
            )
        })?;
        let buffer = AlignedBuffer::allocate(geometry.alignment, block_size)?;
        log::debug!("block writer: {geometry:?}");
        Ok(BlockWriter {
            file,
            topology,
            geometry,
            buffer,
            pos: 0,
            error: None,
            logical_len: 0,
        })
    }

    /// Size of every physical write issued by this writer.
    pub fn transfer_size(&self) -> u64 {
        self.geometry.transfer_size
    }

    /// Address alignment of the scratch block.
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

    /// Free space in the current block.
    pub fn available(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Bytes accumulated in the current block but not yet written.
    pub fn buffered(&self) -> usize {
        self.pos
    }

    /// Total caller bytes accepted by [`write`](Self::write), not counting the zero
    /// padding added by [`flush`](Self::flush).
    pub fn logical_len(&self) -> u64 {
        self.logical_len
    }

    pub fn is_poisoned(&self) -> bool {
        self.error.is_some()
    }

    /// The sticky error, if a physical write has failed.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Appends `buf` to the stream.
    ///
    /// Returns `buf.len()` when the whole input was accepted. If a physical write
    /// fails, returns a [`ShortWrite`] carrying the number of bytes of `buf` that
    /// reached the file and the error; from then on every call returns
    /// `ShortWrite { accepted: 0, .. }` with that same error.
    pub fn write(&mut self, buf: &[u8]) -> std::result::Result<usize, ShortWrite> {
        let result = self.push(buf);
        self.logical_len += match &result {
            Ok(accepted) => *accepted as u64,
            Err(short) => short.accepted as u64,
        };
        result
    }

    /// Writes out a partially filled block, padding it with zeros.
    ///
    /// Does nothing when no bytes are buffered. A flushed block is always a full
    /// transfer-size block.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.buffered() == 0 {
            return Ok(());
        }
        let padding = vec![0u8; self.available()];
        self.push(&padding).map(|_| ()).map_err(|e| e.error)
    }

    /// Releases the scratch block and returns the file.
    ///
    /// Does not flush: buffered bytes are discarded. The file is left open.
    pub fn close(self) -> F {
        if self.pos != 0 {
            log::debug!("closing block writer with {} unflushed bytes", self.pos);
        }
        let BlockWriter { file, buffer, .. } = self;
        buffer.release();
        file
    }

    fn push(&mut self, buf: &[u8]) -> std::result::Result<usize, ShortWrite> {
        if let Some(error) = &self.error {
            return Err(ShortWrite {
                accepted: 0,
                error: error.clone(),
            });
        }

        let mut accepted = 0;
        let mut remaining = buf;
        while !remaining.is_empty() {
            let n = remaining.len().min(self.available());
            self.buffer.as_bytes_mut()[self.pos..self.pos + n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            remaining = &remaining[n..];

            if self.available() > 0 {
                accepted += n;
                break;
            }

            if let Err(error) = self.write_block() {
                // The bytes of this call in the failed block were not written.
                self.pos -= n;
                log::warn!("block writer poisoned: {error}");
                self.error = Some(error.clone());
                return Err(ShortWrite { accepted, error });
            }
            self.pos = 0;
            accepted += n;
        }
        Ok(accepted)
    }

    fn write_block(&self) -> Result<()> {
        crate::file::write_all(&self.file, self.buffer.as_bytes())
            .map_err(|e| Error::io(format!("write {}-byte block", self.buffer.len()), e))?;
        log::trace!("wrote {}-byte block", self.buffer.len());
        Ok(())
    }
}

impl<F> std::fmt::Debug for BlockWriter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockWriter")
            .field("geometry", &self.geometry)
            .field("pos", &self.pos)
            .field("logical_len", &self.logical_len)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<F: BlockFile> std::io::Write for BlockWriter<F> {
    /// Reports a partially accepted input as a short write; the error surfaces on
    /// the next call.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match BlockWriter::write(self, buf) {
            Ok(n) => Ok(n),
            Err(ShortWrite { accepted, .. }) if accepted > 0 => Ok(accepted),
            Err(ShortWrite { error, .. }) => Err(error.into()),
        }
    }

    /// Zero-pads and writes the current block, like [`BlockWriter::flush`].
    fn flush(&mut self) -> std::io::Result<()> {
        BlockWriter::flush(self).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use dirio_common::ErrorKind;

    use crate::{BlockWriter, DeviceTopology, DirectIoOptions, MemFile, memory::Transfer};

    fn device(block: u64) -> DeviceTopology {
        DeviceTopology {
            alignment_offset: block,
            minimum_io_size: block,
            optimal_io_size: block,
            logical_sector_size: block,
            physical_sector_size: block,
        }
    }

    #[test]
    fn test_full_blocks_written_without_flush() {
        let file = MemFile::new(device(512));
        let mut writer = BlockWriter::new(&file).unwrap();
        assert_eq!(writer.transfer_size(), 512);
        assert_eq!(writer.alignment(), 512);

        assert_eq!(writer.write(&[0xAB; 4096]).unwrap(), 4096);
        let expected: Vec<Transfer> = (0..8)
            .map(|i| Transfer {
                offset: i * 512,
                len: 512,
            })
            .collect();
        assert_eq!(file.writes(), expected);
        assert_eq!(writer.buffered(), 0);
        assert_eq!(file.contents(), vec![0xAB; 4096]);
    }

    #[test]
    fn test_blocks_hold_contiguous_slices() {
        let file = MemFile::new(device(512));
        let mut writer = BlockWriter::new(&file).unwrap();
        let data: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();

        for chunk in data.chunks(333) {
            assert_eq!(writer.write(chunk).unwrap(), chunk.len());
        }
        assert_eq!(file.writes().len(), 3);
        assert_eq!(writer.buffered(), 2000 - 3 * 512);
        assert_eq!(writer.available(), 512 - writer.buffered());
        assert_eq!(&file.contents()[..], &data[..1536]);

        writer.flush().unwrap();
        let contents = file.contents();
        assert_eq!(contents.len(), 2048);
        assert_eq!(&contents[..2000], &data[..]);
        assert!(contents[2000..].iter().all(|&b| b == 0));
        assert_eq!(writer.logical_len(), 2000);
        assert_eq!(writer.buffered(), 0);
    }

    #[test]
    fn test_flush_without_buffered_bytes_does_no_io() {
        let file = MemFile::new(device(512));
        let mut writer = BlockWriter::new(&file).unwrap();
        writer.flush().unwrap();
        assert!(file.writes().is_empty());

        writer.write(&[1; 512]).unwrap();
        writer.flush().unwrap();
        assert_eq!(file.writes().len(), 1);
    }

    #[test]
    fn test_write_error_is_sticky() {
        let file = MemFile::new(device(512));
        file.fail_writes_after(2);
        let mut writer = BlockWriter::new(&file).unwrap();

        assert_eq!(writer.write(&[1; 100]).unwrap(), 100);
        let short = writer.write(&[2; 2000]).unwrap_err();
        // 412 bytes completed the first block, 512 the second; the third failed.
        assert_eq!(short.accepted, 924);
        assert!(matches!(
            short.error.kind(),
            ErrorKind::Io { source, .. } if source.raw_os_error() == Some(libc::EIO)
        ));
        assert!(writer.is_poisoned());
        assert!(writer.error().unwrap().same_as(&short.error));
        assert_eq!(writer.logical_len(), 1024);

        let writes = file.writes().len();
        let again = writer.write(&[3; 10]).unwrap_err();
        assert_eq!(again.accepted, 0);
        assert!(again.error.same_as(&short.error));
        let empty = writer.write(&[]).unwrap_err();
        assert!(empty.error.same_as(&short.error));
        assert!(writer.flush().unwrap_err().same_as(&short.error));
        assert_eq!(file.writes().len(), writes);
    }

    #[test]
    fn test_failed_flush_poisons_writer() {
        let file = MemFile::new(device(512));
        file.fail_writes_after(0);
        let mut writer = BlockWriter::new(&file).unwrap();

        assert_eq!(writer.write(&[4; 100]).unwrap(), 100);
        let err = writer.flush().unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Io { source, .. } if source.raw_os_error() == Some(libc::EIO)
        ));
        // The padding was rolled back; the caller's bytes stay buffered.
        assert_eq!(writer.buffered(), 100);
        assert_eq!(writer.logical_len(), 100);
        assert!(writer.is_poisoned());
        assert!(writer.error().unwrap().same_as(&err));

        assert!(writer.flush().unwrap_err().same_as(&err));
        let again = writer.write(&[5; 10]).unwrap_err();
        assert_eq!(again.accepted, 0);
        assert!(again.error.same_as(&err));
        assert!(file.writes().is_empty());
    }

    #[test]
    fn test_write_past_addressable_end_poisons_writer() {
        let file = MemFile::new(device(512));
        crate::BlockFile::seek(&file, std::io::SeekFrom::Start(u64::MAX - 511)).unwrap();
        let mut writer = BlockWriter::new(&file).unwrap();

        let short = writer.write(&[7; 512]).unwrap_err();
        assert_eq!(short.accepted, 0);
        assert!(matches!(
            short.error.kind(),
            ErrorKind::Io { source, .. } if source.raw_os_error() == Some(libc::EFBIG)
        ));
        assert!(writer.is_poisoned());
        assert!(file.is_empty());
    }

    #[test]
    fn test_debug_omits_block_contents() {
        let file = MemFile::new(device(512));
        let mut writer = BlockWriter::new(&file).unwrap();
        writer.write(&[1; 10]).unwrap();
        let text = format!("{writer:?}");
        assert!(text.starts_with("BlockWriter"));
        assert!(text.contains("pos: 10"));
    }

    #[test]
    fn test_std_write_reports_short_write_then_error() {
        use std::io::Write;

        let file = MemFile::new(device(512));
        file.fail_writes_after(1);
        let mut writer = BlockWriter::new(&file).unwrap();

        assert_eq!(Write::write(&mut writer, &[1; 1500]).unwrap(), 512);
        let err = Write::write(&mut writer, &[1; 10]).unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<crate::Error>());
        assert!(inner.is_some_and(|e| e.same_as(writer.error().unwrap())));
        assert!(writer.write_all(&[0; 10]).is_err());
    }

    #[test]
    fn test_close_does_not_flush() {
        let file = MemFile::new(device(512));
        let mut writer = BlockWriter::new(&file).unwrap();
        writer.write(&[9; 700]).unwrap();
        let returned = writer.close();
        assert_eq!(returned.writes().len(), 1);
        assert_eq!(file.len(), 512);
    }

    #[test]
    fn test_appends_at_current_position() {
        let file = MemFile::with_contents(device(512), vec![5; 1024]);
        crate::BlockFile::seek(&file, std::io::SeekFrom::End(0)).unwrap();
        let mut writer = BlockWriter::new(&file).unwrap();
        writer.write(&[6; 10]).unwrap();
        writer.flush().unwrap();
        assert_eq!(
            file.writes(),
            vec![Transfer {
                offset: 1024,
                len: 512
            }]
        );
        assert_eq!(&file.contents()[1024..1034], &[6; 10]);
    }

    #[test]
    fn test_unknown_topology_uses_defaults() {
        let file = MemFile::new(DeviceTopology::default());
        let writer = BlockWriter::new(&file).unwrap();
        assert_eq!(writer.transfer_size(), 4096);
        assert_eq!(writer.alignment(), 4096);
        assert_eq!(writer.available(), 4096);

        let options = DirectIoOptions::default().with_topology(device(1024));
        let writer = BlockWriter::with_options(&file, &options).unwrap();
        assert_eq!(writer.transfer_size(), 1024);
    }

    #[test]
    fn test_invalid_default_alignment_fails_loudly() {
        let file = MemFile::new(DeviceTopology::default());
        let options = DirectIoOptions::default().with_default_alignment(3000);
        let err = BlockWriter::with_options(&file, &options).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }
}
