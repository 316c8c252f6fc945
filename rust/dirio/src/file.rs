//! The file collaborator consumed by readers and writers.

use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
    os::fd::AsFd,
    sync::Arc,
};

use crate::topology::{self, DeviceTopology};

/// A handle supporting the primitives direct-I/O adaptation is built on.
///
/// The handle is opened (and eventually closed) by the caller, with whatever
/// direct-I/O flags the platform requires. Readers and writers never open or close it.
///
/// All methods take `&self`: like `&File`, the position is shared mutable state of
/// the underlying descriptor, and callers must serialize access to it.
pub trait BlockFile {
    /// Performs a single positioned read of up to `buf.len()` bytes at `pos`.
    ///
    /// Returns the number of bytes read, which is short only at end-of-file
    /// (or when the platform chooses to return early).
    fn read_at(&self, buf: &mut [u8], pos: u64) -> std::io::Result<usize>;

    /// Performs a single write at the current position, advancing it by the
    /// number of bytes written.
    fn write(&self, buf: &[u8]) -> std::io::Result<usize>;

    /// Moves the position; `SeekFrom::Current(0)` reports it.
    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64>;

    /// Reports the storage topology behind this handle.
    fn topology(&self) -> DeviceTopology;
}

impl BlockFile for File {
    fn read_at(&self, buf: &mut [u8], pos: u64) -> std::io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, pos)
    }

    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        <&File as Write>::write(&mut &*self, buf)
    }

    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64> {
        <&File as Seek>::seek(&mut &*self, pos)
    }

    fn topology(&self) -> DeviceTopology {
        topology::probe(self.as_fd())
    }
}

impl<T> BlockFile for &T
where
    T: BlockFile + ?Sized,
{
    fn read_at(&self, buf: &mut [u8], pos: u64) -> std::io::Result<usize> {
        (**self).read_at(buf, pos)
    }

    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).write(buf)
    }

    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64> {
        (**self).seek(pos)
    }

    fn topology(&self) -> DeviceTopology {
        (**self).topology()
    }
}

impl<T> BlockFile for Arc<T>
where
    T: BlockFile + ?Sized,
{
    fn read_at(&self, buf: &mut [u8], pos: u64) -> std::io::Result<usize> {
        self.as_ref().read_at(buf, pos)
    }

    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.as_ref().write(buf)
    }

    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64> {
        self.as_ref().seek(pos)
    }

    fn topology(&self) -> DeviceTopology {
        self.as_ref().topology()
    }
}

/// Writes all of `buf` at the current position of `file`, retrying on interrupts
/// and short writes.
pub(crate) fn write_all<F: BlockFile + ?Sized>(file: &F, mut buf: &[u8]) -> std::io::Result<()> {
    while !buf.is_empty() {
        match file.write(buf) {
            Ok(0) => return Err(std::io::ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{io::SeekFrom, sync::Arc};

    use crate::{BlockFile, topology::TopologySource};

    #[test]
    fn test_std_file_primitives() {
        let file = tempfile::tempfile().unwrap();
        crate::file::write_all(&file, b"abcdefgh").unwrap();
        assert_eq!(file.seek(SeekFrom::Current(0)).unwrap(), 8);

        let mut buf = [0u8; 4];
        assert_eq!(BlockFile::read_at(&file, &mut buf, 2).unwrap(), 4);
        assert_eq!(&buf, b"cdef");
        assert_eq!(BlockFile::read_at(&file, &mut buf, 6).unwrap(), 2);
    }

    #[test]
    fn test_arc_delegates_topology() {
        let file = Arc::new(tempfile::tempfile().unwrap());
        let (source, topo) = crate::topology::probe_with_source(std::os::fd::AsFd::as_fd(&*file));
        assert_eq!(source, TopologySource::Filesystem);
        assert_eq!(file.topology(), topo);
    }
}
