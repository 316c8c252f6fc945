//! An in-memory [`BlockFile`] that behaves like a direct-I/O device.
//!
//! `MemFile` reports a fixed topology and enforces the constraints a descriptor
//! opened for direct I/O imposes: buffer addresses must be aligned to the reported
//! alignment, and transfer offsets and lengths must be multiples of the logical
//! sector size. Violations fail with `EINVAL`, as the kernel would. Every physical
//! transfer is recorded, and writes can be made to fail on demand.

use std::{io::SeekFrom, sync::Mutex};

use dirio_bytes::align::{is_aligned_u64, is_valid_memory_alignment};

use crate::{BlockFile, topology::DeviceTopology};

/// A single physical transfer observed by a [`MemFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub offset: u64,
    pub len: usize,
}

pub struct MemFile {
    topology: DeviceTopology,
    state: Mutex<MemFileState>,
}

#[derive(Default)]
struct MemFileState {
    data: Vec<u8>,
    pos: u64,
    reads: Vec<Transfer>,
    writes: Vec<Transfer>,
    /// Number of writes that succeed before every further write fails.
    writes_before_failure: Option<usize>,
}

impl MemFile {
    /// Creates an empty file reporting `topology`.
    pub fn new(topology: DeviceTopology) -> MemFile {
        Self::with_contents(topology, Vec::new())
    }

    /// Creates a file holding `data`, positioned at its start.
    pub fn with_contents(topology: DeviceTopology, data: Vec<u8>) -> MemFile {
        MemFile {
            topology,
            state: Mutex::new(MemFileState {
                data,
                ..Default::default()
            }),
        }
    }

    /// A device with 512-byte sectors, alignment and transfer size.
    pub fn sector_512() -> MemFile {
        Self::new(DeviceTopology {
            alignment_offset: 512,
            minimum_io_size: 512,
            optimal_io_size: 0,
            logical_sector_size: 512,
            physical_sector_size: 512,
        })
    }

    /// Makes every write after the first `n` successful ones fail with `EIO`.
    pub fn fail_writes_after(&self, n: usize) {
        self.lock().writes_before_failure = Some(n);
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    pub fn len(&self) -> u64 {
        self.lock().data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.lock().pos
    }

    /// Physical reads performed so far, in order.
    pub fn reads(&self) -> Vec<Transfer> {
        self.lock().reads.clone()
    }

    /// Physical writes performed so far, in order.
    pub fn writes(&self) -> Vec<Transfer> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemFileState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_transfer(&self, ptr: *const u8, offset: u64, len: usize) -> std::io::Result<()> {
        let alignment = self.topology.alignment_offset;
        if is_valid_memory_alignment(alignment as usize) && !is_aligned_u64(ptr as u64, alignment)
        {
            return Err(einval());
        }
        let sector = self.topology.logical_sector_size;
        if sector != 0 && (offset % sector != 0 || len as u64 % sector != 0) {
            return Err(einval());
        }
        Ok(())
    }
}

impl BlockFile for MemFile {
    fn read_at(&self, buf: &mut [u8], pos: u64) -> std::io::Result<usize> {
        self.check_transfer(buf.as_ptr(), pos, buf.len())?;
        let mut state = self.lock();
        state.reads.push(Transfer {
            offset: pos,
            len: buf.len(),
        });
        let Ok(start) = usize::try_from(pos) else {
            return Ok(0);
        };
        if start >= state.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(state.data.len() - start);
        buf[..n].copy_from_slice(&state.data[start..start + n]);
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.lock();
        self.check_transfer(buf.as_ptr(), state.pos, buf.len())?;
        if let Some(remaining) = state.writes_before_failure {
            if remaining == 0 {
                return Err(std::io::Error::from_raw_os_error(libc::EIO));
            }
            state.writes_before_failure = Some(remaining - 1);
        }

        let offset = state.pos;
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(buf.len())?))
            .ok_or_else(|| std::io::Error::from_raw_os_error(libc::EFBIG))?;
        if state.data.len() < range.end {
            state.data.resize(range.end, 0);
        }
        state.data[range.clone()].copy_from_slice(buf);
        state.writes.push(Transfer {
            offset,
            len: buf.len(),
        });
        state.pos = range.end as u64;
        Ok(buf.len())
    }

    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64> {
        let mut state = self.lock();
        let new_pos = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => state.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => (state.data.len() as u64).checked_add_signed(delta),
        };
        let new_pos = new_pos.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )
        })?;
        state.pos = new_pos;
        Ok(new_pos)
    }

    fn topology(&self) -> DeviceTopology {
        self.topology
    }
}

fn einval() -> std::io::Error {
    std::io::Error::from_raw_os_error(libc::EINVAL)
}
