//! Fixed-size, address-aligned native memory for direct I/O.
//!
//! `AlignedBuffer` wraps `posix_memalign`/`free` and owns the allocation
//! exclusively. The memory is released exactly once, when the buffer is dropped
//! (or consumed by [`AlignedBuffer::release`]); the type is move-only, so a double
//! free cannot be expressed. Byte views borrow the buffer and therefore cannot
//! outlive it.

use std::ptr::NonNull;

use dirio_common::{Error, Result, verify_arg};

use crate::align::is_valid_memory_alignment;

/// A block of memory whose start address is a multiple of a power-of-two alignment.
///
/// The size is fixed at creation and the contents are zero-initialized.
pub struct AlignedBuffer {
    /// Start of the allocation, a multiple of `alignment`.
    ptr: NonNull<u8>,
    /// Size of the allocation in bytes, never zero.
    len: usize,
    /// Address alignment requested at creation.
    alignment: usize,
}

impl AlignedBuffer {
    /// Allocates `size` zeroed bytes at an address divisible by `alignment`.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if `alignment` is not a non-zero power of two that is a
    ///   multiple of the pointer width, or if `size` is zero.
    /// * `ResourceExhausted` carrying the platform error code if the allocation fails.
    pub fn allocate(alignment: usize, size: usize) -> Result<AlignedBuffer> {
        verify_arg!(alignment, is_valid_memory_alignment(alignment));
        verify_arg!(size, size != 0);

        let mut raw: *mut libc::c_void = std::ptr::null_mut();
        let rv = unsafe { libc::posix_memalign(&mut raw, alignment, size) };
        if rv != 0 {
            return Err(Error::resource_exhausted(
                format!("aligned allocation of {size} bytes at {alignment}"),
                rv,
            ));
        }
        let ptr = NonNull::new(raw as *mut u8).ok_or_else(|| {
            Error::resource_exhausted(
                format!("aligned allocation of {size} bytes at {alignment}"),
                libc::ENOMEM,
            )
        })?;
        debug_assert!((ptr.as_ptr() as usize).is_multiple_of(alignment));

        // posix_memalign hands out uninitialized memory; byte views require it
        // to be initialized.
        unsafe { ptr.as_ptr().write_bytes(0, size) };

        log::trace!("allocated aligned buffer: {size} bytes at {alignment}");
        Ok(AlignedBuffer {
            ptr,
            len: size,
            alignment,
        })
    }

    /// Returns the size of the buffer in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: zero-sized buffers cannot be allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the address alignment the buffer was allocated with.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Returns a view over the entire allocation, exactly `len()` bytes long.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns a mutable view over the entire allocation, exactly `len()` bytes long.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Frees the underlying memory.
    ///
    /// Equivalent to dropping the buffer; provided for call sites that want the
    /// release to be explicit.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe { libc::free(self.ptr.as_ptr() as *mut libc::c_void) };
    }
}

impl std::ops::Deref for AlignedBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::ops::DerefMut for AlignedBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_bytes_mut()
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}

// The allocation is exclusively owned and has no interior mutability.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}
