//! Memory for direct I/O: block arithmetic and buffers whose address satisfies
//! a device-imposed alignment.

pub mod align;
pub mod aligned_buffer;

pub use aligned_buffer::AlignedBuffer;
