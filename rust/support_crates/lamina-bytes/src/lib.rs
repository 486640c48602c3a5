//! Byte buffers for the Lamina in-memory column store: growable, aligned,
//! type-erased memory regions with reinterpreting typed views.

pub mod align;
pub mod buffer;

pub use buffer::AlignedByteVec;
