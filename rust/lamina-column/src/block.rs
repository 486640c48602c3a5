//! Fixed-capacity storage blocks holding one column's values.

use lamina_bytes::AlignedByteVec;
use lamina_common::{Result, error::Error, verify_arg};

use crate::rowid::BLOCK_CAPACITY;

/// One block of rows for a single column: a value buffer and an optional
/// null-flag buffer (one byte per row, nonzero marks null).
///
/// The null buffer is lazy. When it is absent every row reads as non-null;
/// it comes into existence the first time a row is marked null. Memory
/// accounting and the merge path both rely on absence being a real state
/// rather than an empty allocation.
///
/// A block is filled once and then shared read-only through
/// `Arc<ColumnBlock>`; the type is deliberately not `Clone`. Mutation
/// requires `&mut ColumnBlock`, so a shared block cannot change under its
/// readers.
#[derive(Debug, Default)]
pub struct ColumnBlock {
    size: usize,
    data: AlignedByteVec,
    nulls: Option<AlignedByteVec>,
}

impl ColumnBlock {
    pub fn new() -> ColumnBlock {
        ColumnBlock::default()
    }

    /// Allocates or grows the value buffer to hold `size` values of `esize`
    /// bytes each. Grow-only: a smaller request never shrinks the buffers.
    pub fn alloc(&mut self, size: usize, esize: usize) -> Result<()> {
        verify_arg!(size, size <= BLOCK_CAPACITY);
        verify_arg!(esize, esize > 0);
        let bytes = size * esize;
        if bytes > self.data.len() {
            self.data
                .try_resize_zeroed(bytes)
                .map_err(|e| Error::alloc(bytes, e))?;
        }
        if size > self.size {
            if let Some(nulls) = self.nulls.as_mut() {
                nulls
                    .try_resize_zeroed(size)
                    .map_err(|e| Error::alloc(size, e))?;
            }
            self.size = size;
        }
        Ok(())
    }

    /// Number of rows the block holds.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn data(&self) -> &AlignedByteVec {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut AlignedByteVec {
        &mut self.data
    }

    #[inline]
    pub fn nulls(&self) -> Option<&AlignedByteVec> {
        self.nulls.as_ref()
    }

    /// Splits the block into its value buffer and null buffer for
    /// simultaneous mutation during a merge.
    #[inline]
    pub fn data_and_nulls_mut(&mut self) -> (&mut AlignedByteVec, Option<&mut AlignedByteVec>) {
        (&mut self.data, self.nulls.as_mut())
    }

    /// Returns whether the row at `idx` is null. Always `false` while no
    /// null buffer exists.
    #[inline]
    pub fn is_null(&self, idx: usize) -> bool {
        debug_assert!(idx < self.size);
        self.nulls
            .as_ref()
            .is_some_and(|nulls| nulls.as_slice()[idx] != 0)
    }

    /// Marks the row at `idx` null, materializing the null buffer on first
    /// use.
    pub fn set_null(&mut self, idx: usize) -> Result<()> {
        debug_assert!(idx < self.size);
        self.ensure_nulls()?.as_mut_slice()[idx] = 1;
        Ok(())
    }

    /// Marks the row at `idx` non-null. A no-op when no null buffer exists,
    /// since every row already reads as non-null.
    pub fn set_not_null(&mut self, idx: usize) -> Result<()> {
        debug_assert!(idx < self.size);
        if let Some(nulls) = self.nulls.as_mut() {
            nulls.as_mut_slice()[idx] = 0;
        }
        Ok(())
    }

    /// Materializes the null buffer if absent and returns it.
    pub fn ensure_nulls(&mut self) -> Result<&mut AlignedByteVec> {
        let nulls = match self.nulls.take() {
            Some(nulls) => nulls,
            None => AlignedByteVec::try_zeroed(self.size)
                .map_err(|e| Error::alloc(self.size, e))?,
        };
        Ok(self.nulls.insert(nulls))
    }

    /// Resident heap bytes of the value and null buffers.
    pub fn memory(&self) -> usize {
        self.data.heap_size() + self.nulls.as_ref().map_or(0, |nulls| nulls.heap_size())
    }

    /// Copies the first `nrows` values and their null flags into `dest`,
    /// establishing the pre-overlay state for a block merge.
    ///
    /// When this block has no null buffer, any flags `dest` carries from a
    /// previous use are cleared over the copied prefix.
    pub fn copy_to(&self, dest: &mut ColumnBlock, nrows: usize, esize: usize) -> Result<()> {
        debug_assert!(nrows <= self.size);
        debug_assert!(nrows <= dest.size);
        let bytes = nrows * esize;
        dest.data.as_mut_slice()[..bytes].copy_from_slice(&self.data.as_slice()[..bytes]);
        match self.nulls.as_ref() {
            Some(src) => {
                let flags = dest.ensure_nulls()?;
                flags.as_mut_slice()[..nrows].copy_from_slice(&src.as_slice()[..nrows]);
            }
            None => {
                if let Some(flags) = dest.nulls.as_mut() {
                    flags.as_mut_slice()[..nrows].fill(0);
                }
            }
        }
        Ok(())
    }
}
