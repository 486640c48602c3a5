//! Sparse row overrides: the shared per-commit index and per-column deltas.

use std::ops::Range;
use std::sync::Arc;

use lamina_bytes::AlignedByteVec;
use lamina_common::{Result, error::Error, verify_arg};

use crate::rowid::{RowId, block_index, block_offset};

/// Row-id index of one commit's writes, shared by every column delta created
/// at that commit.
///
/// Positions are 16-bit in-block row offsets, grouped by block index and
/// ascending within each group; `block_ends[b]` is the cumulative position
/// count through block `b`. A row's position here is also its position in
/// each sharing delta's data buffer.
#[derive(Debug, Default)]
pub struct DeltaIndex {
    block_ends: Vec<u32>,
    positions: AlignedByteVec,
}

impl DeltaIndex {
    /// Builds the index from strictly ascending row ids.
    pub fn from_rows(rows: &[RowId]) -> Result<DeltaIndex> {
        verify_arg!(rows, rows.windows(2).all(|w| w[0] < w[1]));
        let nblocks = rows.last().map_or(0, |&rid| block_index(rid) as usize + 1);
        let mut block_ends = vec![0u32; nblocks];
        let mut positions = AlignedByteVec::with_capacity(rows.len() * 2);
        for &rid in rows {
            block_ends[block_index(rid) as usize] += 1;
            positions.push_typed(block_offset(rid) as u16);
        }
        let mut end = 0u32;
        for e in block_ends.iter_mut() {
            end += *e;
            *e = end;
        }
        Ok(DeltaIndex {
            block_ends,
            positions,
        })
    }

    /// Number of indexed rows.
    pub fn len(&self) -> usize {
        self.positions.len() / size_of::<u16>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the position of `rid`, or `None` when the index does not
    /// cover that row.
    pub fn find_idx(&self, rid: RowId) -> Option<u32> {
        let range = self.block_range(block_index(rid) as usize);
        if range.is_empty() {
            return None;
        }
        let start = range.start;
        let offset = block_offset(rid) as u16;
        match self.positions()[range].binary_search(&offset) {
            Ok(i) => Some((start + i) as u32),
            Err(_) => None,
        }
    }

    /// Whether any indexed row falls into block `bid`.
    pub fn contains_block(&self, bid: usize) -> bool {
        !self.block_range(bid).is_empty()
    }

    /// One past the highest block index any indexed row falls into.
    pub fn num_blocks(&self) -> usize {
        self.block_ends.len()
    }

    /// The `[start, end)` position range covering block `bid`; empty when
    /// the block is untouched.
    pub fn block_range(&self, bid: usize) -> Range<usize> {
        if bid >= self.block_ends.len() {
            return 0..0;
        }
        let start = if bid == 0 {
            0
        } else {
            self.block_ends[bid - 1]
        } as usize;
        let end = self.block_ends[bid] as usize;
        start..end
    }

    /// In-block row offsets, parallel to the sharing deltas' data buffers.
    pub fn positions(&self) -> &[u16] {
        self.positions.typed_data()
    }

    pub fn memory(&self) -> usize {
        self.block_ends.capacity() * size_of::<u32>() + self.positions.heap_size()
    }
}

/// One column's sparse overrides written at a single version.
///
/// Holds one value per indexed position plus an optional byte-per-position
/// null buffer with the same lazy semantics as a block's. Once attached to a
/// column the delta is shared through `Arc` and no longer mutable.
#[derive(Debug)]
pub struct ColumnDelta {
    version: u64,
    index: Arc<DeltaIndex>,
    data: AlignedByteVec,
    nulls: Option<AlignedByteVec>,
}

impl ColumnDelta {
    /// Allocates a delta sized by `index` for values of `esize` bytes each,
    /// with a null buffer when `with_nulls`.
    pub fn alloc(
        version: u64,
        index: Arc<DeltaIndex>,
        esize: usize,
        with_nulls: bool,
    ) -> Result<ColumnDelta> {
        verify_arg!(esize, esize > 0);
        let bytes = index.len() * esize;
        let data = AlignedByteVec::try_zeroed(bytes).map_err(|e| Error::alloc(bytes, e))?;
        let nulls = if with_nulls {
            let n = index.len();
            Some(AlignedByteVec::try_zeroed(n).map_err(|e| Error::alloc(n, e))?)
        } else {
            None
        };
        Ok(ColumnDelta {
            version,
            index,
            data,
            nulls,
        })
    }

    /// The write version this delta was created at.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn index(&self) -> &Arc<DeltaIndex> {
        &self.index
    }

    #[inline]
    pub fn find_idx(&self, rid: RowId) -> Option<u32> {
        self.index.find_idx(rid)
    }

    #[inline]
    pub fn contains_block(&self, bid: usize) -> bool {
        self.index.contains_block(bid)
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

    /// Returns whether the value at `pos` is null. Always `false` while no
    /// null buffer exists.
    #[inline]
    pub fn is_null(&self, pos: u32) -> bool {
        self.nulls
            .as_ref()
            .is_some_and(|nulls| nulls.as_slice()[pos as usize] != 0)
    }

    /// Marks the value at `pos` null, materializing the null buffer on
    /// first use.
    pub fn set_null(&mut self, pos: u32) -> Result<()> {
        debug_assert!((pos as usize) < self.index.len());
        let len = self.index.len();
        let nulls = match self.nulls.take() {
            Some(nulls) => nulls,
            None => AlignedByteVec::try_zeroed(len).map_err(|e| Error::alloc(len, e))?,
        };
        self.nulls.insert(nulls).as_mut_slice()[pos as usize] = 1;
        Ok(())
    }

    /// Marks the value at `pos` non-null. A no-op when no null buffer
    /// exists.
    pub fn set_not_null(&mut self, pos: u32) -> Result<()> {
        debug_assert!((pos as usize) < self.index.len());
        if let Some(nulls) = self.nulls.as_mut() {
            nulls.as_mut_slice()[pos as usize] = 0;
        }
        Ok(())
    }

    /// Resident heap bytes of the value and null buffers. The shared index
    /// is accounted once by its owning commit, not per column.
    pub fn memory(&self) -> usize {
        self.data.heap_size() + self.nulls.as_ref().map_or(0, |nulls| nulls.heap_size())
    }
}
