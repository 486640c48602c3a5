//! Versioned column readers: point reads, block materialization and the
//! key-column hash/equality contract.

use std::any::TypeId;
use std::marker::PhantomData;

use lamina_common::{Result, verify_arg};
use xxhash_rust::xxh3::xxh3_64;

use crate::block_holder::ColumnBlockHolder;
use crate::column::Column;
use crate::delta::ColumnDelta;
use crate::rowid::{RowId, block_index, block_offset};

/// Fixed-width value types the store lays out in raw buffers.
pub trait Value:
    bytemuck::AnyBitPattern + bytemuck::NoUninit + PartialEq + Send + Sync + 'static
{
}

impl<T> Value for T where
    T: bytemuck::AnyBitPattern + bytemuck::NoUninit + PartialEq + Send + Sync + 'static
{
}

/// Type-erased reader over one column at one snapshot version.
///
/// Implemented by every [`TypedColumnReader`] instantiation; produced by
/// [`Column::create_reader`]. Probe arrays are passed as raw bytes and
/// reinterpreted at the reader's logical type, so they must be aligned and
/// sized for that type.
pub trait ColumnReader: Send + Sync {
    /// Bytes of the value at `rid`; `None` when the row is null.
    fn get(&self, rid: RowId) -> Option<&[u8]>;

    /// Materializes block `block` into `holder`, borrowing the base block
    /// when no visible delta touches it.
    fn get_block(&self, nrows: usize, block: usize, holder: &mut ColumnBlockHolder) -> Result<()>;

    /// Content hash of the probe value at `rhs_idx`.
    fn hashcode(&self, rhs: &[u8], rhs_idx: usize) -> u64;

    /// Compares the column's value at `rid` with the probe value at
    /// `rhs_idx`.
    fn equals(&self, rid: RowId, rhs: &[u8], rhs_idx: usize) -> bool;

    /// Diagnostic summary: column identity, snapshot and real version,
    /// delta count.
    fn describe(&self) -> String;
}

/// Snapshot view of one column: the base blocks plus the deltas visible at
/// the snapshot version, ordered oldest to newest.
///
/// Generic over the logical value type `T` used by external comparisons,
/// the nullability of the column, and the storage type `ST` actually laid
/// out in buffers. `ST` may be narrower than `T` for encoded columns;
/// `hashcode` and `equals` are only well-defined when the two coincide.
///
/// The reader borrows the column and holds no mutation rights over it; the
/// delta subset is captured at construction and later chain growth is not
/// observed.
pub struct TypedColumnReader<'a, T, const NULLABLE: bool = false, ST = T> {
    column: &'a Column,
    version: u64,
    real_version: u64,
    deltas: Vec<&'a ColumnDelta>,
    _marker: PhantomData<(T, ST)>,
}

impl<'a, T, const NULLABLE: bool, ST> TypedColumnReader<'a, T, NULLABLE, ST>
where
    T: Value,
    ST: Value,
{
    /// Creates a reader over `column` as of `version`. The instantiation
    /// must agree with the column: `ST` at the storage width, `NULLABLE`
    /// matching the schema.
    pub fn new(column: &'a Column, version: u64) -> Result<Self> {
        verify_arg!(storage_type, size_of::<ST>() == column.storage_type().fixed_size());
        verify_arg!(nullable, NULLABLE == column.schema().is_nullable());
        let (deltas, real_version) = column.capture_version(version)?;
        debug_assert!(deltas.windows(2).all(|w| w[0].version() < w[1].version()));
        Ok(TypedColumnReader {
            column,
            version,
            real_version,
            deltas,
            _marker: PhantomData,
        })
    }

    /// The snapshot version this reader observes.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The newest chain version at or below the snapshot.
    pub fn real_version(&self) -> u64 {
        self.real_version
    }

    pub fn num_deltas(&self) -> usize {
        self.deltas.len()
    }

    /// Reads the value at `rid`, or `None` when the row is null.
    ///
    /// Deltas are scanned newest to oldest; the first delta covering the
    /// row wins, the base block answers otherwise. Row ids outside the base
    /// are a caller error.
    pub fn get(&self, rid: RowId) -> Option<&ST> {
        for delta in self.deltas.iter().rev() {
            if let Some(pos) = delta.find_idx(rid) {
                if NULLABLE && delta.is_null(pos) {
                    return None;
                }
                return Some(&delta.data().typed_data::<ST>()[pos as usize]);
            }
        }
        let base = self.column.base_blocks();
        let bid = block_index(rid) as usize;
        debug_assert!(bid < base.len());
        let block = &base[bid];
        let idx = block_offset(rid) as usize;
        debug_assert!(idx < block.size());
        if NULLABLE && block.is_null(idx) {
            return None;
        }
        Some(&block.data().typed_data::<ST>()[idx])
    }

    /// Materializes the first `nrows` rows of block `block` into `holder`.
    ///
    /// When no visible delta touches the block, the holder borrows the base
    /// block with no copying. Otherwise the holder's owned block (reused
    /// when large enough) receives the base prefix, and the deltas are
    /// applied oldest to newest so the newest write to each row lands last,
    /// matching the point-read policy.
    pub fn get_block(
        &self,
        nrows: usize,
        block: usize,
        holder: &mut ColumnBlockHolder,
    ) -> Result<()> {
        let base = self.column.base_blocks();
        debug_assert!(block < base.len());
        let page = &base[block];
        debug_assert!(nrows <= page.size());
        let esize = size_of::<ST>();

        if !self.deltas.iter().any(|d| d.contains_block(block)) {
            holder.init_borrowed(page.clone());
            return Ok(());
        }

        let cb = holder.ensure_owned(nrows, esize)?;
        page.copy_to(cb, nrows, esize)?;

        if NULLABLE {
            cb.ensure_nulls()?;
            let (data, nulls) = cb.data_and_nulls_mut();
            let values: &mut [ST] =
                bytemuck::cast_slice_mut(&mut data.as_mut_slice()[..nrows * esize]);
            let flags = nulls.expect("nulls allocated above").as_mut_slice();
            for delta in &self.deltas {
                let range = delta.index().block_range(block);
                if range.is_empty() {
                    continue;
                }
                let poses = delta.index().positions();
                let src: &[ST] = delta.data().typed_data();
                match delta.nulls() {
                    Some(dnulls) => {
                        let dnulls = dnulls.as_slice();
                        for i in range {
                            let pos = poses[i] as usize;
                            debug_assert!(pos < nrows);
                            if dnulls[i] != 0 {
                                flags[pos] = 1;
                            } else {
                                flags[pos] = 0;
                                values[pos] = src[i];
                            }
                        }
                    }
                    None => {
                        for i in range {
                            let pos = poses[i] as usize;
                            debug_assert!(pos < nrows);
                            flags[pos] = 0;
                            values[pos] = src[i];
                        }
                    }
                }
            }
        } else {
            let values: &mut [ST] =
                bytemuck::cast_slice_mut(&mut cb.data_mut().as_mut_slice()[..nrows * esize]);
            for delta in &self.deltas {
                let range = delta.index().block_range(block);
                if range.is_empty() {
                    continue;
                }
                let poses = delta.index().positions();
                let src: &[ST] = delta.data().typed_data();
                for i in range {
                    let pos = poses[i] as usize;
                    debug_assert!(pos < nrows);
                    values[pos] = src[i];
                }
            }
        }
        Ok(())
    }

    /// Content hash of the probe value at `rhs_idx`, for key-column probing.
    ///
    /// # Panics
    ///
    /// Panics on a nullable instantiation; keys are never nullable.
    pub fn hashcode(&self, rhs: &[T], rhs_idx: usize) -> u64 {
        assert!(!NULLABLE, "only used for key columns");
        if TypeId::of::<T>() == TypeId::of::<ST>() {
            xxh3_64(bytemuck::bytes_of(&rhs[rhs_idx]))
        } else {
            // Mixed logical/storage readers hash to a constant. Known
            // limitation: hash-based probes must not use mixed encodings.
            0
        }
    }

    /// Compares the column's value at `rid` against the probe value at
    /// `rhs_idx`, resolving deltas before the base exactly like `get` but
    /// value-only. Well-defined only when `T` and `ST` coincide.
    ///
    /// # Panics
    ///
    /// Panics on a nullable instantiation; keys are never nullable.
    pub fn equals(&self, rid: RowId, rhs: &[T], rhs_idx: usize) -> bool {
        assert!(!NULLABLE, "only used for key columns");
        let rhs_value = &rhs[rhs_idx];
        for delta in self.deltas.iter().rev() {
            if let Some(pos) = delta.find_idx(rid) {
                return delta.data().typed_data::<T>()[pos as usize] == *rhs_value;
            }
        }
        let base = self.column.base_blocks();
        let bid = block_index(rid) as usize;
        debug_assert!(bid < base.len());
        let block = &base[bid];
        let idx = block_offset(rid) as usize;
        debug_assert!(idx < block.size());
        block.data().typed_data::<T>()[idx] == *rhs_value
    }

    /// Diagnostic summary of the reader and its column.
    pub fn describe(&self) -> String {
        format!(
            "{} version={}(real={}) ndelta={}",
            self.column.describe(),
            self.version,
            self.real_version,
            self.deltas.len()
        )
    }
}

impl<'a, T, const NULLABLE: bool, ST> ColumnReader for TypedColumnReader<'a, T, NULLABLE, ST>
where
    T: Value,
    ST: Value,
{
    fn get(&self, rid: RowId) -> Option<&[u8]> {
        self.get(rid).map(bytemuck::bytes_of)
    }

    fn get_block(&self, nrows: usize, block: usize, holder: &mut ColumnBlockHolder) -> Result<()> {
        self.get_block(nrows, block, holder)
    }

    fn hashcode(&self, rhs: &[u8], rhs_idx: usize) -> u64 {
        self.hashcode(bytemuck::cast_slice(rhs), rhs_idx)
    }

    fn equals(&self, rid: RowId, rhs: &[u8], rhs_idx: usize) -> bool {
        self.equals(rid, bytemuck::cast_slice(rhs), rhs_idx)
    }

    fn describe(&self) -> String {
        self.describe()
    }
}
