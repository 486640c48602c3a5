//! Serialized partial-row batches, the input format of the write side.
//!
//! A batch is an append-only byte region of length-prefixed row operations:
//!
//! ```text
//! 4 byte payload length | row payload
//! 4 byte payload length | row payload
//! ...
//! ```
//!
//! Each payload starts with a 2-byte bit vector length, then the bit vector
//! itself: one bit per column id marking the cells the operation sets (bit 0
//! is reserved for the delete marker), followed by one bit per set nullable
//! cell marking an explicit null, padded to whole bytes. The non-null set
//! cells' values follow in column id order, each at its type's fixed width.
//!
//! Lengths and values are stored unaligned in native byte order, so decoding
//! goes through [`bytemuck::pod_read_unaligned`]. Only fixed-width column
//! types are representable.

use std::sync::Arc;

use lamina_bytes::AlignedByteVec;
use lamina_common::{Result, error::Error, verify_arg};

use crate::reader::Value;
use crate::schema::{ColumnSchema, Schema};

/// Widest supported cell value (`int128`).
const MAX_CELL_BYTES: usize = 16;

/// A batch of serialized row operations against one schema.
///
/// Capacities are fixed at construction; appends beyond them fail instead of
/// growing, so a filled batch has a stable memory footprint.
#[derive(Debug)]
pub struct PartialRowBatch {
    schema: Arc<Schema>,
    row_offsets: Vec<u32>,
    data: AlignedByteVec,
    byte_capacity: usize,
    row_capacity: usize,
}

impl PartialRowBatch {
    pub const DEFAULT_BYTE_CAPACITY: usize = 1 << 20;
    pub const DEFAULT_ROW_CAPACITY: usize = 1 << 16;

    pub fn new(schema: Arc<Schema>) -> Result<PartialRowBatch> {
        Self::with_capacity(schema, Self::DEFAULT_BYTE_CAPACITY, Self::DEFAULT_ROW_CAPACITY)
    }

    pub fn with_capacity(
        schema: Arc<Schema>,
        byte_capacity: usize,
        row_capacity: usize,
    ) -> Result<PartialRowBatch> {
        // Row offsets are stored as u32.
        verify_arg!(byte_capacity, byte_capacity <= u32::MAX as usize);
        let data = AlignedByteVec::try_with_capacity(byte_capacity)
            .map_err(|e| Error::alloc(byte_capacity, e))?;
        Ok(PartialRowBatch {
            schema,
            row_offsets: Vec::new(),
            data,
            byte_capacity,
            row_capacity,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.row_offsets.len()
    }

    pub fn row_capacity(&self) -> usize {
        self.row_capacity
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn byte_capacity(&self) -> usize {
        self.byte_capacity
    }

    /// Serialized payload of row `idx`, without the length prefix, or `None`
    /// when `idx` is out of range.
    pub fn row(&self, idx: usize) -> Option<&[u8]> {
        let offset = *self.row_offsets.get(idx)? as usize;
        let len = bytemuck::pod_read_unaligned::<u32>(&self.data[offset..offset + 4]) as usize;
        Some(&self.data[offset + 4..offset + 4 + len])
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum CellSlot {
    Unset,
    Null,
    Value([u8; MAX_CELL_BYTES]),
}

/// Stages one row operation at a time and appends it to a batch.
///
/// Values are copied into the staging slots at `set` time, so a staged row
/// borrows nothing from the caller. `start_row` must be called before each
/// row; a slot set twice keeps the last write.
pub struct PartialRowWriter<'a> {
    schema: &'a Schema,
    cells: Vec<CellSlot>,
    row_nulls: usize,
}

impl<'a> PartialRowWriter<'a> {
    pub fn new(schema: &'a Schema) -> PartialRowWriter<'a> {
        PartialRowWriter {
            schema,
            cells: vec![CellSlot::Unset; schema.cid_size()],
            row_nulls: 0,
        }
    }

    /// Clears the staging slots for the next row.
    pub fn start_row(&mut self) {
        self.cells.fill(CellSlot::Unset);
        self.row_nulls = 0;
    }

    /// Stages the cell of the column with id `cid`. `None` marks an explicit
    /// null and is only accepted for nullable columns; the value type must
    /// match the column's width.
    pub fn set<T: Value>(&mut self, cid: u32, value: Option<T>) -> Result<()> {
        let Some(cs) = self.schema.by_cid(cid) else {
            return Err(Error::invalid_arg("cid", format!("no column with id {cid}")));
        };
        verify_arg!(value, size_of::<T>() == cs.ctype().fixed_size());
        if value.is_none() && !cs.is_nullable() {
            let name = cs.name();
            return Err(Error::invalid_arg("value", format!("column {name} is not nullable")));
        }
        let slot = &mut self.cells[cid as usize];
        if cs.is_nullable() && *slot == CellSlot::Unset {
            self.row_nulls += 1;
        }
        *slot = match value {
            Some(v) => {
                let mut bytes = [0u8; MAX_CELL_BYTES];
                bytes[..size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&v));
                CellSlot::Value(bytes)
            }
            None => CellSlot::Null,
        };
        Ok(())
    }

    /// Stages the cell of the column named `name`.
    pub fn set_by_name<T: Value>(&mut self, name: &str, value: Option<T>) -> Result<()> {
        let Some(cs) = self.schema.by_name(name) else {
            return Err(Error::invalid_arg("name", format!("no column named {name}")));
        };
        self.set(cs.cid(), value)
    }

    /// Marks the staged row as a delete operation.
    // TODO: wire the delete marker bit once the apply path handles deletes.
    pub fn set_delete(&mut self) -> Result<()> {
        Err(Error::not_implemented("delete row operations"))
    }

    /// Serializes the staged row into `batch`.
    ///
    /// Every key column must be set. The staging slots are left intact, so a
    /// row can be written to several batches; call `start_row` before
    /// staging the next one.
    pub fn write_row_to_batch(&self, batch: &mut PartialRowBatch) -> Result<()> {
        // Validate everything up front so a failed append leaves the batch
        // unchanged.
        verify_arg!(batch, batch.row_count() < batch.row_capacity());
        let row_len = self.row_byte_size();
        verify_arg!(batch, batch.byte_size() + row_len + 4 <= batch.byte_capacity());
        let bit_bytes = (self.schema.cid_size() + self.row_nulls).div_ceil(8);
        if bit_bytes > u16::MAX as usize {
            return Err(Error::not_implemented("bit vector wider than 64 KiB"));
        }
        for key in &self.schema.columns()[..self.schema.num_key_columns()] {
            if self.cells[key.cid() as usize] == CellSlot::Unset {
                let name = key.name();
                return Err(Error::invalid_arg("row", format!("key column {name} not set")));
            }
        }

        let offset = batch.data.len();
        batch.data.push_typed::<u32>(row_len as u32);
        batch.data.push_typed::<u16>(bit_bytes as u16);
        let mut bitvec = vec![0u8; bit_bytes];
        let mut null_bit = self.schema.cid_size();
        for (cid, slot) in self.cells.iter().enumerate().skip(1) {
            if *slot == CellSlot::Unset {
                continue;
            }
            bitmap_set(&mut bitvec, cid);
            if self.schema.columns()[cid - 1].is_nullable() {
                if *slot == CellSlot::Null {
                    bitmap_set(&mut bitvec, null_bit);
                }
                null_bit += 1;
            }
        }
        debug_assert_eq!(null_bit, self.schema.cid_size() + self.row_nulls);
        batch.data.extend_from_slice(&bitvec);
        for (cid, slot) in self.cells.iter().enumerate().skip(1) {
            if let CellSlot::Value(bytes) = slot {
                let width = self.schema.columns()[cid - 1].ctype().fixed_size();
                batch.data.extend_from_slice(&bytes[..width]);
            }
        }
        debug_assert_eq!(batch.data.len(), offset + 4 + row_len);
        batch.row_offsets.push(offset as u32);
        Ok(())
    }

    /// Serialized payload size of the staged row.
    fn row_byte_size(&self) -> usize {
        let bit_bytes = (self.schema.cid_size() + self.row_nulls).div_ceil(8);
        let mut size = 2 + bit_bytes;
        for (cid, slot) in self.cells.iter().enumerate().skip(1) {
            if let CellSlot::Value(_) = slot {
                size += self.schema.columns()[cid - 1].ctype().fixed_size();
            }
        }
        size
    }
}

/// Decodes one row operation of a batch at a time.
pub struct PartialRowReader<'a> {
    batch: &'a PartialRowBatch,
    delete: bool,
    cells: Vec<(&'a ColumnSchema, Option<&'a [u8]>)>,
}

impl<'a> PartialRowReader<'a> {
    pub fn new(batch: &'a PartialRowBatch) -> PartialRowReader<'a> {
        PartialRowReader {
            batch,
            delete: false,
            cells: Vec::with_capacity(batch.schema().num_columns()),
        }
    }

    pub fn row_count(&self) -> usize {
        self.batch.row_count()
    }

    /// Decodes row `idx`, replacing the current cell list.
    pub fn read(&mut self, idx: usize) -> Result<()> {
        self.delete = false;
        self.cells.clear();
        let Some(row) = self.batch.row(idx) else {
            return Err(Error::invalid_arg("idx", format!("row {idx} out of range")));
        };
        let schema = self.batch.schema();
        let bit_bytes = bytemuck::pod_read_unaligned::<u16>(&row[..2]) as usize;
        let bitvec = &row[2..2 + bit_bytes];
        let mut cur = 2 + bit_bytes;
        let mut null_bit = schema.cid_size();
        self.delete = bitmap_test(bitvec, 0);
        for cid in 1..schema.cid_size() {
            if !bitmap_test(bitvec, cid) {
                continue;
            }
            let cs = &schema.columns()[cid - 1];
            let value = if cs.is_nullable() && bitmap_test(bitvec, null_bit) {
                None
            } else {
                let width = cs.ctype().fixed_size();
                let bytes = &row[cur..cur + width];
                cur += width;
                Some(bytes)
            };
            if cs.is_nullable() {
                null_bit += 1;
            }
            self.cells.push((cs, value));
        }
        Ok(())
    }

    /// Whether the decoded row is a delete operation.
    pub fn is_delete(&self) -> bool {
        self.delete
    }

    /// Number of cells the decoded row sets.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Cell `idx` of the decoded row, in column id order: the column and its
    /// value bytes, `None` for an explicit null.
    pub fn cell(&self, idx: usize) -> Result<(&ColumnSchema, Option<&[u8]>)> {
        verify_arg!(idx, idx < self.cells.len());
        Ok(self.cells[idx])
    }
}

fn bitmap_set(bits: &mut [u8], idx: usize) {
    bits[idx / 8] |= 1 << (idx % 8);
}

fn bitmap_test(bits: &[u8], idx: usize) -> bool {
    bits[idx / 8] & (1 << (idx % 8)) != 0
}
