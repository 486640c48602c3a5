//! A column's immutable base blocks and versioned delta chain.

use std::sync::Arc;

use lamina_common::{Result, error::Error, verify_arg};

use crate::block::ColumnBlock;
use crate::delta::ColumnDelta;
use crate::reader::{ColumnReader, TypedColumnReader, Value};
use crate::rowid::BLOCK_CAPACITY;
use crate::schema::{ColumnSchema, ColumnType};

/// One link of a column's version chain: a version and the delta written at
/// it. The first link is the base version and carries no delta.
#[derive(Debug)]
pub struct VersionInfo {
    version: u64,
    delta: Option<Arc<ColumnDelta>>,
}

impl VersionInfo {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn delta(&self) -> Option<&Arc<ColumnDelta>> {
        self.delta.as_ref()
    }
}

/// A single column: schema, storage type, the base block sequence and the
/// chronologically ordered delta chain.
///
/// The storage type may be narrower than the schema's logical type when the
/// committed representation is encoded; readers are instantiated over both.
/// Base blocks and attached deltas are immutable and shared through `Arc`,
/// so snapshots stay valid for as long as they are borrowed.
#[derive(Debug)]
pub struct Column {
    schema: ColumnSchema,
    storage_type: ColumnType,
    base: Vec<Arc<ColumnBlock>>,
    versions: Vec<VersionInfo>,
}

impl Column {
    pub fn new(schema: ColumnSchema, storage_type: ColumnType, version: u64) -> Result<Column> {
        verify_arg!(storage_type, storage_type.fixed_size() <= schema.ctype().fixed_size());
        Ok(Column {
            schema,
            storage_type,
            base: Vec::new(),
            versions: vec![VersionInfo {
                version,
                delta: None,
            }],
        })
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn storage_type(&self) -> ColumnType {
        self.storage_type
    }

    /// The version the base blocks reflect.
    pub fn base_version(&self) -> u64 {
        self.versions[0].version
    }

    /// The newest version in the chain.
    pub fn latest_version(&self) -> u64 {
        self.versions[self.versions.len() - 1].version
    }

    pub fn versions(&self) -> &[VersionInfo] {
        &self.versions
    }

    pub fn base_blocks(&self) -> &[Arc<ColumnBlock>] {
        &self.base
    }

    /// Appends the next base block. All blocks but the last must be full,
    /// and the block's value buffer must match the storage width.
    pub fn append_base_block(&mut self, block: Arc<ColumnBlock>) -> Result<()> {
        let esize = self.storage_type.fixed_size();
        verify_arg!(block, block.data().len() >= block.size() * esize);
        verify_arg!(block, self.base.last().is_none_or(|b| b.size() == BLOCK_CAPACITY));
        verify_arg!(block, self.schema.is_nullable() || block.nulls().is_none());
        self.base.push(block);
        Ok(())
    }

    /// Attaches a delta written at a version newer than everything in the
    /// chain. The delta must be sized for this column's storage width and
    /// its rows must fall inside the base.
    pub fn append_delta(&mut self, delta: Arc<ColumnDelta>) -> Result<()> {
        let esize = self.storage_type.fixed_size();
        verify_arg!(delta, delta.version() > self.latest_version());
        verify_arg!(delta, delta.data().len() >= delta.index().len() * esize);
        verify_arg!(delta, self.schema.is_nullable() || delta.nulls().is_none());
        verify_arg!(delta, delta.index().num_blocks() <= self.base.len());
        if let Some(last) = self.base.last() {
            if last.size() < BLOCK_CAPACITY {
                let range = delta.index().block_range(self.base.len() - 1);
                let positions = &delta.index().positions()[range];
                verify_arg!(delta, positions.iter().all(|&p| (p as usize) < last.size()));
            }
        }
        let version = delta.version();
        self.versions.push(VersionInfo {
            version,
            delta: Some(delta),
        });
        Ok(())
    }

    /// Resolves the deltas visible at `version`, oldest first, along with
    /// the real version: the newest chain version at or below the snapshot.
    ///
    /// A snapshot older than the base version cannot be served, since the
    /// base already reflects writes the snapshot must not see.
    pub fn capture_version(&self, version: u64) -> Result<(Vec<&ColumnDelta>, u64)> {
        let base_version = self.base_version();
        if version < base_version {
            return Err(Error::invalid_arg(
                "version",
                format!("snapshot {version} predates base version {base_version}"),
            ));
        }
        let mut deltas = Vec::new();
        let mut real_version = base_version;
        for info in &self.versions[1..] {
            if info.version > version {
                break;
            }
            real_version = info.version;
            if let Some(delta) = info.delta.as_deref() {
                deltas.push(delta);
            }
        }
        Ok((deltas, real_version))
    }

    /// Creates a typed reader over this column as of `version`.
    pub fn read<T, const NULLABLE: bool, ST>(
        &self,
        version: u64,
    ) -> Result<TypedColumnReader<'_, T, NULLABLE, ST>>
    where
        T: Value,
        ST: Value,
    {
        TypedColumnReader::new(self, version)
    }

    /// Creates a type-erased reader as of `version`, dispatching on the
    /// column's storage type and nullability.
    pub fn create_reader(&self, version: u64) -> Result<Box<dyn ColumnReader + '_>> {
        if self.storage_type != self.schema.ctype() {
            return Err(Error::not_implemented(format!(
                "reader over distinct storage and logical types ({} as {})",
                self.storage_type,
                self.schema.ctype()
            )));
        }
        macro_rules! reader_for {
            ($t:ty) => {
                if self.schema.is_nullable() {
                    Box::new(self.read::<$t, true, $t>(version)?) as Box<dyn ColumnReader + '_>
                } else {
                    Box::new(self.read::<$t, false, $t>(version)?)
                }
            };
        }
        Ok(match self.storage_type {
            ColumnType::Int8 => reader_for!(i8),
            ColumnType::Int16 => reader_for!(i16),
            ColumnType::Int32 => reader_for!(i32),
            ColumnType::Int64 => reader_for!(i64),
            ColumnType::Int128 => reader_for!(i128),
            ColumnType::Float32 => reader_for!(f32),
            ColumnType::Float64 => reader_for!(f64),
        })
    }

    /// Resident heap bytes of the base blocks and attached deltas. Delta
    /// indexes are shared across the columns of a commit and accounted by
    /// that owner, not here.
    pub fn memory(&self) -> usize {
        let base: usize = self.base.iter().map(|b| b.memory()).sum();
        let deltas: usize = self
            .versions
            .iter()
            .filter_map(|v| v.delta.as_deref())
            .map(|d| d.memory())
            .sum();
        base + deltas
    }

    /// Identity summary used in diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "column(cid={} name={} type={}{} blocks={})",
            self.schema.cid(),
            self.schema.name(),
            self.storage_type,
            if self.schema.is_nullable() {
                " nullable"
            } else {
                ""
            },
            self.base.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaIndex;

    fn int64_column(nullable: bool, version: u64) -> Column {
        let schema = ColumnSchema::new(1, "v", ColumnType::Int64, nullable, false).unwrap();
        Column::new(schema, ColumnType::Int64, version).unwrap()
    }

    fn block_of(values: &[i64]) -> Arc<ColumnBlock> {
        let mut block = ColumnBlock::new();
        block.alloc(values.len(), 8).unwrap();
        block.data_mut().typed_data_mut::<i64>().copy_from_slice(values);
        Arc::new(block)
    }

    fn delta_of(version: u64, rows: &[u32], values: &[i64]) -> Arc<ColumnDelta> {
        let index = Arc::new(DeltaIndex::from_rows(rows).unwrap());
        let mut delta = ColumnDelta::alloc(version, index, 8, false).unwrap();
        delta.data_mut().typed_data_mut::<i64>().copy_from_slice(values);
        Arc::new(delta)
    }

    #[test]
    fn test_new_rejects_wider_storage() {
        let schema = ColumnSchema::new(1, "v", ColumnType::Int32, false, false).unwrap();
        assert!(Column::new(schema.clone(), ColumnType::Int64, 1).is_err());
        assert!(Column::new(schema, ColumnType::Int16, 1).is_ok());
    }

    #[test]
    fn test_append_delta_requires_newer_version() {
        let mut column = int64_column(false, 5);
        column.append_base_block(block_of(&[1, 2, 3])).unwrap();
        column.append_delta(delta_of(7, &[0], &[10])).unwrap();
        assert!(column.append_delta(delta_of(7, &[1], &[20])).is_err());
        assert!(column.append_delta(delta_of(6, &[1], &[20])).is_err());
        column.append_delta(delta_of(8, &[1], &[20])).unwrap();
        assert_eq!(column.latest_version(), 8);
    }

    #[test]
    fn test_append_delta_rejects_out_of_base_rows() {
        let mut column = int64_column(false, 1);
        column.append_base_block(block_of(&[1, 2, 3])).unwrap();
        // Offset beyond the last block's fill.
        assert!(column.append_delta(delta_of(2, &[3], &[9])).is_err());
        // Block beyond the base.
        assert!(
            column
                .append_delta(delta_of(2, &[crate::rowid::from_parts(1, 0)], &[9]))
                .is_err()
        );
    }

    #[test]
    fn test_append_base_block_rejects_partial_then_more() {
        let mut column = int64_column(false, 1);
        column.append_base_block(block_of(&[1, 2])).unwrap();
        assert!(column.append_base_block(block_of(&[3])).is_err());
    }

    #[test]
    fn test_nullable_delta_rejected_on_non_nullable_column() {
        let mut column = int64_column(false, 1);
        column.append_base_block(block_of(&[1, 2, 3])).unwrap();
        let index = Arc::new(DeltaIndex::from_rows(&[0]).unwrap());
        let delta = Arc::new(ColumnDelta::alloc(2, index, 8, true).unwrap());
        assert!(column.append_delta(delta).is_err());
    }

    #[test]
    fn test_capture_version_selection() {
        let mut column = int64_column(false, 5);
        column.append_base_block(block_of(&[1, 2, 3])).unwrap();
        column.append_delta(delta_of(7, &[0], &[10])).unwrap();
        column.append_delta(delta_of(9, &[1], &[20])).unwrap();

        assert!(column.capture_version(4).is_err());

        let (deltas, real) = column.capture_version(5).unwrap();
        assert!(deltas.is_empty());
        assert_eq!(real, 5);

        let (deltas, real) = column.capture_version(8).unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].version(), 7);
        assert_eq!(real, 7);

        let (deltas, real) = column.capture_version(9).unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(real, 9);

        let (deltas, real) = column.capture_version(100).unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(real, 9);
    }

    #[test]
    fn test_version_chain_shape() {
        let mut column = int64_column(false, 5);
        column.append_base_block(block_of(&[1, 2, 3])).unwrap();
        column.append_delta(delta_of(7, &[0], &[10])).unwrap();
        column.append_delta(delta_of(9, &[1], &[20])).unwrap();

        let chain = column.versions();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].version(), 5);
        assert!(chain[0].delta().is_none());
        assert_eq!(chain[1].version(), 7);
        assert_eq!(chain[1].delta().unwrap().version(), 7);
        assert_eq!(chain[2].version(), 9);
        assert_eq!(chain[2].delta().unwrap().version(), 9);
    }

    #[test]
    fn test_describe() {
        let schema = ColumnSchema::new(3, "price", ColumnType::Int64, true, false).unwrap();
        let mut column = Column::new(schema, ColumnType::Int64, 1).unwrap();
        let mut block = ColumnBlock::new();
        block.alloc(2, 8).unwrap();
        column.append_base_block(Arc::new(block)).unwrap();
        let s = column.describe();
        assert!(s.contains("cid=3"));
        assert!(s.contains("name=price"));
        assert!(s.contains("type=int64"));
        assert!(s.contains("nullable"));
        assert!(s.contains("blocks=1"));
    }

    #[test]
    fn test_memory_accounting() {
        let mut column = int64_column(false, 1);
        assert_eq!(column.memory(), 0);
        column.append_base_block(block_of(&[1, 2, 3])).unwrap();
        let base_only = column.memory();
        assert!(base_only >= 24);
        column.append_delta(delta_of(2, &[0], &[10])).unwrap();
        assert!(column.memory() > base_only);
    }
}
