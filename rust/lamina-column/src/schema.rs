//! Column identity: storage type, per-column schema and the multi-column
//! schema a tablet's rows are defined against.

use lamina_common::{Result, verify_arg};

/// Fixed-width value types a column can store.
///
/// Only fixed-size numeric types are supported; variable-length values are
/// out of scope for the read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Float32,
    Float64,
}

impl ColumnType {
    /// Width of a single value in bytes.
    pub fn fixed_size(&self) -> usize {
        match self {
            ColumnType::Int8 => 1,
            ColumnType::Int16 => 2,
            ColumnType::Int32 => 4,
            ColumnType::Int64 => 8,
            ColumnType::Int128 => 16,
            ColumnType::Float32 => 4,
            ColumnType::Float64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int8 => "int8",
            ColumnType::Int16 => "int16",
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::Int128 => "int128",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity and shape of one column: id, name, logical type, nullability and
/// whether it participates in the key.
///
/// Key columns are compared through the reader's `hashcode`/`equals` contract,
/// which is undefined for null values, so a key column is never nullable.
/// The constructor enforces that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    cid: u32,
    name: String,
    ctype: ColumnType,
    nullable: bool,
    is_key: bool,
}

impl ColumnSchema {
    pub fn new(
        cid: u32,
        name: impl Into<String>,
        ctype: ColumnType,
        nullable: bool,
        is_key: bool,
    ) -> Result<ColumnSchema> {
        let name = name.into();
        verify_arg!(name, !name.is_empty());
        verify_arg!(nullable, !(is_key && nullable));
        Ok(ColumnSchema {
            cid,
            name,
            ctype,
            nullable,
            is_key,
        })
    }

    pub fn cid(&self) -> u32 {
        self.cid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ctype(&self) -> ColumnType {
        self.ctype
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }
}

/// Ordered set of the columns a tablet's rows are defined against.
///
/// Column ids are consecutive starting at 1; id 0 is reserved for the
/// delete marker of row operations, so the id space is one wider than the
/// column count. Key columns form a non-empty prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
    num_key_columns: usize,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>) -> Result<Schema> {
        verify_arg!(columns, !columns.is_empty());
        verify_arg!(columns, columns.iter().enumerate().all(|(i, c)| c.cid() as usize == i + 1));
        let num_key_columns = columns.iter().take_while(|c| c.is_key()).count();
        verify_arg!(columns, num_key_columns > 0);
        verify_arg!(columns, columns[num_key_columns..].iter().all(|c| !c.is_key()));
        for (i, column) in columns.iter().enumerate() {
            verify_arg!(columns, columns[..i].iter().all(|c| c.name() != column.name()));
        }
        Ok(Schema {
            columns,
            num_key_columns,
        })
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Bit-index space of a row operation: one bit per column id plus the
    /// reserved delete bit.
    pub fn cid_size(&self) -> usize {
        self.columns.len() + 1
    }

    pub fn num_key_columns(&self) -> usize {
        self.num_key_columns
    }

    pub fn by_cid(&self, cid: u32) -> Option<&ColumnSchema> {
        self.columns.get((cid as usize).checked_sub(1)?)
    }

    pub fn by_name(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name() == name)
    }
}
