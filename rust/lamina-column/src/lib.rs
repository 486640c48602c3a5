//! Read path of the Lamina in-memory multi-version column store.
//!
//! A column's committed data lives in an immutable sequence of fixed-capacity
//! base blocks. Later writes arrive as sparse deltas, each created at a write
//! version and layered atop the base and every earlier delta. Reading the
//! column at a snapshot version means merging the base with exactly the
//! deltas visible at that version, newest write winning per row.
//!
//! # Main Components
//!
//! - [`column::Column`]: the base block sequence plus the versioned delta
//!   chain, and the factory for snapshot readers.
//! - [`block::ColumnBlock`]: one fixed-capacity block of values with lazy
//!   null tracking, shared read-only through `Arc`.
//! - [`delta::ColumnDelta`] and [`delta::DeltaIndex`]: one commit's sparse
//!   row overrides and the row-id index shared by its column deltas.
//! - [`reader::TypedColumnReader`]: the versioned view over a column,
//!   providing point reads, whole-block materialization and the key-column
//!   hash/equality contract; [`reader::ColumnReader`] is its type-erased
//!   form.
//! - [`block_holder::ColumnBlockHolder`]: the per-scan cache distinguishing
//!   borrowed base blocks from owned merge output, reusing the owned
//!   allocation across blocks.
//! - [`partial_row::PartialRowBatch`] with its writer and reader: the
//!   serialized row-operation batches that feed the write side, defined
//!   against a multi-column [`schema::Schema`].
//!
//! Point reads scan deltas newest to oldest and fall back to the base block
//! addressed by the row id's block-index/offset split. Block materialization
//! copies the base block once, then applies deltas oldest to newest; both
//! paths produce the same values.

pub mod block;
pub mod block_holder;
pub mod column;
pub mod delta;
pub mod partial_row;
pub mod reader;
pub mod rowid;
pub mod schema;

pub use block::ColumnBlock;
pub use block_holder::ColumnBlockHolder;
pub use column::Column;
pub use delta::{ColumnDelta, DeltaIndex};
pub use partial_row::{PartialRowBatch, PartialRowReader, PartialRowWriter};
pub use reader::{ColumnReader, TypedColumnReader};
pub use rowid::{BLOCK_CAPACITY, RowId};
pub use schema::{ColumnSchema, ColumnType, Schema};
