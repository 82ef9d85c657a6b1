//! Table container abstraction.
//!
//! The engine only needs four capabilities from a container: enumerate
//! table names, stream one table's events with its schema, create a
//! destination table from a schema, and append rows one at a time. Two
//! backends ship: [`MemoryStore`] for tests and embedding, [`JsonlStore`]
//! for files.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlStore;
pub use memory::{MemoryStore, MemoryTable};

use crate::error::StoreResult;
use crate::model::{CellValue, Row, TableSchema};

/// Streaming reader over one table's events.
pub trait EventSource {
    /// Schema of the table being read.
    fn schema(&self) -> &TableSchema;

    /// The next event, or `None` at end of table. Reads lazily; memory use
    /// stays bounded by one event.
    fn next_event(&mut self) -> StoreResult<Option<Row>>;
}

/// Row-at-a-time writer into one destination table.
pub trait EventSink {
    /// Append one row matching the creation schema.
    fn append(&mut self, row: &[CellValue]) -> StoreResult<()>;

    /// Flush buffered rows. Called both after a completed job and before a
    /// per-event abort, so rows written for earlier events survive.
    fn finish(&mut self) -> StoreResult<()>;
}

/// Read side of a table container.
pub trait InputStore {
    /// Names of the tables in this store, sorted.
    fn table_names(&self) -> Vec<String>;

    /// Open one table for streaming.
    fn open_table(&self, name: &str) -> StoreResult<Box<dyn EventSource + '_>>;
}

/// Write side of a table container.
pub trait OutputStore {
    /// Create (or overwrite) a destination table.
    fn create_table(&mut self, schema: &TableSchema) -> StoreResult<Box<dyn EventSink + '_>>;
}
