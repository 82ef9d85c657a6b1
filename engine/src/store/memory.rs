//! In-memory table store for tests and embedding.

use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};
use crate::model::{CellValue, Row, TableSchema};

use super::{EventSink, EventSource, InputStore, OutputStore};

/// One in-memory table.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

/// A set of named in-memory tables. Implements both store sides, so it can
/// serve as a job's input, output, or both.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully built table, validating every row against the schema.
    pub fn insert_table(&mut self, schema: TableSchema, rows: Vec<Row>) -> StoreResult<()> {
        schema.validate()?;
        for (i, row) in rows.iter().enumerate() {
            schema.check_row(row).map_err(|message| StoreError::Corrupt {
                table: schema.name.clone(),
                row: i as u64,
                message,
            })?;
        }
        self.tables.insert(schema.name.clone(), MemoryTable { schema, rows });
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl InputStore for MemoryStore {
    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn open_table(&self, name: &str) -> StoreResult<Box<dyn EventSource + '_>> {
        let table = self
            .tables
            .get(name)
            .ok_or_else(|| StoreError::MissingTable(name.to_string()))?;
        Ok(Box::new(MemorySource { table, position: 0 }))
    }
}

impl OutputStore for MemoryStore {
    fn create_table(&mut self, schema: &TableSchema) -> StoreResult<Box<dyn EventSink + '_>> {
        schema.validate()?;
        let table = self
            .tables
            .entry(schema.name.clone())
            .or_insert_with(|| MemoryTable { schema: schema.clone(), rows: Vec::new() });
        // Overwrite semantics, matching file-backed destinations.
        table.schema = schema.clone();
        table.rows.clear();
        Ok(Box::new(MemorySink { table }))
    }
}

struct MemorySource<'a> {
    table: &'a MemoryTable,
    position: usize,
}

impl EventSource for MemorySource<'_> {
    fn schema(&self) -> &TableSchema {
        &self.table.schema
    }

    fn next_event(&mut self) -> StoreResult<Option<Row>> {
        let row = self.table.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }
}

struct MemorySink<'a> {
    table: &'a mut MemoryTable,
}

impl EventSink for MemorySink<'_> {
    fn append(&mut self, row: &[CellValue]) -> StoreResult<()> {
        self.table.schema.check_row(row).map_err(|message| StoreError::Corrupt {
            table: self.table.schema.name.clone(),
            row: self.table.rows.len() as u64,
            message,
        })?;
        self.table.rows.push(row.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSpec, Scalar, ScalarKind};

    fn schema(name: &str) -> TableSchema {
        TableSchema::new(
            name,
            vec![
                ColumnSpec::scalar("x", ScalarKind::Int),
                ColumnSpec::scalar("y", ScalarKind::Float),
            ],
        )
        .unwrap()
    }

    fn row(x: i64, y: f64) -> Row {
        vec![CellValue::Scalar(Scalar::Int(x)), CellValue::Scalar(Scalar::Float(y))]
    }

    #[test]
    fn test_insert_and_stream() {
        let mut store = MemoryStore::new();
        store.insert_table(schema("t"), vec![row(1, 1.5), row(2, 2.5)]).unwrap();

        let mut source = store.open_table("t").unwrap();
        assert_eq!(source.schema().name, "t");
        assert_eq!(source.next_event().unwrap(), Some(row(1, 1.5)));
        assert_eq!(source.next_event().unwrap(), Some(row(2, 2.5)));
        assert_eq!(source.next_event().unwrap(), None);
    }

    #[test]
    fn test_insert_validates_rows() {
        let mut store = MemoryStore::new();
        let bad = vec![vec![
            CellValue::Scalar(Scalar::Float(1.0)),
            CellValue::Scalar(Scalar::Float(2.0)),
        ]];
        assert!(matches!(
            store.insert_table(schema("t"), bad),
            Err(StoreError::Corrupt { row: 0, .. })
        ));
    }

    #[test]
    fn test_missing_table() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.open_table("nope").err(),
            Some(StoreError::MissingTable(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_sink_appends_and_validates() {
        let mut store = MemoryStore::new();
        {
            let mut sink = store.create_table(&schema("out")).unwrap();
            sink.append(&row(1, 1.0)).unwrap();
            assert!(sink.append(&[CellValue::Scalar(Scalar::Bool(true))]).is_err());
            sink.finish().unwrap();
        }
        assert_eq!(store.table("out").unwrap().rows.len(), 1);
    }

    #[test]
    fn test_create_overwrites_existing_table() {
        let mut store = MemoryStore::new();
        store.insert_table(schema("t"), vec![row(1, 1.0)]).unwrap();
        {
            let mut sink = store.create_table(&schema("t")).unwrap();
            sink.append(&row(9, 9.0)).unwrap();
            sink.finish().unwrap();
        }
        let table = store.table("t").unwrap();
        assert_eq!(table.rows, vec![row(9, 9.0)]);
    }
}
