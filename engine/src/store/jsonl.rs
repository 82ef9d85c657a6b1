//! File-backed table store: one JSON-lines file per table.
//!
//! A store is a directory; table `a/b` lives at `<root>/a/b.jsonl`. The
//! first line of a table file is its schema document, every further line
//! one event encoded as a JSON object keyed by column name. Reading
//! streams line by line, writing appends through a buffered writer, so
//! memory stays bounded by one event on both sides.
//!
//! Non-finite floats have no JSON representation; they encode as `null`
//! and decode back to NaN under a float-typed column.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Number, Value};

use crate::error::{StoreError, StoreResult};
use crate::model::{CellValue, ColumnKind, Row, Scalar, ScalarKind, TableSchema};

use super::{EventSink, EventSource, InputStore, OutputStore};

/// A directory of `.jsonl` table files.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    root: PathBuf,
}

impl JsonlStore {
    /// Open an existing store directory for reading.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such store directory: {}", root.display()),
            )));
        }
        Ok(Self { root })
    }

    /// Create (or reuse) a store directory for writing.
    pub fn create(path: impl AsRef<Path>) -> StoreResult<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path of a table, rejecting names that would escape the root.
    fn table_path(&self, name: &str) -> StoreResult<PathBuf> {
        if name.is_empty() {
            return Err(StoreError::InvalidTable(name.to_string()));
        }
        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidTable(name.to_string()));
        }
        Ok(self.root.join(format!("{}.jsonl", name)))
    }
}

impl InputStore for JsonlStore {
    fn table_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let _ = collect_tables(&self.root, &self.root, &mut names);
        names.sort();
        names
    }

    fn open_table(&self, name: &str) -> StoreResult<Box<dyn EventSource + '_>> {
        let path = self.table_path(name)?;
        let file = File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::MissingTable(name.to_string())
            } else {
                StoreError::Io(e)
            }
        })?;
        let mut lines = BufReader::new(file).lines();

        let schema_line = match lines.next() {
            Some(line) => line?,
            None => {
                return Err(StoreError::Corrupt {
                    table: name.to_string(),
                    row: 0,
                    message: "missing schema line".to_string(),
                });
            }
        };
        let schema: TableSchema =
            serde_json::from_str(&schema_line).map_err(|e| StoreError::Corrupt {
                table: name.to_string(),
                row: 0,
                message: format!("bad schema document: {}", e),
            })?;
        schema.validate()?;

        Ok(Box::new(JsonlSource { table: name.to_string(), schema, lines, row: 0 }))
    }
}

impl OutputStore for JsonlStore {
    fn create_table(&mut self, schema: &TableSchema) -> StoreResult<Box<dyn EventSink + '_>> {
        schema.validate()?;
        let path = self.table_path(&schema.name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, schema)?;
        writer.write_all(b"\n")?;
        Ok(Box::new(JsonlSink { schema: schema.clone(), writer, row: 0 }))
    }
}

fn collect_tables(dir: &Path, root: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_tables(&path, root, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            if let Ok(relative) = path.strip_prefix(root) {
                let name = relative.with_extension("");
                out.push(name.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Reading
// =============================================================================

struct JsonlSource {
    table: String,
    schema: TableSchema,
    lines: Lines<BufReader<File>>,
    row: u64,
}

impl EventSource for JsonlSource {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn next_event(&mut self) -> StoreResult<Option<Row>> {
        loop {
            let line = match self.lines.next() {
                None => return Ok(None),
                Some(line) => line?,
            };
            if line.trim().is_empty() {
                continue;
            }
            self.row += 1;
            let value: Value = serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                table: self.table.clone(),
                row: self.row,
                message: e.to_string(),
            })?;
            let row = decode_row(&self.schema, &value).map_err(|message| StoreError::Corrupt {
                table: self.table.clone(),
                row: self.row,
                message,
            })?;
            return Ok(Some(row));
        }
    }
}

fn decode_row(schema: &TableSchema, value: &Value) -> Result<Row, String> {
    let object = value.as_object().ok_or("event is not a JSON object")?;
    let mut row = Vec::with_capacity(schema.columns.len());
    for column in &schema.columns {
        let cell = object
            .get(&column.name)
            .ok_or_else(|| format!("missing column '{}'", column.name))?;
        let decoded = match &column.kind {
            ColumnKind::Array { item, .. } => {
                let values = cell
                    .as_array()
                    .ok_or_else(|| format!("column '{}': expected array", column.name))?;
                let items = values
                    .iter()
                    .map(|v| decode_scalar(v, *item))
                    .collect::<Result<Vec<_>, String>>()
                    .map_err(|e| format!("column '{}': {}", column.name, e))?;
                CellValue::Array(items)
            }
            kind => {
                let scalar_kind = kind.scalar_kind().unwrap_or(ScalarKind::Str);
                CellValue::Scalar(
                    decode_scalar(cell, scalar_kind)
                        .map_err(|e| format!("column '{}': {}", column.name, e))?,
                )
            }
        };
        row.push(decoded);
    }
    Ok(row)
}

fn decode_scalar(value: &Value, kind: ScalarKind) -> Result<Scalar, String> {
    match kind {
        ScalarKind::Bool => value
            .as_bool()
            .map(Scalar::Bool)
            .ok_or_else(|| format!("expected bool, got {}", value)),
        ScalarKind::Int => value
            .as_i64()
            .map(Scalar::Int)
            .ok_or_else(|| format!("expected int, got {}", value)),
        ScalarKind::Float => {
            if value.is_null() {
                // Non-finite floats round-trip through null.
                Ok(Scalar::Float(f64::NAN))
            } else {
                value
                    .as_f64()
                    .map(Scalar::Float)
                    .ok_or_else(|| format!("expected float, got {}", value))
            }
        }
        ScalarKind::Str => value
            .as_str()
            .map(|s| Scalar::Str(s.to_string()))
            .ok_or_else(|| format!("expected string, got {}", value)),
    }
}

// =============================================================================
// Writing
// =============================================================================

struct JsonlSink {
    schema: TableSchema,
    writer: BufWriter<File>,
    row: u64,
}

impl EventSink for JsonlSink {
    fn append(&mut self, row: &[CellValue]) -> StoreResult<()> {
        self.schema.check_row(row).map_err(|message| StoreError::Corrupt {
            table: self.schema.name.clone(),
            row: self.row,
            message,
        })?;
        let value = encode_row(&self.schema, row);
        serde_json::to_writer(&mut self.writer, &value)?;
        self.writer.write_all(b"\n")?;
        self.row += 1;
        Ok(())
    }

    fn finish(&mut self) -> StoreResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn encode_row(schema: &TableSchema, row: &[CellValue]) -> Value {
    let mut object = Map::with_capacity(schema.columns.len());
    for (column, cell) in schema.columns.iter().zip(row) {
        let encoded = match cell {
            CellValue::Scalar(s) => encode_scalar(s),
            CellValue::Array(values) => Value::Array(values.iter().map(encode_scalar).collect()),
        };
        object.insert(column.name.clone(), encoded);
    }
    Value::Object(object)
}

fn encode_scalar(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int(i) => Value::Number((*i).into()),
        Scalar::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Scalar::Str(s) => Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnSpec;

    fn schema(name: &str) -> TableSchema {
        TableSchema::new(
            name,
            vec![
                ColumnSpec::scalar("n", ScalarKind::Int),
                ColumnSpec::array("P", ScalarKind::Float, "n"),
                ColumnSpec::scalar("tag", ScalarKind::Str),
            ],
        )
        .unwrap()
    }

    fn rows() -> Vec<Row> {
        vec![
            vec![
                CellValue::Scalar(Scalar::Int(2)),
                CellValue::Array(vec![Scalar::Float(1.5), Scalar::Float(f64::NAN)]),
                CellValue::Scalar(Scalar::Str("a".into())),
            ],
            vec![
                CellValue::Scalar(Scalar::Int(0)),
                CellValue::Array(vec![]),
                CellValue::Scalar(Scalar::Str("b".into())),
            ],
        ]
    }

    fn write_table(store: &mut JsonlStore, name: &str) {
        let schema = schema(name);
        let mut sink = store.create_table(&schema).unwrap();
        for row in rows() {
            sink.append(&row).unwrap();
        }
        sink.finish().unwrap();
    }

    #[test]
    fn test_round_trip_with_nan() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::create(dir.path()).unwrap();
        write_table(&mut store, "DecayTree");

        let store = JsonlStore::open(dir.path()).unwrap();
        let mut source = store.open_table("DecayTree").unwrap();
        assert_eq!(source.schema(), &schema("DecayTree"));

        let first = source.next_event().unwrap().unwrap();
        match &first[1] {
            CellValue::Array(values) => {
                assert_eq!(values[0], Scalar::Float(1.5));
                assert!(matches!(values[1], Scalar::Float(f) if f.is_nan()));
            }
            other => panic!("expected array, got {other:?}"),
        }
        assert_eq!(source.next_event().unwrap(), Some(rows()[1].clone()));
        assert_eq!(source.next_event().unwrap(), None);
    }

    #[test]
    fn test_nested_table_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::create(dir.path()).unwrap();
        write_table(&mut store, "inclusive_Jpsi/DecayTree");
        write_table(&mut store, "TupleB0/DecayTree");

        assert_eq!(
            store.table_names(),
            vec!["TupleB0/DecayTree".to_string(), "inclusive_Jpsi/DecayTree".to_string()]
        );
        assert!(store.open_table("inclusive_Jpsi/DecayTree").is_ok());
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::create(dir.path()).unwrap();
        assert!(matches!(
            store.open_table("nope").err(),
            Some(StoreError::MissingTable(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_escaping_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::create(dir.path()).unwrap();
        assert!(matches!(
            store.open_table("../outside").err(),
            Some(StoreError::InvalidTable(_))
        ));
        assert!(matches!(store.open_table("").err(), Some(StoreError::InvalidTable(_))));
    }

    #[test]
    fn test_corrupt_row_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlStore::create(dir.path()).unwrap();
        write_table(&mut store, "t");

        // Tack a malformed line onto the file.
        let path = dir.path().join("t.jsonl");
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{\"n\": \"not an int\", \"P\": [], \"tag\": \"c\"}\n");
        fs::write(&path, content).unwrap();

        let mut source = store.open_table("t").unwrap();
        source.next_event().unwrap();
        source.next_event().unwrap();
        let err = source.next_event().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { row: 3, .. }));
    }

    #[test]
    fn test_open_missing_directory() {
        assert!(JsonlStore::open("/definitely/not/here").is_err());
    }
}
