//! Core data model: columns, schemas, cell values and rows.
//!
//! A table is a named, ordered set of typed columns. Scalar columns hold one
//! value per event; array columns hold a variable-length run of scalars per
//! event whose length is tracked by a companion integer column ("jagged"
//! columns). Column order is significant: outputs preserve the source
//! table's declared order.

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

// =============================================================================
// Column kinds
// =============================================================================

/// Element type of a scalar cell or of an array column's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Str,
}

impl ScalarKind {
    /// Whether values of this kind can appear in cut/formula arithmetic.
    pub fn is_numeric(self) -> bool {
        !matches!(self, ScalarKind::Str)
    }

    /// Display name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Str => "str",
        }
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
    Bool,
    Int,
    Float,
    Str,
    /// Variable-length array of scalars. `length_column`, when present,
    /// names the integer column carrying the per-event length.
    Array {
        item: ScalarKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length_column: Option<String>,
    },
}

impl ColumnKind {
    pub fn is_array(&self) -> bool {
        matches!(self, ColumnKind::Array { .. })
    }

    /// The scalar kind for scalar columns, `None` for arrays.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            ColumnKind::Bool => Some(ScalarKind::Bool),
            ColumnKind::Int => Some(ScalarKind::Int),
            ColumnKind::Float => Some(ScalarKind::Float),
            ColumnKind::Str => Some(ScalarKind::Str),
            ColumnKind::Array { .. } => None,
        }
    }

    /// The item kind for array columns, `None` for scalars.
    pub fn item_kind(&self) -> Option<ScalarKind> {
        match self {
            ColumnKind::Array { item, .. } => Some(*item),
            _ => None,
        }
    }

    /// The declared length column for array columns.
    pub fn length_column(&self) -> Option<&str> {
        match self {
            ColumnKind::Array { length_column, .. } => length_column.as_deref(),
            _ => None,
        }
    }
}

/// One named, typed column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self { name: name.into(), kind }
    }

    /// Scalar column shorthand.
    pub fn scalar(name: impl Into<String>, kind: ScalarKind) -> Self {
        let kind = match kind {
            ScalarKind::Bool => ColumnKind::Bool,
            ScalarKind::Int => ColumnKind::Int,
            ScalarKind::Float => ColumnKind::Float,
            ScalarKind::Str => ColumnKind::Str,
        };
        Self::new(name, kind)
    }

    /// Jagged array column shorthand.
    pub fn array(name: impl Into<String>, item: ScalarKind, length_column: impl Into<String>) -> Self {
        Self::new(
            name,
            ColumnKind::Array { item, length_column: Some(length_column.into()) },
        )
    }
}

// =============================================================================
// Table schema
// =============================================================================

/// Named table: ordered column specs. Construction validates that column
/// names are unique and that every declared length column exists and is a
/// scalar integer column of the same table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> SchemaResult<Self> {
        let schema = Self { name: name.into(), columns };
        schema.validate()?;
        Ok(schema)
    }

    /// Check the schema invariants. Called by `new` and by stores after
    /// deserializing a schema document.
    pub fn validate(&self) -> SchemaResult<()> {
        for (i, col) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == col.name) {
                return Err(SchemaError::DuplicateColumn(col.name.clone()));
            }
            if let Some(length_column) = col.kind.length_column() {
                match self.column(length_column) {
                    None => {
                        return Err(SchemaError::UnknownLengthColumn {
                            column: col.name.clone(),
                            length_column: length_column.to_string(),
                        });
                    }
                    Some(len_col) if len_col.kind != ColumnKind::Int => {
                        return Err(SchemaError::BadLengthColumn {
                            column: col.name.clone(),
                            length_column: length_column.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Verify that a row matches this schema in arity and cell kinds.
    /// Returns a human-readable description of the first violation.
    pub fn check_row(&self, row: &[CellValue]) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row has {} cells, schema has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        for (col, cell) in self.columns.iter().zip(row) {
            match (&col.kind, cell) {
                (ColumnKind::Array { item, .. }, CellValue::Array(values)) => {
                    if let Some(bad) = values.iter().find(|v| v.kind() != *item) {
                        return Err(format!(
                            "column '{}': array element {:?} is not {}",
                            col.name,
                            bad,
                            item.name()
                        ));
                    }
                }
                (ColumnKind::Array { .. }, CellValue::Scalar(_)) => {
                    return Err(format!("column '{}': expected array cell", col.name));
                }
                (kind, CellValue::Scalar(value)) => {
                    let expected = kind.scalar_kind().unwrap_or(ScalarKind::Str);
                    if value.kind() != expected {
                        return Err(format!(
                            "column '{}': expected {} scalar, got {}",
                            col.name,
                            expected.name(),
                            value.kind().name()
                        ));
                    }
                }
                (_, CellValue::Array(_)) => {
                    return Err(format!("column '{}': expected scalar cell", col.name));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Values
// =============================================================================

/// One scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::Str(_) => ScalarKind::Str,
        }
    }

    /// The missing-value sentinel emitted by best-choice projection when a
    /// targeted array is empty: NaN for floats, zero-values otherwise.
    pub fn missing(kind: ScalarKind) -> Scalar {
        match kind {
            ScalarKind::Bool => Scalar::Bool(false),
            ScalarKind::Int => Scalar::Int(0),
            ScalarKind::Float => Scalar::Float(f64::NAN),
            ScalarKind::Str => Scalar::Str(String::new()),
        }
    }

    /// Numeric view for expression evaluation. Strings have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Str(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// One cell of a row: a scalar or a jagged-array run.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Scalar(Scalar),
    Array(Vec<Scalar>),
}

impl CellValue {
    pub fn is_array(&self) -> bool {
        matches!(self, CellValue::Array(_))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            CellValue::Scalar(s) => Some(s),
            CellValue::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Scalar]> {
        match self {
            CellValue::Array(values) => Some(values),
            CellValue::Scalar(_) => None,
        }
    }
}

impl From<Scalar> for CellValue {
    fn from(value: Scalar) -> Self {
        CellValue::Scalar(value)
    }
}

/// One event of a table, aligned with the schema's column order.
pub type Row = Vec<CellValue>;
