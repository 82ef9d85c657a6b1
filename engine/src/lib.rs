//! # Arbor - streaming transformation engine for columnar event tables
//!
//! Arbor declares copy/flatten/best-choice jobs against tables of named,
//! typed branches - some scalar per event, some jagged arrays sharing a
//! length column - and replays them event by event into destination tables,
//! never holding more than one event in memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ Input store │────▶│  Pattern +   │────▶│    Row       │────▶│ Output store│
//! │ (streamed)  │     │  formula     │     │ transformer  │     │ (appended)  │
//! │             │     │  resolution  │     │ (per event)  │     │             │
//! └─────────────┘     └──────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use arbor::Session;
//!
//! let mut session = Session::open("run2018.tables")?;
//! session.add_formula("B0_PT", "sqrt(#B0_PX**2 + #B0_PY**2)");
//! session.best_choice("DecayTree", "BestPV", "*", "B0_Fit*", "#B0_PT > 500")?;
//! let report = session.run("run2018_best.tables")?;
//! println!("{}", report.summary());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - layered error types
//! - [`model`] - columns, schemas, cell values
//! - [`pattern`] - wildcard/regex hybrid branch selection
//! - [`formula`] - derived columns and cut expressions
//! - [`transform`] - jobs, leaf groups, the per-event core
//! - [`session`] - job queue, executor, spec files
//! - [`store`] - table container traits and backends
//! - [`logs`] - leveled progress logging

// Core modules
pub mod error;
pub mod model;

// Selection and expressions
pub mod formula;
pub mod pattern;

// Transformation
pub mod transform;

// Execution
pub mod session;

// Containers
pub mod store;

// Logging
pub mod logs;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    DeclareError,
    EventError,
    FormulaError,
    JobError,
    PatternError,
    ResolveError,
    RunError,
    SchemaError,
    StoreError,
};

// =============================================================================
// Re-exports - Model
// =============================================================================

pub use model::{CellValue, ColumnKind, ColumnSpec, Row, Scalar, ScalarKind, TableSchema};

// =============================================================================
// Re-exports - Selection and formulas
// =============================================================================

pub use formula::{Cut, FormulaRegistry};
pub use pattern::{Pattern, Selection};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{Job, JobMode, LeafGroup, RowTransformer};

// =============================================================================
// Re-exports - Session
// =============================================================================

pub use session::spec::{example_spec, FormulaSpec, JobSpec, SessionSpec};
pub use session::{JobOutcome, RunReport, Session};

// =============================================================================
// Re-exports - Stores
// =============================================================================

pub use store::{EventSink, EventSource, InputStore, JsonlStore, MemoryStore, OutputStore};
