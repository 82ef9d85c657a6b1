//! Error types for the Arbor transformation engine.
//!
//! The hierarchy mirrors the phases a job goes through:
//!
//! - [`SchemaError`] - invalid table schemas
//! - [`PatternError`] - malformed branch-selection patterns
//! - [`FormulaError`] - expression syntax errors
//! - [`DeclareError`] - job/formula declaration failures (job not enqueued)
//! - [`ResolveError`] - first-event resolution failures (references, groups)
//! - [`EventError`] - per-event failures (jagged length disagreement)
//! - [`JobError`] - everything fatal for a single job
//! - [`StoreError`] - table container I/O and decoding
//! - [`RunError`] - failures fatal for a whole `run` call
//!
//! Error conversion is automatic via `From` implementations, allowing `?`
//! to work across phase boundaries. Non-finite arithmetic results are never
//! errors; they propagate as values.

use thiserror::Error;

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors in a table schema definition.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// Two columns share a name.
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    /// An array column points at a length column that does not exist.
    #[error("Array column '{column}' references unknown length column '{length_column}'")]
    UnknownLengthColumn { column: String, length_column: String },

    /// An array column points at a length column of the wrong kind.
    #[error("Length column '{length_column}' of array column '{column}' must be a scalar integer")]
    BadLengthColumn { column: String, length_column: String },
}

// =============================================================================
// Pattern Errors
// =============================================================================

/// Errors while compiling a branch-selection pattern.
#[derive(Debug, Clone, Error)]
pub enum PatternError {
    /// The pattern does not compile to a valid regular expression.
    #[error("Invalid selection pattern '{pattern}': {message}")]
    Syntax { pattern: String, message: String },
}

// =============================================================================
// Formula Errors
// =============================================================================

/// Errors while parsing a formula or cut expression.
#[derive(Debug, Clone, Error)]
pub enum FormulaError {
    /// Lexical or grammatical error in the expression text.
    #[error("Expression syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    /// A call to a function the expression language does not define.
    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    /// A function called with the wrong number of arguments.
    #[error("Function '{name}' takes {expected} argument(s), got {got}")]
    BadArity { name: String, expected: usize, got: usize },
}

// =============================================================================
// Declaration Errors
// =============================================================================

/// Errors raised while declaring a job or formula. The declaration is
/// rejected and the session queue/registry is left untouched.
#[derive(Debug, Clone, Error)]
pub enum DeclareError {
    /// Branch or target selection failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    /// Formula or cut expression failed to parse.
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    /// A formula with this name already exists in the registry.
    #[error("Formula '{0}' is already declared")]
    DuplicateFormula(String),

    /// Formula names must be plain identifiers.
    #[error("Formula name '{0}' is not a valid identifier")]
    InvalidFormulaName(String),
}

// =============================================================================
// Resolution Errors
// =============================================================================

/// Errors detected when a job is resolved against the source schema,
/// before any event is transformed.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// A `#name` reference matches neither a source column nor a
    /// previously declared formula.
    #[error("Unresolved reference '#{name}' in {context}")]
    UnresolvedReference { name: String, context: String },

    /// A reference points at a column that cannot appear in scalar
    /// arithmetic (string or array column).
    #[error("Reference '#{name}' in {context}: {kind} columns cannot be used in expressions")]
    TypeMismatch { name: String, context: String, kind: String },

    /// A targeted array column carries no length-column declaration.
    #[error("Array column '{column}' has no resolvable length column")]
    MissingLengthColumn { column: String },

    /// Flatten targets must share a single length column.
    #[error("Flatten targets span multiple length columns: {}", .0.join(", "))]
    MixedLengthColumns(Vec<String>),

    /// The flatten/best-choice target pattern matched no array column.
    #[error("Target pattern matched no array columns")]
    NoArrayTargets,

    /// Building the destination schema failed.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

// =============================================================================
// Per-Event Errors
// =============================================================================

/// Errors raised while transforming a single event. Fatal for the current
/// job only; rows written for earlier events stay written.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// Members of a leaf group disagree with their length column.
    #[error(
        "Length mismatch at event {event}: length column '{length_column}' = {expected}, \
         but [{}] observed lengths {:?}",
        .columns.join(", "),
        .lengths
    )]
    LengthMismatch {
        event: u64,
        length_column: String,
        expected: usize,
        columns: Vec<String>,
        lengths: Vec<usize>,
    },

    /// A length column holds a value that cannot be an array length.
    #[error("Event {event}: length column '{column}' holds invalid length {value}")]
    BadLengthValue { event: u64, column: String, value: i64 },
}

// =============================================================================
// Job Errors
// =============================================================================

/// Everything that can abort a single job while the rest of the queue
/// keeps running.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Resolution against the source schema failed.
    #[error("{0}")]
    Resolve(#[from] ResolveError),

    /// An event failed mid-stream.
    #[error("{0}")]
    Event(#[from] EventError),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from a table container backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested table does not exist in the store.
    #[error("Table not found: {0}")]
    MissingTable(String),

    /// A table name that cannot map to a storage location.
    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    /// Undecodable or schema-violating stored data.
    #[error("Table '{table}', row {row}: {message}")]
    Corrupt { table: String, row: u64, message: String },

    /// The stored schema document is invalid.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// JSON encoding/decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Run Errors (top-level)
// =============================================================================

/// Failures fatal for an entire `run` call.
#[derive(Debug, Error)]
pub enum RunError {
    /// Opening, reading or writing a store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// `run` was called without a bound input.
    #[error("No input bound; open an input or call rebind_input first")]
    NoInput,

    /// Batch input and output lists differ in length.
    #[error("Batch length mismatch: {inputs} input(s) vs {outputs} output(s)")]
    BatchMismatch { inputs: usize, outputs: usize },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for schema construction.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for pattern compilation.
pub type PatternResult<T> = Result<T, PatternError>;

/// Result type for expression parsing.
pub type FormulaResult<T> = Result<T, FormulaError>;

/// Result type for declaration calls.
pub type DeclareResult<T> = Result<T, DeclareError>;

/// Result type for job resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for run-level operations.
pub type RunResult<T> = Result<T, RunError>;
