//! Derived-column formulas and cut expressions.
//!
//! Expressions reference branches and earlier formulas with a `#` marker
//! (`sqrt(#B0_PX**2 + #B0_PY**2)`). Parsing happens at declaration time,
//! reference binding at job resolution time, evaluation once per output
//! row with memoization.

pub mod parser;
pub mod registry;

pub use parser::{parse, BinaryOp, Expr, Func, ParsedExpr, UnaryOp};
pub use registry::{
    eval_expr, truthy, Binder, Binding, BoundExpr, Cut, FormulaDefinition, FormulaRegistry,
    FormulaSet,
};
