//! Formula registry: declaration, reference binding and per-row evaluation.
//!
//! Formulas are declared in order and may reference raw columns or any
//! formula declared strictly earlier. References are bound lazily per job:
//! only the formulas a job actually needs (matched by its selection or
//! referenced from its cut) are resolved, and each bound formula evaluates
//! at most once per output row thanks to a per-row cache.

use crate::error::{DeclareError, DeclareResult, ResolveError, ResolveResult};
use crate::model::{CellValue, ColumnKind, TableSchema};

use super::parser::{self, BinaryOp, Expr, ParsedExpr, UnaryOp};

// =============================================================================
// Cut expressions
// =============================================================================

/// A composite row-filter expression, possibly AND-joined from a list.
/// An empty cut keeps every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cut(String);

impl Cut {
    /// Keep every row.
    pub fn none() -> Self {
        Cut(String::new())
    }

    /// AND-join a list of boolean expressions into one composite cut.
    pub fn all_of<I, S>(cuts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = cuts.into_iter().map(Into::into).collect();
        match parts.len() {
            0 => Cut::none(),
            1 => Cut(parts.into_iter().next().unwrap_or_default()),
            _ => Cut(format!("(({}))", parts.join(")&&("))),
        }
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Cut {
    fn from(value: &str) -> Self {
        Cut(value.to_string())
    }
}

impl From<String> for Cut {
    fn from(value: String) -> Self {
        Cut(value)
    }
}

impl From<Vec<String>> for Cut {
    fn from(value: Vec<String>) -> Self {
        Cut::all_of(value)
    }
}

impl From<Vec<&str>> for Cut {
    fn from(value: Vec<&str>) -> Self {
        Cut::all_of(value)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// A declared derived column.
#[derive(Debug, Clone)]
pub struct FormulaDefinition {
    pub name: String,
    pub expression: String,
    ast: ParsedExpr,
}

impl FormulaDefinition {
    pub fn ast(&self) -> &ParsedExpr {
        &self.ast
    }
}

/// Ordered, append-only store of formula definitions. Owned by the session;
/// reset clears it together with the job queue.
#[derive(Debug, Clone, Default)]
pub struct FormulaRegistry {
    formulas: Vec<FormulaDefinition>,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a formula. The expression is parsed here, so syntax errors
    /// are reported immediately and never reach execution.
    pub fn declare(&mut self, name: &str, expression: &str) -> DeclareResult<()> {
        if !parser::is_identifier(name) {
            return Err(DeclareError::InvalidFormulaName(name.to_string()));
        }
        if self.get(name).is_some() {
            return Err(DeclareError::DuplicateFormula(name.to_string()));
        }
        let ast = parser::parse(expression)?;
        self.formulas.push(FormulaDefinition {
            name: name.to_string(),
            expression: expression.to_string(),
            ast,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Declaration-ordered formula names; these participate in pattern
    /// matching as derived columns.
    pub fn names(&self) -> Vec<&str> {
        self.formulas.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn definitions(&self) -> &[FormulaDefinition] {
        &self.formulas
    }

    /// Find a formula by name with its declaration index.
    pub fn get(&self, name: &str) -> Option<(usize, &FormulaDefinition)> {
        self.formulas
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
    }

    pub fn reset(&mut self) {
        self.formulas.clear();
    }
}

// =============================================================================
// Binding
// =============================================================================

/// A resolved expression reference: a source-column position or a slot in
/// the job's bound formula set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Column(usize),
    Formula(usize),
}

/// An expression with every reference resolved.
pub type BoundExpr = Expr<Binding>;

/// Resolves expression references against one source schema and the
/// registry, binding only the formulas that are actually reachable.
pub struct Binder<'a> {
    registry: &'a FormulaRegistry,
    schema: &'a TableSchema,
    slots: Vec<Option<usize>>,
    exprs: Vec<BoundExpr>,
    names: Vec<String>,
}

impl<'a> Binder<'a> {
    pub fn new(registry: &'a FormulaRegistry, schema: &'a TableSchema) -> Self {
        Self {
            registry,
            schema,
            slots: vec![None; registry.len()],
            exprs: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Bind the formula at `index`, pulling in its dependencies first.
    /// Returns the slot it occupies in the resulting [`FormulaSet`].
    pub fn bind_formula(&mut self, index: usize) -> ResolveResult<usize> {
        if let Some(slot) = self.slots[index] {
            return Ok(slot);
        }
        let registry = self.registry;
        let def = &registry.formulas[index];
        // Forward-referencing only: this formula sees formulas declared
        // strictly before it.
        let bound = self.bind(def.ast(), &def.name, index)?;
        let slot = self.exprs.len();
        self.exprs.push(bound);
        self.names.push(def.name.clone());
        self.slots[index] = Some(slot);
        Ok(slot)
    }

    /// Bind a free-standing expression (a cut) that sees the whole registry.
    pub fn bind_cut(&mut self, ast: &ParsedExpr) -> ResolveResult<BoundExpr> {
        self.bind(ast, "cut", self.registry.len())
    }

    fn bind(&mut self, ast: &ParsedExpr, context: &str, limit: usize) -> ResolveResult<BoundExpr> {
        ast.map_refs(&mut |name: &String| self.resolve_ref(name, context, limit))
    }

    fn resolve_ref(&mut self, name: &str, context: &str, limit: usize) -> ResolveResult<Binding> {
        // Formulas shadow raw columns, but only once declared (visible).
        if let Some((index, _)) = self.registry.get(name) {
            if index < limit {
                let slot = self.bind_formula(index)?;
                return Ok(Binding::Formula(slot));
            }
        }
        if let Some(column_index) = self.schema.index_of(name) {
            let column = &self.schema.columns[column_index];
            return match &column.kind {
                ColumnKind::Array { .. } => Err(ResolveError::TypeMismatch {
                    name: name.to_string(),
                    context: context.to_string(),
                    kind: "array".to_string(),
                }),
                ColumnKind::Str => Err(ResolveError::TypeMismatch {
                    name: name.to_string(),
                    context: context.to_string(),
                    kind: "str".to_string(),
                }),
                _ => Ok(Binding::Column(column_index)),
            };
        }
        Err(ResolveError::UnresolvedReference {
            name: name.to_string(),
            context: context.to_string(),
        })
    }

    pub fn finish(self) -> FormulaSet {
        FormulaSet { exprs: self.exprs, names: self.names }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// The formulas one job needs, bound and ready for per-row evaluation.
#[derive(Debug, Clone, Default)]
pub struct FormulaSet {
    exprs: Vec<BoundExpr>,
    names: Vec<String>,
}

impl FormulaSet {
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn name(&self, slot: usize) -> &str {
        &self.names[slot]
    }

    /// Fresh per-row memoization cache.
    pub fn new_cache(&self) -> Vec<Option<f64>> {
        vec![None; self.exprs.len()]
    }

    /// Evaluate one bound formula for the current row, memoized.
    pub fn eval_slot(&self, slot: usize, row: &[CellValue], cache: &mut Vec<Option<f64>>) -> f64 {
        if let Some(value) = cache[slot] {
            return value;
        }
        let value = eval_expr(&self.exprs[slot], row, self, cache);
        cache[slot] = Some(value);
        value
    }
}

/// Truthiness of a cut/logical value: non-zero and not NaN.
pub fn truthy(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

/// Evaluate a bound expression against the current row. All arithmetic is
/// f64; non-finite results propagate as values.
pub fn eval_expr(
    expr: &BoundExpr,
    row: &[CellValue],
    formulas: &FormulaSet,
    cache: &mut Vec<Option<f64>>,
) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Ref(Binding::Column(index)) => row[*index]
            .as_scalar()
            .and_then(|s| s.as_f64())
            // Resolution only binds numeric scalar columns.
            .unwrap_or(f64::NAN),
        Expr::Ref(Binding::Formula(slot)) => formulas.eval_slot(*slot, row, cache),
        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, row, formulas, cache);
            match op {
                UnaryOp::Neg => -v,
                UnaryOp::Not => bool_value(!truthy(v)),
            }
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let a = eval_expr(lhs, row, formulas, cache);
            if !truthy(a) {
                return 0.0;
            }
            bool_value(truthy(eval_expr(rhs, row, formulas, cache)))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let a = eval_expr(lhs, row, formulas, cache);
            if truthy(a) {
                return 1.0;
            }
            bool_value(truthy(eval_expr(rhs, row, formulas, cache)))
        }
        Expr::Binary(op, lhs, rhs) => {
            let a = eval_expr(lhs, row, formulas, cache);
            let b = eval_expr(rhs, row, formulas, cache);
            match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                BinaryOp::Pow => a.powf(b),
                BinaryOp::Eq => bool_value(a == b),
                BinaryOp::Ne => bool_value(a != b),
                BinaryOp::Lt => bool_value(a < b),
                BinaryOp::Le => bool_value(a <= b),
                BinaryOp::Gt => bool_value(a > b),
                BinaryOp::Ge => bool_value(a >= b),
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }
        Expr::Call(func, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, row, formulas, cache));
            }
            func.eval(&values)
        }
    }
}

fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
