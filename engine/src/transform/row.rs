//! The per-event core: resolved jobs and row emission.
//!
//! A [`RowTransformer`] is a job resolved against one source schema: the
//! output column plan, the leaf groups, the bound cut and the bound formula
//! set. Resolution happens once per job per run; `transform` then turns
//! each input event into zero or more output rows.

use crate::error::{EventError, ResolveError, ResolveResult};
use crate::formula::{eval_expr, truthy, Binder, BoundExpr, FormulaRegistry, FormulaSet};
use crate::model::{CellValue, ColumnKind, ColumnSpec, Row, Scalar, ScalarKind, TableSchema};

use super::groups::{resolve_groups, LeafGroup};
use super::job::{Job, JobMode};

/// How one output column gets its value.
#[derive(Debug, Clone)]
enum OutputColumn {
    /// Copy the source cell unchanged.
    Passthrough(usize),
    /// Project one element of a targeted jagged column as a scalar.
    Element { column: usize, item: ScalarKind },
    /// Evaluate a bound formula.
    Formula { slot: usize },
}

/// Mode with its resolution products.
#[derive(Debug, Clone)]
enum ResolvedMode {
    Copy,
    Flatten { group: LeafGroup },
    BestChoice { groups: Vec<LeafGroup> },
}

/// A job bound to a concrete source schema, ready to stream events.
#[derive(Debug)]
pub struct RowTransformer {
    mode: ResolvedMode,
    cut: Option<BoundExpr>,
    formulas: FormulaSet,
    columns: Vec<OutputColumn>,
    output_schema: TableSchema,
    cache: Vec<Option<f64>>,
}

impl RowTransformer {
    /// Resolve a declared job against the source schema and the session's
    /// formula registry.
    pub fn resolve(
        job: &Job,
        schema: &TableSchema,
        registry: &FormulaRegistry,
    ) -> ResolveResult<RowTransformer> {
        let derived = registry.names();
        let (matched_columns, matched_formulas) = job.branches.resolve(schema, &derived);

        // Resolve the targeted jagged columns for exploding/projecting modes.
        let (mode, targeted) = match &job.mode {
            JobMode::Copy => (ResolvedMode::Copy, Vec::new()),
            JobMode::Flatten { targets } => {
                let targeted = array_targets(targets, schema)?;
                let mut groups = resolve_groups(schema, &targeted)?;
                if groups.len() > 1 {
                    return Err(ResolveError::MixedLengthColumns(
                        groups.into_iter().map(|g| g.length_column).collect(),
                    ));
                }
                let group = groups.pop().ok_or(ResolveError::NoArrayTargets)?;
                (ResolvedMode::Flatten { group }, targeted)
            }
            JobMode::BestChoice { targets } => {
                let targeted = array_targets(targets, schema)?;
                let groups = resolve_groups(schema, &targeted)?;
                (ResolvedMode::BestChoice { groups }, targeted)
            }
        };

        let mut binder = Binder::new(registry, schema);
        let cut = match &job.cut {
            Some(parsed) => Some(binder.bind_cut(&parsed.ast)?),
            None => None,
        };

        // Output plan: matched raw columns in schema order, then matched
        // derived columns in declaration order.
        let matched_names: Vec<&str> =
            matched_columns.iter().map(|&i| schema.columns[i].name.as_str()).collect();
        let mut columns = Vec::with_capacity(matched_columns.len() + matched_formulas.len());
        let mut specs = Vec::with_capacity(columns.capacity());
        for &index in &matched_columns {
            let column = &schema.columns[index];
            match &column.kind {
                ColumnKind::Array { item, .. } if targeted.contains(&index) => {
                    columns.push(OutputColumn::Element { column: index, item: *item });
                    specs.push(ColumnSpec::scalar(column.name.clone(), *item));
                }
                ColumnKind::Array { item, length_column } => {
                    columns.push(OutputColumn::Passthrough(index));
                    // The length value is carried by the array itself; keep
                    // the reference only when the length column is emitted.
                    let length_column = length_column
                        .as_deref()
                        .filter(|name| matched_names.contains(name))
                        .map(str::to_string);
                    specs.push(ColumnSpec::new(
                        column.name.clone(),
                        ColumnKind::Array { item: *item, length_column },
                    ));
                }
                _ => {
                    columns.push(OutputColumn::Passthrough(index));
                    specs.push(column.clone());
                }
            }
        }
        for &formula_index in &matched_formulas {
            let slot = binder.bind_formula(formula_index)?;
            columns.push(OutputColumn::Formula { slot });
            specs.push(ColumnSpec::scalar(derived[formula_index].to_string(), ScalarKind::Float));
        }

        let output_schema = TableSchema::new(job.dest.clone(), specs)?;
        let formulas = binder.finish();
        let cache = formulas.new_cache();

        Ok(RowTransformer { mode, cut, formulas, columns, output_schema, cache })
    }

    /// Schema of the destination table.
    pub fn output_schema(&self) -> &TableSchema {
        &self.output_schema
    }

    /// Transform one input event into zero or more output rows, appended to
    /// `out` (cleared first).
    pub fn transform(
        &mut self,
        event: u64,
        row: &[CellValue],
        out: &mut Vec<Row>,
    ) -> Result<(), EventError> {
        out.clear();
        self.cache.clear();
        self.cache.resize(self.formulas.len(), None);

        // The cut runs once per source event, before any explosion, in
        // whole-array context.
        if let Some(cut) = &self.cut {
            if !truthy(eval_expr(cut, row, &self.formulas, &mut self.cache)) {
                return Ok(());
            }
        }

        match &self.mode {
            ResolvedMode::Copy => {
                out.push(emit(&self.columns, &self.formulas, row, 0, &mut self.cache));
            }
            ResolvedMode::Flatten { group } => {
                let n = group.common_length(event, row)?;
                for index in 0..n {
                    out.push(emit(&self.columns, &self.formulas, row, index, &mut self.cache));
                }
            }
            ResolvedMode::BestChoice { groups } => {
                for group in groups {
                    group.common_length(event, row)?;
                }
                out.push(emit(&self.columns, &self.formulas, row, 0, &mut self.cache));
            }
        }
        Ok(())
    }
}

/// Array columns matched by a target pattern. Scalar matches are ignored;
/// matching no array at all is an error.
fn array_targets(targets: &crate::pattern::Pattern, schema: &TableSchema) -> ResolveResult<Vec<usize>> {
    let (matched, _) = targets.resolve(schema, &[]);
    let targeted: Vec<usize> = matched
        .into_iter()
        .filter(|&i| schema.columns[i].kind.is_array())
        .collect();
    if targeted.is_empty() {
        return Err(ResolveError::NoArrayTargets);
    }
    Ok(targeted)
}

/// Build one output row. `index` selects the element of targeted jagged
/// columns; an out-of-range index (empty array under best-choice) emits the
/// item kind's missing sentinel.
fn emit(
    columns: &[OutputColumn],
    formulas: &FormulaSet,
    row: &[CellValue],
    index: usize,
    cache: &mut Vec<Option<f64>>,
) -> Row {
    columns
        .iter()
        .map(|column| match column {
            OutputColumn::Passthrough(i) => row[*i].clone(),
            OutputColumn::Element { column, item } => {
                let value = row[*column]
                    .as_array()
                    .and_then(|values| values.get(index))
                    .cloned()
                    .unwrap_or_else(|| Scalar::missing(*item));
                CellValue::Scalar(value)
            }
            OutputColumn::Formula { slot } => {
                CellValue::Scalar(Scalar::Float(formulas.eval_slot(*slot, row, cache)))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Cut;
    use crate::pattern::Selection;

    /// The jagged fixture from the engine's reference scenarios:
    /// P = [1,2,3], [4], [] with n = [3,1,0] and scalar Q = [10,20,30].
    fn schema() -> TableSchema {
        TableSchema::new(
            "T",
            vec![
                ColumnSpec::scalar("n", ScalarKind::Int),
                ColumnSpec::array("P", ScalarKind::Float, "n"),
                ColumnSpec::scalar("Q", ScalarKind::Float),
            ],
        )
        .unwrap()
    }

    fn events() -> Vec<Row> {
        vec![
            vec![
                CellValue::Scalar(Scalar::Int(3)),
                CellValue::Array(vec![Scalar::Float(1.0), Scalar::Float(2.0), Scalar::Float(3.0)]),
                CellValue::Scalar(Scalar::Float(10.0)),
            ],
            vec![
                CellValue::Scalar(Scalar::Int(1)),
                CellValue::Array(vec![Scalar::Float(4.0)]),
                CellValue::Scalar(Scalar::Float(20.0)),
            ],
            vec![
                CellValue::Scalar(Scalar::Int(0)),
                CellValue::Array(vec![]),
                CellValue::Scalar(Scalar::Float(30.0)),
            ],
        ]
    }

    fn scalar_f(row: &Row, i: usize) -> f64 {
        match &row[i] {
            CellValue::Scalar(s) => s.as_f64().unwrap(),
            other => panic!("expected scalar, got {other:?}"),
        }
    }

    fn run_all(tx: &mut RowTransformer) -> Vec<Row> {
        let mut all = Vec::new();
        let mut out = Vec::new();
        for (i, row) in events().iter().enumerate() {
            tx.transform(i as u64, row, &mut out).unwrap();
            all.append(&mut out);
        }
        all
    }

    #[test]
    fn test_copy_emits_one_row_per_event() {
        let registry = FormulaRegistry::new();
        let job = Job::copy("T", "", &Selection::all(), &Cut::none()).unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        let rows = run_all(&mut tx);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], events()[0]);
        assert_eq!(tx.output_schema().columns.len(), 3);
    }

    #[test]
    fn test_copy_cut_drops_rows() {
        let registry = FormulaRegistry::new();
        let job = Job::copy("T", "", &Selection::all(), &Cut::from("#Q > 15")).unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        let rows = run_all(&mut tx);
        assert_eq!(rows.len(), 2);
        assert_eq!(scalar_f(&rows[0], 2), 20.0);
    }

    #[test]
    fn test_flatten_scenario() {
        let registry = FormulaRegistry::new();
        let job =
            Job::flatten("T", "", &Selection::all(), &Selection::from("P"), &Cut::none()).unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        // P becomes a scalar column in the output.
        assert_eq!(tx.output_schema().column("P").unwrap().kind, ColumnKind::Float);

        let rows = run_all(&mut tx);
        let pairs: Vec<(f64, f64)> =
            rows.iter().map(|r| (scalar_f(r, 2), scalar_f(r, 1))).collect();
        assert_eq!(
            pairs,
            vec![(10.0, 1.0), (10.0, 2.0), (10.0, 3.0), (20.0, 4.0)]
        );
    }

    #[test]
    fn test_best_choice_scenario_with_sentinel() {
        let registry = FormulaRegistry::new();
        let job = Job::best_choice("T", "", &Selection::all(), &Selection::from("P"), &Cut::none())
            .unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        let rows = run_all(&mut tx);
        assert_eq!(rows.len(), 3);
        assert_eq!(scalar_f(&rows[0], 1), 1.0);
        assert_eq!(scalar_f(&rows[1], 1), 4.0);
        // Zero-length group: the projected value is the missing sentinel.
        assert!(scalar_f(&rows[2], 1).is_nan());
        assert_eq!(scalar_f(&rows[2], 2), 30.0);
    }

    #[test]
    fn test_best_choice_scalars_match_copy() {
        let registry = FormulaRegistry::new();
        let copy = Job::copy("T", "", &Selection::from("Q"), &Cut::none()).unwrap();
        let best =
            Job::best_choice("T", "", &Selection::all(), &Selection::from("P"), &Cut::none())
                .unwrap();
        let mut copy_tx = RowTransformer::resolve(&copy, &schema(), &registry).unwrap();
        let mut best_tx = RowTransformer::resolve(&best, &schema(), &registry).unwrap();

        let copy_rows = run_all(&mut copy_tx);
        let best_rows = run_all(&mut best_tx);
        assert_eq!(copy_rows.len(), best_rows.len());
        for (c, b) in copy_rows.iter().zip(&best_rows) {
            assert_eq!(scalar_f(c, 0), scalar_f(b, 2));
        }
    }

    #[test]
    fn test_flatten_length_mismatch_is_event_error() {
        let registry = FormulaRegistry::new();
        let job =
            Job::flatten("T", "", &Selection::all(), &Selection::from("P"), &Cut::none()).unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        let bad: Row = vec![
            CellValue::Scalar(Scalar::Int(2)),
            CellValue::Array(vec![Scalar::Float(1.0)]),
            CellValue::Scalar(Scalar::Float(10.0)),
        ];
        let mut out = Vec::new();
        let err = tx.transform(9, &bad, &mut out).unwrap_err();
        assert!(matches!(err, EventError::LengthMismatch { event: 9, .. }));
    }

    #[test]
    fn test_flatten_targets_must_share_length_column() {
        let schema = TableSchema::new(
            "T",
            vec![
                ColumnSpec::scalar("n", ScalarKind::Int),
                ColumnSpec::scalar("m", ScalarKind::Int),
                ColumnSpec::array("P", ScalarKind::Float, "n"),
                ColumnSpec::array("R", ScalarKind::Float, "m"),
            ],
        )
        .unwrap();
        let registry = FormulaRegistry::new();
        let job =
            Job::flatten("T", "", &Selection::all(), &Selection::from("*"), &Cut::none()).unwrap();
        let err = RowTransformer::resolve(&job, &schema, &registry).unwrap_err();
        assert!(matches!(err, ResolveError::MixedLengthColumns(cols) if cols.len() == 2));
    }

    #[test]
    fn test_targets_matching_no_arrays_is_an_error() {
        let registry = FormulaRegistry::new();
        let job =
            Job::flatten("T", "", &Selection::all(), &Selection::from("Q"), &Cut::none()).unwrap();
        assert!(matches!(
            RowTransformer::resolve(&job, &schema(), &registry),
            Err(ResolveError::NoArrayTargets)
        ));
    }

    #[test]
    fn test_untargeted_array_passes_through_on_flatten() {
        let schema = TableSchema::new(
            "T",
            vec![
                ColumnSpec::scalar("n", ScalarKind::Int),
                ColumnSpec::array("P", ScalarKind::Float, "n"),
                ColumnSpec::array("tags", ScalarKind::Int, "n"),
            ],
        )
        .unwrap();
        let registry = FormulaRegistry::new();
        let job =
            Job::flatten("T", "", &Selection::all(), &Selection::from("P"), &Cut::none()).unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema, &registry).unwrap();

        let row: Row = vec![
            CellValue::Scalar(Scalar::Int(2)),
            CellValue::Array(vec![Scalar::Float(1.0), Scalar::Float(2.0)]),
            CellValue::Array(vec![Scalar::Int(7), Scalar::Int(8)]),
        ];
        let mut out = Vec::new();
        tx.transform(0, &row, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        // The untargeted array keeps its full shape on every exploded row.
        assert_eq!(out[0][2], CellValue::Array(vec![Scalar::Int(7), Scalar::Int(8)]));
        assert_eq!(out[1][2], out[0][2]);
    }

    #[test]
    fn test_array_without_matched_length_column_still_resolves() {
        let registry = FormulaRegistry::new();
        // Select P but not its length column n.
        let job = Job::copy("T", "", &Selection::from("((P|Q))"), &Cut::none()).unwrap();
        let tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        let out_schema = tx.output_schema();
        assert_eq!(out_schema.columns.len(), 2);
        assert!(out_schema.column("n").is_none());
        // The emitted array no longer references the unmatched length column.
        assert_eq!(
            out_schema.column("P").unwrap().kind,
            ColumnKind::Array { item: ScalarKind::Float, length_column: None }
        );
    }

    #[test]
    fn test_formula_columns_in_output() {
        let mut registry = FormulaRegistry::new();
        registry.declare("Q2", "#Q * #Q").unwrap();
        let job = Job::copy("T", "", &Selection::from("Q*"), &Cut::none()).unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        let out_schema = tx.output_schema().clone();
        assert_eq!(out_schema.columns[0].name, "Q");
        assert_eq!(out_schema.columns[1].name, "Q2");
        assert_eq!(out_schema.columns[1].kind, ColumnKind::Float);

        let rows = run_all(&mut tx);
        assert_eq!(scalar_f(&rows[0], 1), 100.0);
        assert_eq!(scalar_f(&rows[2], 1), 900.0);
    }

    #[test]
    fn test_unneeded_broken_formula_does_not_fail_job() {
        let mut registry = FormulaRegistry::new();
        // References a column this table does not have, but nothing in the
        // job needs it, so it is never bound.
        registry.declare("broken", "#missing_column + 1").unwrap();
        let job = Job::copy("T", "", &Selection::from("Q"), &Cut::none()).unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();
        assert_eq!(run_all(&mut tx).len(), 3);
    }

    #[test]
    fn test_cut_may_reference_formulas() {
        let mut registry = FormulaRegistry::new();
        registry.declare("half", "#Q / 2").unwrap();
        let job = Job::copy("T", "", &Selection::all(), &Cut::from("#half >= 10")).unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        let rows = run_all(&mut tx);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_unresolved_cut_reference_fails_resolution() {
        let registry = FormulaRegistry::new();
        let job = Job::copy("T", "", &Selection::all(), &Cut::from("#nope > 0")).unwrap();
        assert!(matches!(
            RowTransformer::resolve(&job, &schema(), &registry),
            Err(ResolveError::UnresolvedReference { name, .. }) if name == "nope"
        ));
    }

    #[test]
    fn test_flatten_cut_runs_pre_explosion() {
        let registry = FormulaRegistry::new();
        let job = Job::flatten(
            "T",
            "",
            &Selection::all(),
            &Selection::from("P"),
            &Cut::from("#n >= 1"),
        )
        .unwrap();
        let mut tx = RowTransformer::resolve(&job, &schema(), &registry).unwrap();

        let rows = run_all(&mut tx);
        // Events 0 and 1 pass (n >= 1) and explode into 3 + 1 rows.
        assert_eq!(rows.len(), 4);
    }
}
