//! Leaf groups: jagged columns that must share a per-event length.
//!
//! Columns targeted by a flatten or best-choice job are grouped by their
//! declared length column. Lengths are only known once data is read, so
//! group membership is fixed at resolution time while length agreement is
//! checked per event.

use crate::error::{EventError, ResolveError, ResolveResult};
use crate::model::{CellValue, TableSchema};

/// A set of array columns sharing one length column.
#[derive(Debug, Clone)]
pub struct LeafGroup {
    /// Name of the shared length column.
    pub length_column: String,
    /// Schema position of the length column.
    pub length_index: usize,
    /// Schema positions of the member array columns.
    pub members: Vec<usize>,
    /// Member names, aligned with `members`, for error reporting.
    pub member_names: Vec<String>,
}

impl LeafGroup {
    /// Common length of this group for one event.
    ///
    /// Reads the length column and verifies every member's actual array
    /// length agrees with it. Disagreement is fatal for the running job.
    pub fn common_length(&self, event: u64, row: &[CellValue]) -> Result<usize, EventError> {
        let declared = row[self.length_index]
            .as_scalar()
            .and_then(|s| s.as_i64())
            .unwrap_or(-1);
        if declared < 0 {
            return Err(EventError::BadLengthValue {
                event,
                column: self.length_column.clone(),
                value: declared,
            });
        }
        let expected = declared as usize;

        let lengths: Vec<usize> = self
            .members
            .iter()
            .map(|&i| row[i].as_array().map(<[_]>::len).unwrap_or(0))
            .collect();
        if lengths.iter().any(|&l| l != expected) {
            return Err(EventError::LengthMismatch {
                event,
                length_column: self.length_column.clone(),
                expected,
                columns: self.member_names.clone(),
                lengths,
            });
        }
        Ok(expected)
    }
}

/// Group targeted array columns by their declared length column. Order of
/// the returned groups follows the first appearance of each length column
/// in `targets` (which itself follows schema order).
pub fn resolve_groups(schema: &TableSchema, targets: &[usize]) -> ResolveResult<Vec<LeafGroup>> {
    let mut groups: Vec<LeafGroup> = Vec::new();
    for &index in targets {
        let column = &schema.columns[index];
        let length_column = column.kind.length_column().ok_or_else(|| {
            ResolveError::MissingLengthColumn { column: column.name.clone() }
        })?;
        let length_index = schema.index_of(length_column).ok_or_else(|| {
            ResolveError::MissingLengthColumn { column: column.name.clone() }
        })?;
        match groups.iter_mut().find(|g| g.length_column == length_column) {
            Some(group) => {
                group.members.push(index);
                group.member_names.push(column.name.clone());
            }
            None => groups.push(LeafGroup {
                length_column: length_column.to_string(),
                length_index,
                members: vec![index],
                member_names: vec![column.name.clone()],
            }),
        }
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSpec, Row, Scalar, ScalarKind};

    fn schema() -> TableSchema {
        TableSchema::new(
            "t",
            vec![
                ColumnSpec::scalar("n", ScalarKind::Int),
                ColumnSpec::scalar("m", ScalarKind::Int),
                ColumnSpec::array("P", ScalarKind::Float, "n"),
                ColumnSpec::array("Q", ScalarKind::Float, "n"),
                ColumnSpec::array("R", ScalarKind::Int, "m"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_grouping_by_length_column() {
        let schema = schema();
        let groups = resolve_groups(&schema, &[2, 3, 4]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].length_column, "n");
        assert_eq!(groups[0].members, vec![2, 3]);
        assert_eq!(groups[1].length_column, "m");
        assert_eq!(groups[1].members, vec![4]);
    }

    #[test]
    fn test_missing_length_column() {
        let schema = TableSchema::new(
            "t",
            vec![ColumnSpec::new(
                "P",
                crate::model::ColumnKind::Array { item: ScalarKind::Float, length_column: None },
            )],
        )
        .unwrap();
        let err = resolve_groups(&schema, &[0]).unwrap_err();
        assert!(matches!(err, ResolveError::MissingLengthColumn { column } if column == "P"));
    }

    #[test]
    fn test_common_length_agreement() {
        let schema = schema();
        let groups = resolve_groups(&schema, &[2, 3]).unwrap();
        let row: Row = vec![
            CellValue::Scalar(Scalar::Int(2)),
            CellValue::Scalar(Scalar::Int(0)),
            CellValue::Array(vec![Scalar::Float(1.0), Scalar::Float(2.0)]),
            CellValue::Array(vec![Scalar::Float(3.0), Scalar::Float(4.0)]),
            CellValue::Array(vec![]),
        ];
        assert_eq!(groups[0].common_length(0, &row).unwrap(), 2);
    }

    #[test]
    fn test_length_mismatch_reports_details() {
        let schema = schema();
        let groups = resolve_groups(&schema, &[2, 3]).unwrap();
        let row: Row = vec![
            CellValue::Scalar(Scalar::Int(2)),
            CellValue::Scalar(Scalar::Int(0)),
            CellValue::Array(vec![Scalar::Float(1.0), Scalar::Float(2.0)]),
            CellValue::Array(vec![Scalar::Float(3.0)]),
            CellValue::Array(vec![]),
        ];
        let err = groups[0].common_length(5, &row).unwrap_err();
        match err {
            EventError::LengthMismatch { event, length_column, expected, columns, lengths } => {
                assert_eq!(event, 5);
                assert_eq!(length_column, "n");
                assert_eq!(expected, 2);
                assert_eq!(columns, vec!["P".to_string(), "Q".to_string()]);
                assert_eq!(lengths, vec![2, 1]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_length_value() {
        let schema = schema();
        let groups = resolve_groups(&schema, &[2]).unwrap();
        let row: Row = vec![
            CellValue::Scalar(Scalar::Int(-3)),
            CellValue::Scalar(Scalar::Int(0)),
            CellValue::Array(vec![]),
            CellValue::Array(vec![]),
            CellValue::Array(vec![]),
        ];
        assert!(matches!(
            groups[0].common_length(0, &row),
            Err(EventError::BadLengthValue { value: -3, .. })
        ));
    }
}
