//! Job declarations.
//!
//! A job is immutable once declared: source and destination table names, a
//! compiled branch selection, an optional cut and a mode. Pattern and cut
//! syntax are validated here, at declaration time, so a job that reaches
//! the queue can only fail against actual data.

use crate::error::DeclareResult;
use crate::formula::{parse, Cut, ParsedExpr};
use crate::pattern::{Pattern, Selection};

/// What a job does with its targeted jagged columns.
#[derive(Debug, Clone)]
pub enum JobMode {
    /// Emit every selected column unchanged, one row per event.
    Copy,
    /// Explode the targeted jagged columns, one row per array element.
    Flatten { targets: Pattern },
    /// Project index 0 of the targeted jagged columns, one row per event.
    BestChoice { targets: Pattern },
}

impl JobMode {
    pub fn name(&self) -> &'static str {
        match self {
            JobMode::Copy => "copy",
            JobMode::Flatten { .. } => "flatten",
            JobMode::BestChoice { .. } => "best_choice",
        }
    }
}

/// A cut kept both as source text (for reporting) and parsed AST.
#[derive(Debug, Clone)]
pub struct ParsedCut {
    pub raw: String,
    pub ast: ParsedExpr,
}

/// One declared transformation job.
#[derive(Debug, Clone)]
pub struct Job {
    pub source: String,
    pub dest: String,
    pub branches: Pattern,
    pub cut: Option<ParsedCut>,
    pub mode: JobMode,
}

impl Job {
    /// Declare a plain copy job.
    pub fn copy(source: &str, dest: &str, branches: &Selection, cut: &Cut) -> DeclareResult<Job> {
        Self::new(source, dest, branches, cut, JobMode::Copy)
    }

    /// Declare a flatten job exploding the columns matched by `targets`.
    pub fn flatten(
        source: &str,
        dest: &str,
        branches: &Selection,
        targets: &Selection,
        cut: &Cut,
    ) -> DeclareResult<Job> {
        let targets = Pattern::compile(targets)?;
        Self::new(source, dest, branches, cut, JobMode::Flatten { targets })
    }

    /// Declare a best-choice job projecting index 0 of the columns matched
    /// by `targets`.
    pub fn best_choice(
        source: &str,
        dest: &str,
        branches: &Selection,
        targets: &Selection,
        cut: &Cut,
    ) -> DeclareResult<Job> {
        let targets = Pattern::compile(targets)?;
        Self::new(source, dest, branches, cut, JobMode::BestChoice { targets })
    }

    fn new(
        source: &str,
        dest: &str,
        branches: &Selection,
        cut: &Cut,
        mode: JobMode,
    ) -> DeclareResult<Job> {
        let branches = Pattern::compile(branches)?;
        let cut = if cut.is_empty() {
            None
        } else {
            Some(ParsedCut { raw: cut.raw().to_string(), ast: parse(cut.raw())? })
        };
        Ok(Job {
            source: source.to_string(),
            // An empty destination falls back to the source table name.
            dest: if dest.is_empty() { source.to_string() } else { dest.to_string() },
            branches,
            cut,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeclareError;

    #[test]
    fn test_dest_defaults_to_source() {
        let job = Job::copy("DecayTree", "", &Selection::all(), &Cut::none()).unwrap();
        assert_eq!(job.dest, "DecayTree");

        let job = Job::copy("DecayTree", "Slim", &Selection::all(), &Cut::none()).unwrap();
        assert_eq!(job.dest, "Slim");
    }

    #[test]
    fn test_bad_pattern_rejected_at_declaration() {
        let err = Job::copy("t", "", &Selection::from("(["), &Cut::none()).unwrap_err();
        assert!(matches!(err, DeclareError::Pattern(_)));

        let err =
            Job::flatten("t", "", &Selection::all(), &Selection::from("(["), &Cut::none())
                .unwrap_err();
        assert!(matches!(err, DeclareError::Pattern(_)));
    }

    #[test]
    fn test_bad_cut_rejected_at_declaration() {
        let err = Job::copy("t", "", &Selection::all(), &Cut::from("#x >")).unwrap_err();
        assert!(matches!(err, DeclareError::Formula(_)));
    }

    #[test]
    fn test_empty_cut_means_no_filter() {
        let job = Job::copy("t", "", &Selection::all(), &Cut::from("  ")).unwrap();
        assert!(job.cut.is_none());
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(JobMode::Copy.name(), "copy");
        let job = Job::flatten("t", "", &Selection::all(), &Selection::from("P"), &Cut::none())
            .unwrap();
        assert_eq!(job.mode.name(), "flatten");
    }
}
