//! Branch-selection patterns.
//!
//! Selections use a wildcard/regex hybrid matched against whole branch
//! names, case-sensitively:
//!
//! - `(...)`-wrapped patterns are taken as raw regular expressions.
//! - Otherwise every `*` matches any character sequence (shell-glob style)
//!   while the remaining characters keep their regex meaning, so
//!   `B0_Fit*` and `B[01]_P[XYZ]` both work.
//! - Anything else selects a single branch by name.
//!
//! Callers may pass a list of patterns; lists are OR-joined into one
//! composite pattern before compilation.

use regex::Regex;

use crate::error::{PatternError, PatternResult};
use crate::model::TableSchema;

// =============================================================================
// Selection
// =============================================================================

/// A composite branch-selection pattern, possibly OR-joined from a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection(String);

impl Selection {
    /// Select every branch.
    pub fn all() -> Self {
        Selection("*".to_string())
    }

    /// Select nothing.
    pub fn none() -> Self {
        Selection(String::new())
    }

    /// OR-join a list of patterns into one composite selection.
    pub fn any_of<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = patterns.into_iter().map(Into::into).collect();
        match parts.len() {
            0 => Selection::none(),
            1 => Selection(parts.into_iter().next().unwrap_or_default()),
            _ => Selection(format!("(({}))", parts.join(")|("))),
        }
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Selection {
    fn from(value: &str) -> Self {
        Selection(value.to_string())
    }
}

impl From<String> for Selection {
    fn from(value: String) -> Self {
        Selection(value)
    }
}

impl From<Vec<String>> for Selection {
    fn from(value: Vec<String>) -> Self {
        Selection::any_of(value)
    }
}

impl From<Vec<&str>> for Selection {
    fn from(value: Vec<&str>) -> Self {
        Selection::any_of(value)
    }
}

// =============================================================================
// Compiled pattern
// =============================================================================

/// A compiled selection. An empty selection matches nothing.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: Option<Regex>,
}

impl Pattern {
    /// Compile a selection. Fails with [`PatternError::Syntax`] when the
    /// hybrid syntax does not translate to a valid regular expression.
    pub fn compile(selection: &Selection) -> PatternResult<Pattern> {
        // Whitespace is insignificant in selections.
        let stripped: String = selection.raw().chars().filter(|c| !c.is_whitespace()).collect();
        if stripped.is_empty() {
            return Ok(Pattern { raw: stripped, regex: None });
        }
        let translated = translate(&stripped);
        let regex = Regex::new(&translated).map_err(|e| PatternError::Syntax {
            pattern: stripped.clone(),
            message: e.to_string(),
        })?;
        Ok(Pattern { raw: stripped, regex: Some(regex) })
    }

    /// The pattern text after whitespace stripping.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whole-name match against a single branch name.
    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(name),
            None => false,
        }
    }

    /// Resolve this pattern against a table schema plus the ordered list of
    /// derived (formula) column names.
    ///
    /// Returns matched raw-column indices in schema order, then matched
    /// derived-column indices in declaration order. A derived column shadows
    /// a raw column of the same name.
    pub fn resolve(&self, schema: &TableSchema, derived: &[&str]) -> (Vec<usize>, Vec<usize>) {
        let columns = schema
            .columns
            .iter()
            .enumerate()
            .filter(|(_, col)| !derived.contains(&col.name.as_str()))
            .filter(|(_, col)| self.matches(&col.name))
            .map(|(i, _)| i)
            .collect();
        let formulas = derived
            .iter()
            .enumerate()
            .filter(|(_, name)| self.matches(name))
            .map(|(i, _)| i)
            .collect();
        (columns, formulas)
    }
}

/// Translate the hybrid syntax into an anchored regular expression.
fn translate(stripped: &str) -> String {
    let body = if stripped.len() >= 2 && stripped.starts_with('(') && stripped.ends_with(')') {
        // User entered a raw regex.
        stripped.to_string()
    } else if stripped.contains('*') {
        // Wildcard selection: '*' matches any sequence, the rest stays regex.
        let mut body = String::with_capacity(stripped.len() + 8);
        for c in stripped.chars() {
            if c == '*' {
                body.push_str(".*");
            } else {
                body.push(c);
            }
        }
        body
    } else {
        // Single-branch selection.
        stripped.to_string()
    };
    format!("^(?:{})$", body)
}
