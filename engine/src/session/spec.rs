//! Session spec files.
//!
//! A spec is a JSON document declaring a reusable session: ordered formulas
//! plus jobs. The CLI loads one and replays it over any number of
//! (input, output) pairs.
//!
//! ```json
//! {
//!   "description": "slim the decay tree",
//!   "formulas": [
//!     { "name": "B0_PT", "expression": "sqrt(#B0_PX**2 + #B0_PY**2)" }
//!   ],
//!   "jobs": [
//!     { "mode": "copy", "source": "DecayTree", "branches": "B0_*" },
//!     { "mode": "flatten", "source": "DecayTree", "dest": "Flat",
//!       "targets": "B0_Fit*", "cut": "#B0_PT > 500" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::DeclareResult;
use crate::formula::Cut;
use crate::pattern::Selection;

use super::Session;

fn default_version() -> String {
    "1.0".to_string()
}

fn default_branches() -> OneOrMany {
    OneOrMany::One("*".to_string())
}

/// A selection or cut given either as one string or as a list. Lists join
/// with OR for branch selections and with AND for cuts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::One(String::new())
    }
}

impl OneOrMany {
    fn to_selection(&self) -> Selection {
        match self {
            OneOrMany::One(s) => Selection::from(s.clone()),
            OneOrMany::Many(parts) => Selection::any_of(parts.clone()),
        }
    }

    fn to_cut(&self) -> Cut {
        match self {
            OneOrMany::One(s) => Cut::from(s.clone()),
            OneOrMany::Many(parts) => Cut::all_of(parts.clone()),
        }
    }
}

/// One formula declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaSpec {
    pub name: String,
    pub expression: String,
}

/// One job declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum JobSpec {
    Copy {
        source: String,
        #[serde(default)]
        dest: String,
        #[serde(default = "default_branches")]
        branches: OneOrMany,
        #[serde(default)]
        cut: OneOrMany,
    },
    Flatten {
        source: String,
        #[serde(default)]
        dest: String,
        #[serde(default = "default_branches")]
        branches: OneOrMany,
        targets: OneOrMany,
        #[serde(default)]
        cut: OneOrMany,
    },
    BestChoice {
        source: String,
        #[serde(default)]
        dest: String,
        #[serde(default = "default_branches")]
        branches: OneOrMany,
        targets: OneOrMany,
        #[serde(default)]
        cut: OneOrMany,
    },
}

/// A complete, replayable session declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSpec {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    /// Formulas in declaration order; later formulas may reference earlier
    /// ones.
    #[serde(default)]
    pub formulas: Vec<FormulaSpec>,

    /// Jobs in execution order.
    pub jobs: Vec<JobSpec>,
}

impl SessionSpec {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Declare everything in this spec into a session, formulas first.
    /// Stops at the first invalid declaration.
    pub fn apply(&self, session: &mut Session) -> DeclareResult<()> {
        for formula in &self.formulas {
            session.add_formula(&formula.name, &formula.expression)?;
        }
        for job in &self.jobs {
            match job {
                JobSpec::Copy { source, dest, branches, cut } => {
                    session.copy(source, dest, branches.to_selection(), cut.to_cut())?;
                }
                JobSpec::Flatten { source, dest, branches, targets, cut } => {
                    session.flatten(
                        source,
                        dest,
                        branches.to_selection(),
                        targets.to_selection(),
                        cut.to_cut(),
                    )?;
                }
                JobSpec::BestChoice { source, dest, branches, targets, cut } => {
                    session.best_choice(
                        source,
                        dest,
                        branches.to_selection(),
                        targets.to_selection(),
                        cut.to_cut(),
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// A documented example spec for `arbor example-spec`.
pub fn example_spec() -> SessionSpec {
    SessionSpec {
        version: default_version(),
        description: "Slim a decay tree and flatten its per-PV fit results".to_string(),
        formulas: vec![
            FormulaSpec {
                name: "B0_PT".to_string(),
                expression: "sqrt(#B0_PX**2 + #B0_PY**2)".to_string(),
            },
            FormulaSpec {
                name: "B0_PT_GEV".to_string(),
                expression: "#B0_PT / 1000".to_string(),
            },
        ],
        jobs: vec![
            JobSpec::Copy {
                source: "DecayTree".to_string(),
                dest: "Slim".to_string(),
                branches: OneOrMany::Many(vec!["B0_*".to_string(), "nPV".to_string()]),
                cut: OneOrMany::One("#B0_PT > 500".to_string()),
            },
            JobSpec::BestChoice {
                source: "DecayTree".to_string(),
                dest: "BestPV".to_string(),
                branches: OneOrMany::One("*".to_string()),
                targets: OneOrMany::One("B0_Fit*".to_string()),
                cut: OneOrMany::One(String::new()),
            },
        ],
    }
}
