//! Session: job queue, formula registry, input binding and the executor.
//!
//! A session accumulates declarations (jobs and formulas), holds the
//! current input binding, and replays the whole queue on every `run`.
//! Rebinding the input does not touch the queue, so one set of
//! declarations can process many files.

pub mod spec;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DeclareResult, JobError, RunError, RunResult, StoreResult};
use crate::formula::{Cut, FormulaRegistry};
use crate::logs::{log_info, log_success, log_warning};
use crate::pattern::Selection;
use crate::store::{InputStore, JsonlStore, OutputStore};
use crate::transform::{Job, JobMode, RowTransformer};

// =============================================================================
// Run reports
// =============================================================================

/// Outcome of one job within a run.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub source: String,
    pub dest: String,
    pub mode: String,
    pub events_read: u64,
    pub rows_written: u64,
    /// Present when the job failed at resolution or mid-stream. Rows
    /// written before a mid-stream failure stay in the destination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    fn new(job: &Job) -> Self {
        Self {
            source: job.source.clone(),
            dest: job.dest.clone(),
            mode: job.mode.name().to_string(),
            events_read: 0,
            rows_written: 0,
            error: None,
        }
    }
}

/// Per-job results of one `run` call.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub jobs: Vec<JobOutcome>,
}

impl RunReport {
    /// Whether every job completed.
    pub fn is_ok(&self) -> bool {
        self.jobs.iter().all(|j| j.error.is_none())
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        let failed = self.jobs.iter().filter(|j| j.error.is_some()).count();
        let rows: u64 = self.jobs.iter().map(|j| j.rows_written).sum();
        format!(
            "{} job(s), {} row(s) written, {} failed",
            self.jobs.len(),
            rows,
            failed
        )
    }
}

// =============================================================================
// Session
// =============================================================================

/// Owns the job queue, the formula registry and the input binding.
///
/// Single-threaded by design: drive a session from one execution context
/// only. Parallel batch processing wants one session per worker.
#[derive(Debug, Default)]
pub struct Session {
    jobs: Vec<Job>,
    formulas: FormulaRegistry,
    input: Option<PathBuf>,
}

impl Session {
    /// A session with no input bound; useful with [`Session::execute`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A session bound to a file-backed input store.
    pub fn open(path: impl AsRef<Path>) -> RunResult<Self> {
        let mut session = Self::new();
        session.rebind_input(path)?;
        Ok(session)
    }

    /// Re-point the session at another input without touching the queue.
    pub fn rebind_input(&mut self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref().to_path_buf();
        // Validate the store opens before accepting the binding.
        JsonlStore::open(&path)?;
        self.input = Some(path);
        Ok(())
    }

    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    /// Declare a copy job. An empty `dest` reuses the source table name.
    pub fn copy(
        &mut self,
        source: &str,
        dest: &str,
        branches: impl Into<Selection>,
        cut: impl Into<Cut>,
    ) -> DeclareResult<()> {
        self.jobs.push(Job::copy(source, dest, &branches.into(), &cut.into())?);
        Ok(())
    }

    /// Declare a flatten job exploding the columns matched by `targets`.
    pub fn flatten(
        &mut self,
        source: &str,
        dest: &str,
        branches: impl Into<Selection>,
        targets: impl Into<Selection>,
        cut: impl Into<Cut>,
    ) -> DeclareResult<()> {
        self.jobs
            .push(Job::flatten(source, dest, &branches.into(), &targets.into(), &cut.into())?);
        Ok(())
    }

    /// Declare a best-choice job projecting index 0 of the columns matched
    /// by `targets`.
    pub fn best_choice(
        &mut self,
        source: &str,
        dest: &str,
        branches: impl Into<Selection>,
        targets: impl Into<Selection>,
        cut: impl Into<Cut>,
    ) -> DeclareResult<()> {
        self.jobs
            .push(Job::best_choice(source, dest, &branches.into(), &targets.into(), &cut.into())?);
        Ok(())
    }

    /// Declare a derived column, visible to every job of subsequent runs.
    pub fn add_formula(&mut self, name: &str, expression: &str) -> DeclareResult<()> {
        self.formulas.declare(name, expression)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn formulas(&self) -> &FormulaRegistry {
        &self.formulas
    }

    /// Clear queued jobs and formulas. The input binding survives.
    pub fn reset(&mut self) {
        self.jobs.clear();
        self.formulas.reset();
    }

    /// Run every queued job against the bound input, writing into a
    /// file-backed store at `output`.
    pub fn run(&self, output: impl AsRef<Path>) -> RunResult<RunReport> {
        let input_path = self.input.as_ref().ok_or(RunError::NoInput)?;
        let input = JsonlStore::open(input_path)?;
        let mut output = JsonlStore::create(output)?;
        self.execute(&input, &mut output)
    }

    /// Run the same queue over many (input, output) pairs.
    pub fn run_batch(
        &mut self,
        inputs: &[PathBuf],
        outputs: &[PathBuf],
    ) -> RunResult<Vec<RunReport>> {
        if inputs.len() != outputs.len() {
            return Err(RunError::BatchMismatch {
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }
        let mut reports = Vec::with_capacity(inputs.len());
        for (input, output) in inputs.iter().zip(outputs) {
            self.rebind_input(input)?;
            reports.push(self.run(output)?);
        }
        Ok(reports)
    }

    /// Store-agnostic core: stream every queued job from `input` into
    /// `output`, one event at a time.
    ///
    /// Store failures abort the whole run. Per-job resolution and
    /// per-event failures mark that job failed in the report; later jobs
    /// still execute.
    pub fn execute(
        &self,
        input: &dyn InputStore,
        output: &mut dyn OutputStore,
    ) -> RunResult<RunReport> {
        let mut report = RunReport { jobs: Vec::with_capacity(self.jobs.len()) };
        for job in &self.jobs {
            let verb = match &job.mode {
                JobMode::Copy => "Copying",
                JobMode::Flatten { .. } => "Flattening",
                JobMode::BestChoice { .. } => "Best-choice projecting",
            };
            log_info(format!("{} table '{}' into '{}'", verb, job.source, job.dest));

            let mut source = input.open_table(&job.source)?;
            let mut outcome = JobOutcome::new(job);

            match RowTransformer::resolve(job, source.schema(), &self.formulas) {
                Err(resolve_err) => {
                    let err = JobError::from(resolve_err);
                    log_warning(format!("Job '{}' not run: {}", outcome.dest, err));
                    outcome.error = Some(err.to_string());
                }
                Ok(mut transformer) => {
                    let mut sink = output.create_table(transformer.output_schema())?;
                    let mut rows = Vec::new();
                    loop {
                        let row = match source.next_event()? {
                            None => break,
                            Some(row) => row,
                        };
                        let event = outcome.events_read;
                        outcome.events_read += 1;
                        match transformer.transform(event, &row, &mut rows) {
                            Ok(()) => {
                                for out_row in &rows {
                                    sink.append(out_row)?;
                                    outcome.rows_written += 1;
                                }
                            }
                            Err(event_err) => {
                                // Keep what was already written, abort this
                                // job, move on with the queue.
                                sink.finish()?;
                                let err = JobError::from(event_err);
                                log_warning(format!("Job '{}' aborted: {}", outcome.dest, err));
                                outcome.error = Some(err.to_string());
                                break;
                            }
                        }
                    }
                    if outcome.error.is_none() {
                        sink.finish()?;
                        log_success(format!(
                            "{} event(s) -> {} row(s) into '{}'",
                            outcome.events_read, outcome.rows_written, outcome.dest
                        ));
                    }
                }
            }
            report.jobs.push(outcome);
        }
        Ok(report)
    }
}
