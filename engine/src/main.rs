//! Arbor CLI - run transformation jobs over columnar event tables
//!
//! # Main Commands
//!
//! ```bash
//! arbor schema data.tables                  # List tables and columns
//! arbor run spec.json -i in.tables -o out.tables
//! arbor batch spec.json -i a.tables b.tables -o oa.tables ob.tables
//! ```
//!
//! # One-shot jobs (no spec file)
//!
//! ```bash
//! arbor copy in.tables out.tables -t DecayTree -b 'B0_*'
//! arbor flatten in.tables out.tables -t DecayTree --targets 'B0_Fit*'
//! arbor best-choice in.tables out.tables -t DecayTree --targets 'B0_Fit*'
//! arbor example-spec                        # Print a documented spec file
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use arbor::{
    example_spec, logs, InputStore, JsonlStore, RunReport, Session, SessionSpec,
};

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Streaming copy/flatten/best-choice jobs over columnar event tables", long_about = None)]
struct Cli {
    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables in a store, or one table's columns
    Schema {
        /// Store directory
        store: PathBuf,

        /// Show this table's schema as JSON
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Copy a table, optionally filtered by branches and a cut
    Copy {
        /// Input store directory
        input: PathBuf,

        /// Output store directory
        output: PathBuf,

        /// Source table name
        #[arg(short, long)]
        table: String,

        /// Destination table name (default: source name)
        #[arg(short, long, default_value = "")]
        dest: String,

        /// Branch selection pattern(s), OR-joined
        #[arg(short, long)]
        branches: Vec<String>,

        /// Cut expression(s), AND-joined
        #[arg(short, long)]
        cut: Vec<String>,
    },

    /// Explode jagged columns, one output row per array element
    Flatten {
        /// Input store directory
        input: PathBuf,

        /// Output store directory
        output: PathBuf,

        /// Source table name
        #[arg(short, long)]
        table: String,

        /// Destination table name (default: source name)
        #[arg(short, long, default_value = "")]
        dest: String,

        /// Branch selection pattern(s), OR-joined
        #[arg(short, long)]
        branches: Vec<String>,

        /// Pattern(s) selecting the jagged columns to explode
        #[arg(long, required = true)]
        targets: Vec<String>,

        /// Cut expression(s), AND-joined
        #[arg(short, long)]
        cut: Vec<String>,
    },

    /// Keep only index 0 of jagged columns, one output row per event
    BestChoice {
        /// Input store directory
        input: PathBuf,

        /// Output store directory
        output: PathBuf,

        /// Source table name
        #[arg(short, long)]
        table: String,

        /// Destination table name (default: source name)
        #[arg(short, long, default_value = "")]
        dest: String,

        /// Branch selection pattern(s), OR-joined
        #[arg(short, long)]
        branches: Vec<String>,

        /// Pattern(s) selecting the jagged columns to project
        #[arg(long, required = true)]
        targets: Vec<String>,

        /// Cut expression(s), AND-joined
        #[arg(short, long)]
        cut: Vec<String>,
    },

    /// Run a session spec file against one input/output pair
    Run {
        /// Session spec file (JSON)
        spec: PathBuf,

        /// Input store directory
        #[arg(short, long)]
        input: PathBuf,

        /// Output store directory
        #[arg(short, long)]
        output: PathBuf,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a session spec file over many input/output pairs
    Batch {
        /// Session spec file (JSON)
        spec: PathBuf,

        /// Input store directories
        #[arg(short, long, required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output store directories, one per input
        #[arg(short, long, required = true, num_args = 1..)]
        outputs: Vec<PathBuf>,

        /// Print the run reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a documented example session spec
    ExampleSpec,
}

fn main() {
    let cli = Cli::parse();
    logs::set_quiet(cli.quiet);

    let result = match cli.command {
        Commands::Schema { store, table } => cmd_schema(&store, table.as_deref()),

        Commands::Copy { input, output, table, dest, branches, cut } => {
            one_shot(&input, &output, |session| session.copy(&table, &dest, branches, cut))
        }

        Commands::Flatten { input, output, table, dest, branches, targets, cut } => {
            one_shot(&input, &output, |session| {
                session.flatten(&table, &dest, branches, targets, cut)
            })
        }

        Commands::BestChoice { input, output, table, dest, branches, targets, cut } => {
            one_shot(&input, &output, |session| {
                session.best_choice(&table, &dest, branches, targets, cut)
            })
        }

        Commands::Run { spec, input, output, json } => cmd_run(&spec, &input, &output, json),

        Commands::Batch { spec, inputs, outputs, json } => {
            cmd_batch(&spec, &inputs, &outputs, json)
        }

        Commands::ExampleSpec => cmd_example_spec(),
    };

    if let Err(e) = result {
        logs::log_error(format!("{}", e));
        std::process::exit(1);
    }
}

fn cmd_schema(store: &Path, table: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonlStore::open(store)?;
    match table {
        Some(name) => {
            let source = store.open_table(name)?;
            println!("{}", serde_json::to_string_pretty(source.schema())?);
        }
        None => {
            for name in store.table_names() {
                let source = store.open_table(&name)?;
                println!("{}  ({} columns)", name, source.schema().len());
            }
        }
    }
    Ok(())
}

/// Build a single-job session and run it.
fn one_shot(
    input: &Path,
    output: &Path,
    declare: impl FnOnce(&mut Session) -> Result<(), arbor::DeclareError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::open(input)?;
    declare(&mut session)?;
    let report = session.run(output)?;
    finish_report(&report)
}

fn cmd_run(
    spec_path: &Path,
    input: &Path,
    output: &Path,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = load_spec(spec_path)?;
    let mut session = Session::open(input)?;
    spec.apply(&mut session)?;

    let report = session.run(output)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    finish_report(&report)
}

fn cmd_batch(
    spec_path: &Path,
    inputs: &[PathBuf],
    outputs: &[PathBuf],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = load_spec(spec_path)?;
    let mut session = Session::new();
    spec.apply(&mut session)?;

    let reports = session.run_batch(inputs, outputs)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    let mut failed = false;
    for (input, report) in inputs.iter().zip(&reports) {
        logs::log_info(format!("{}: {}", input.display(), report.summary()));
        failed |= !report.is_ok();
    }
    if failed {
        return Err("some jobs failed; see the report".into());
    }
    Ok(())
}

fn cmd_example_spec() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", example_spec().to_json()?);
    Ok(())
}

fn load_spec(path: &Path) -> Result<SessionSpec, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    Ok(SessionSpec::from_json(&content)?)
}

fn finish_report(report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
    logs::log_info(report.summary());
    if report.is_ok() {
        Ok(())
    } else {
        Err("some jobs failed; see the report".into())
    }
}
