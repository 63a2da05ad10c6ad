//! klinec CLI - compile an indicator script, run it over bar data, print CSV.
//!
//! ```text
//! klinec -d h examples.tdx -D bars.csv
//! klinec -d p script.pine -D bars.json -o results.csv --emit-bytecode out.klbc
//! klinec --load out.klbc -D bars.csv
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use klinec_drv::data::load_table;
use klinec_drv::{compile, Dialect};
use klinec_vm::Vm;

/// Compile and run indicator scripts over historical bar data.
#[derive(Parser, Debug)]
#[command(name = "klinec")]
#[command(version)]
#[command(about = "Multi-dialect indicator script compiler and VM", long_about = None)]
struct Cli {
    /// Source dialect: p/pine, e/el, h/hithink
    #[arg(short, long, default_value = "h", env = "KLINEC_DIALECT", value_parser = parse_dialect)]
    dialect: Dialect,

    /// Script file to compile
    script: Option<PathBuf>,

    /// Load textual bytecode instead of compiling a script
    #[arg(long, conflicts_with = "script")]
    load: Option<PathBuf>,

    /// Bar data file (.csv or .json)
    #[arg(short = 'D', long)]
    data: PathBuf,

    /// Write the results CSV here instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Decimal places in the results CSV
    #[arg(short, long, default_value_t = 3)]
    precision: usize,

    /// Also write the compiled textual bytecode to this path
    #[arg(long)]
    emit_bytecode: Option<PathBuf>,
}

fn parse_dialect(s: &str) -> Result<Dialect, String> {
    s.parse()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let text = match (&cli.script, &cli.load) {
        (Some(script), None) => {
            let source = fs::read_to_string(script)
                .with_context(|| format!("failed to read script {}", script.display()))?;
            let bytecode = compile(cli.dialect, &source)
                .with_context(|| format!("failed to compile {}", script.display()))?;
            bytecode.to_text()
        }
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read bytecode {}", path.display()))?,
        _ => bail!("provide a script file or --load <bytecode>"),
    };

    if let Some(path) = &cli.emit_bytecode {
        fs::write(path, &text)
            .with_context(|| format!("failed to write bytecode to {}", path.display()))?;
    }

    let table = load_table(&cli.data)
        .with_context(|| format!("failed to load bar data from {}", cli.data.display()))?;

    let mut vm = Vm::new();
    table.register_into(&mut vm);
    vm.load_bytecode(&text).context("failed to load bytecode")?;
    vm.execute(table.total_bars()).context("execution failed")?;

    let csv = vm.plotted_results_as_csv(cli.precision);
    match &cli.out {
        Some(path) => fs::write(path, csv)
            .with_context(|| format!("failed to write results to {}", path.display()))?,
        None => print!("{}", csv),
    }
    Ok(())
}
