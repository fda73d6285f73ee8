#[macro_use]
extern crate log;

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use nexus_core::error::{Classify, SystemError, TypedResult};
use nexus_compiler::ast::Instance;
use nexus_compiler::dump;
use nexus_compiler::lower;
use nexus_compiler::opt::{propagate, prune, sanity};
use nexus_compiler::partition::Partitioner;

/// Compiler for the Nexus mesh: lowers an elaborated netlist, folds
/// constants, and shapes the graph into per-node partitions
#[derive(Parser, Debug)]
#[clap(name = "nexus-compiler")]
struct Args {
    /// Path to the elaborated design (JSON)
    design: PathBuf,

    /// Number of rows in the target mesh
    #[clap(short, long, default_value_t = 3)]
    rows: u32,

    /// Number of columns in the target mesh
    #[clap(short, long, default_value_t = 3)]
    columns: u32,

    /// Inputs available per node
    #[clap(long, default_value_t = 32)]
    node_inputs: usize,

    /// Outputs available per node
    #[clap(long, default_value_t = 32)]
    node_outputs: usize,

    /// Path to write the optimised design as SystemVerilog
    #[clap(long)]
    output: Option<PathBuf>,

    /// Path to write the partition-annotated SystemVerilog
    #[clap(long)]
    partition_output: Option<PathBuf>,

    /// Enable verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn run_compiler(args: &Args) -> TypedResult<()> {
    let text = fs::read_to_string(&args.design).classify(SystemError::Io)?;
    let instance: Instance = serde_json::from_str(&text).classify(SystemError::Config)?;

    let mut module = lower::lower(&instance)?;
    info!("{}", dump::stats::render(&module));

    propagate::run(&mut module);
    prune::run(&mut module);
    sanity::check(&module, false)?;
    info!("{}", dump::stats::render(&module));

    let mut partitioner = Partitioner::new(&module, args.node_inputs, args.node_outputs);
    if !partitioner.run() {
        for (index, inputs, outputs) in partitioner.unfit_partitions() {
            warn!(
                "Partition {index} is over budget with {inputs} inputs and {outputs} outputs"
            );
        }
    }
    let available = (args.rows * args.columns) as usize;
    if partitioner.partitions.len() > available {
        warn!(
            "Design needs {} partitions but a {}x{} mesh only has {available} nodes",
            partitioner.partitions.len(),
            args.rows,
            args.columns
        );
    }

    if let Some(path) = &args.output {
        dump::sv::write(&module, path)?;
    }
    if let Some(path) = &args.partition_output {
        dump::partitions_sv::write(&module, &partitioner, path)?;
    }
    Ok(())
}

/// Parse arguments, bring up logging, and drive the compilation pipeline;
/// a failing stage lands in the log before the non-zero exit
#[quit::main]
fn main() {
    let args = Args::parse();

    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose { "debug" } else { "info" }.into()
    });
    pretty_env_logger::formatted_builder()
        .parse_filters(&level)
        .format_timestamp_secs()
        .init();
    log_panics::init();

    info!("NXCompile: Compiler for the Nexus mesh");
    if let Err(e) = run_compiler(&args) {
        error!("compilation failed: {e}");
        quit::with_code(1);
    }
}
