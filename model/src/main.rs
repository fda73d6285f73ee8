#[macro_use]
extern crate log;

use std::path::PathBuf;

use clap::Parser;

use nexus_core::error::TypedResult;
use nexus_model::engine::Nexus;
use nexus_model::loader;

/// Fast non-timing-accurate model of the Nexus mesh
#[derive(Parser, Debug)]
#[clap(name = "nexus-model")]
struct Args {
    /// Path to the design to load (JSON)
    design: PathBuf,

    /// Number of rows
    #[clap(short, long, default_value_t = 3)]
    rows: u32,

    /// Number of columns
    #[clap(short, long, default_value_t = 3)]
    columns: u32,

    /// Number of cycles to run for
    #[clap(long, default_value_t = 10)]
    cycles: u32,

    /// Path to write VCD out to
    #[clap(long)]
    vcd: Option<PathBuf>,

    /// Enable memory dumping on every cycle (expensive)
    #[clap(long)]
    dump: bool,

    /// Enable verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn run_model(args: &Args) -> TypedResult<()> {
    let mut model = Nexus::new(args.rows, args.columns);
    loader::load(&mut model, &args.design)?;

    if args.dump {
        info!("Enabling memory dumps");
        for row in 0..args.rows {
            for column in 0..args.columns {
                model.mesh_mut().node_mut(row, column).set_dumping(true);
            }
        }
    }

    model.run(args.cycles, true);

    if let Some(path) = &args.vcd {
        model.dump_vcd(path)?;
    }
    Ok(())
}

/// Construct the model, load the requested design, and simulate it for the
/// requested number of cycles
#[quit::main]
fn main() {
    let args = Args::parse();

    // --verbose wins over an inherited RUST_LOG
    let level = if args.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())
    };
    pretty_env_logger::formatted_builder()
        .parse_filters(&level)
        .format_timestamp_secs()
        .init();
    log_panics::init();

    info!("NXModel: Model of Nexus hardware");
    info!("Requested {}x{}", args.rows, args.columns);
    match run_model(&args) {
        Ok(_) => debug!("Simulation complete"),
        Err(e) => {
            error!("{e}");
            quit::with_code(1);
        }
    }
}
