/// PBF command-line tool: print the header of an OSM PBF file or decode
/// the whole file and report entity counts.
///
/// # Command overview
///
/// ```text
/// pbf <COMMAND> [OPTIONS]
///
/// Commands:
///   header    Print the decoded header block
///   stats     Decode every block and print entity counts
///   help      Print help information
///
/// Global options:
///   -v, --verbose    Log decoder activity to stderr (RUST_LOG overrides)
///   --json           Emit JSON instead of text
///   -h, --help       Print help
///   -V, --version    Print version
/// ```
///
/// # Exit codes
///
/// | Code | Meaning                                    |
/// |------|--------------------------------------------|
/// | 0    | Success                                    |
/// | 1    | Error (I/O failure, malformed file, etc.)  |
///
/// All error details are written to stderr so stdout can be piped cleanly.
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd_header;
mod cmd_stats;

// ── CLI root ──────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pbf", version, about = "OSM PBF decoder CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log decoder activity at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,
}

// ── Sub-commands ──────────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum Commands {
    /// Print the decoded header block of a PBF file.
    Header(HeaderArgs),
    /// Decode every block of a PBF file and print entity counts.
    Stats(StatsArgs),
}

// ── Argument structs ──────────────────────────────────────────────────────────

/// Arguments for `pbf header`.
#[derive(clap::Args)]
pub struct HeaderArgs {
    /// Path to the `.osm.pbf` file.
    pub file: PathBuf,
}

/// Arguments for `pbf stats`.
///
/// ```text
/// ┌────────────────────┬─────────────────────────────────────────────────┐
/// │ Flag               │ Effect                                          │
/// ├────────────────────┼─────────────────────────────────────────────────┤
/// │ --concurrency N    │ Decode workers (0 = available parallelism)      │
/// │ --metadata         │ Decode version/user/timestamp and count users   │
/// │ --skip-nodes       │ Do not decode nodes                             │
/// └────────────────────┴─────────────────────────────────────────────────┘
/// ```
#[derive(clap::Args)]
pub struct StatsArgs {
    /// Path to the `.osm.pbf` file.
    pub file: PathBuf,

    /// Number of decode workers; 0 uses the available parallelism.
    #[arg(long, default_value_t = 0)]
    pub concurrency: usize,

    /// Decode entity metadata.
    #[arg(long)]
    pub metadata: bool,

    /// Skip node groups entirely.
    #[arg(long)]
    pub skip_nodes: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| {
            runtime.block_on(async move {
                match cli.command {
                    Commands::Header(args) => cmd_header::run(&args, cli.json).await,
                    Commands::Stats(args) => cmd_stats::run(&args, cli.json).await,
                }
            })
        });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
