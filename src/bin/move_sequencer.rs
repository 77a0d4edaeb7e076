//! move-sequencer: simulate-then-submit runner for Move call sequences
//!
//! ## Example Usage
//!
//! ```bash
//! # Check a sequence file
//! move-sequencer validate deploy.yaml
//!
//! # Show how the steps split into batches
//! move-sequencer plan deploy.yaml --batch-size 5
//!
//! # Rehearse against the in-memory ledger, confirming each unit at a prompt
//! move-sequencer run deploy.yaml
//!
//! # Submit through a ledger gateway in batch mode, chaining automatically
//! move-sequencer run deploy.yaml --ledger http --endpoint https://gateway.example \
//!     --sender 0xA11CE --mode batch --auto --yes
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod sequencer_cli;

use sequencer_cli::{
    inspect::{PlanCmd, ValidateCmd},
    output::format_error,
    run::RunCmd,
};

#[derive(Parser)]
#[command(
    name = "move-sequencer",
    author,
    version,
    about = "Simulate, confirm and submit ordered Move call sequences"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logs, events and state changes)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a sequence file
    Validate(ValidateCmd),

    /// Print the batch partition of a sequence file
    Plan(PlanCmd),

    /// Run a sequence file through the orchestration engine
    Run(RunCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        command,
        json,
        verbose,
    } = Cli::parse();
    sequencer_cli::init_logging(verbose);

    let result = match command {
        Commands::Validate(cmd) => cmd.execute(json),
        Commands::Plan(cmd) => cmd.execute(json),
        Commands::Run(cmd) => return finish(cmd.execute(json, verbose).await, None),
    };
    finish(result, Some(json))
}

/// Exit non-zero on failure. `json` is `None` when the command already
/// reported its own error.
fn finish(result: Result<()>, json: Option<bool>) -> Result<()> {
    if let Err(err) = &result {
        if let Some(json) = json {
            eprintln!("{}", format_error(err, json));
        }
        std::process::exit(1);
    }
    result
}
