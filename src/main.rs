// Nullpath: NPE-Candidate Analysis Engine
//
// Command-line front end over the analysis library. Reads a JSON class
// model, runs the analysis and prints sites, scores, CFGs or paths.

use anyhow::Result;
use clap::Parser;

use nullpath_analyzer::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    run_command(cli)?;

    Ok(())
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command.clone() {
        Commands::Analyze(args) => cli::cmds::analyze(args, &cli)?,
        Commands::Cfg(args) => cli::cmds::cfg(args, &cli)?,
        Commands::Paths(args) => cli::cmds::paths(args, &cli)?,
        Commands::Choose(args) => cli::cmds::choose(args, &cli)?,
    }
    Ok(())
}
