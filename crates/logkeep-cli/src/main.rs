//! logkeep CLI binary entrypoint.
//!
//! This is the main entry point for the `logkeep` command-line tool.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use logkeep::LogEngine;
use logkeep_cli::cli::{Cli, Commands};
use logkeep_cli::commands::{
    DistinctCommand, ExportCommand, InspectCommand, PruneCommand, QueryCommand, RotateCommand,
    SearchCommand, StatsCommand,
};
use logkeep_cli::output::OutputFormat;

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), logkeep_cli::CliError> {
    let config = cli.engine_config()?;
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    // These open the backend themselves.
    match &cli.command {
        Commands::Inspect => {
            return InspectCommand::new(&config).execute(&mut stdout, &format).await;
        }
        Commands::Rotate => {
            return RotateCommand::new(&config).execute(&mut stdout, &format).await;
        }
        _ => {}
    }

    let engine = LogEngine::open(config)?;
    match cli.command {
        Commands::Query(args) => {
            let cmd = QueryCommand::new(&engine);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::Search(args) => {
            let cmd = SearchCommand::new(&engine);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::Stats => {
            let cmd = StatsCommand::new(&engine);
            cmd.execute(&mut stdout, &format).await?;
        }
        Commands::Distinct { field } => {
            let cmd = DistinctCommand::new(&engine);
            cmd.execute(&mut stdout, &format, field).await?;
        }
        Commands::Prune => {
            let cmd = PruneCommand::new(&engine);
            cmd.execute(&mut stdout, &format).await?;
        }
        Commands::Export(args) => {
            let cmd = ExportCommand::new(&engine);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::Inspect | Commands::Rotate => {}
    }

    Ok(())
}
