//! Switchyard CLI
//!
//! Command-line interface for the Switchyard action dispatcher.

use clap::Parser;
use switchyard_cli::{exit_code, Cli, Commands};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays machine readable
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli.load_env()?;
    let file = cli.file.as_str();

    match &cli.command {
        Commands::Run(cmd) => cmd.execute(file).await?,
        Commands::Validate(cmd) => cmd.execute(file)?,
        Commands::Test(cmd) => cmd.execute(file).await?,
        Commands::Meta(cmd) => cmd.execute(file).await?,
        Commands::Types(cmd) => cmd.execute()?,
        Commands::Completion(cmd) => cmd.execute(),
    }

    Ok(())
}
