//! CLI commands

mod completion;
mod connection;
mod meta;
mod run;
mod types;
mod validate;

pub use completion::CompletionCommand;
pub use connection::TestCommand;
pub use meta::MetaCommand;
pub use run::RunCommand;
pub use types::TypesCommand;
pub use validate::ValidateCommand;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use switchyard_core::ActionFile;
use switchyard_parser::{env, parse_file};
use switchyard_runtime::{ActionDispatcher, TracingAuditSink};
use tracing::{debug, info};

/// Switchyard - dispatch resource actions from the command line
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Action file path (YAML or JSON)
    ///
    /// Global so it can follow the subcommand, e.g. `switchyard run -f ping.yaml`.
    #[arg(short = 'f', long = "file", global = true, default_value = "action.yaml")]
    pub file: String,

    /// Env file loaded before `{{ env.NAME }}` substitution
    ///
    /// Without it a `.env` in the working directory is loaded when present.
    #[arg(long = "env-file", global = true)]
    pub env_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the action against its resource
    Run(RunCommand),

    /// Validate the resource and action options without connecting
    Validate(ValidateCommand),

    /// Test the connection to the action's resource
    Test(TestCommand),

    /// Describe the resource (tables, buckets, collections)
    Meta(MetaCommand),

    /// List the supported resource types
    Types(TypesCommand),

    /// Generate shell completions
    #[command(hide = true)]
    Completion(CompletionCommand),
}

impl Cli {
    /// Load environment variables for placeholder substitution
    pub fn load_env(&self) -> anyhow::Result<()> {
        match &self.env_file {
            Some(path) => {
                env::load_env_file(path)?;
                debug!("Loaded env file: {}", path.display());
            }
            None => env::load_dotenv(),
        }
        Ok(())
    }
}

/// Parse and validate an action file
pub(crate) fn load_action(path: &str) -> anyhow::Result<ActionFile> {
    info!("Loading action file: {}", path);
    let file = parse_file(path).with_context(|| format!("invalid action file '{}'", path))?;
    debug!(
        name = %file.name,
        resource_type = %file.resource.resource_type,
        action_type = %file.action_type(),
        "Parsed action file"
    );
    Ok(file)
}

/// A dispatcher using the file's settings with `SWITCHYARD_*` overrides applied
pub(crate) fn dispatcher_for(file: &ActionFile) -> anyhow::Result<ActionDispatcher> {
    let config = file
        .runtime_config()
        .with_env_overrides()
        .context("invalid runtime settings")?;
    Ok(ActionDispatcher::new(Arc::new(config)).with_audit_sink(Arc::new(TracingAuditSink)))
}

/// Write a value to stdout as JSON
pub(crate) fn print_json<T: Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["switchyard", "run"]).unwrap();
        assert_eq!(cli.file, "action.yaml");
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_file_after_subcommand() {
        let cli = Cli::try_parse_from(["switchyard", "meta", "-f", "tables.json", "-v"]).unwrap();
        assert_eq!(cli.file, "tables.json");
        assert!(cli.verbose);
    }

    #[test]
    fn test_env_file_flag() {
        let cli = Cli::try_parse_from(["switchyard", "--env-file", "prod.env", "test"]).unwrap();
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
        assert!(matches!(cli.command, Commands::Test(_)));
    }

    #[test]
    fn test_missing_env_file_fails() {
        let cli = Cli::try_parse_from(["switchyard", "--env-file", "/nonexistent/.env", "types"]).unwrap();
        assert!(cli.load_env().is_err());
    }

    #[test]
    fn test_load_action_reports_path() {
        let err = load_action("/nonexistent/action.yaml").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/action.yaml"));
    }
}
