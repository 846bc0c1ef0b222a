//! Run command implementation

use clap::Args;
use switchyard_runtime::{into_response, DispatchRequest};
use tracing::info;

use super::{dispatcher_for, load_action, print_json};

/// Run command arguments
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Test the connection before running the action
    #[arg(long)]
    pub test_connection: bool,

    /// Print the response on a single line
    #[arg(long)]
    pub compact: bool,
}

impl RunCommand {
    /// Execute the run command
    ///
    /// The response envelope is printed either way; a failed action also
    /// makes the command fail.
    pub async fn execute(&self, path: &str) -> anyhow::Result<()> {
        let file = load_action(path)?;
        let dispatcher = dispatcher_for(&file)?;

        info!("Running action '{}'", file.name);
        let request = DispatchRequest::from(&file).with_connection_test(self.test_connection);
        let response = into_response(dispatcher.run_action(request).await);
        print_json(&response, self.compact)?;

        if !response.success {
            anyhow::bail!(
                "action '{}' failed ({})",
                file.name,
                response.kind.as_deref().unwrap_or("Internal")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_run_command_args() {
        let cmd = RunCommand {
            test_connection: true,
            compact: false,
        };
        assert!(cmd.test_connection);
    }

    #[tokio::test]
    async fn test_transformer_action_runs() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "name: reshape\nresource:\n  type: transformer\n  options: {{}}\naction:\n  template: {{}}"
        )
        .unwrap();

        let cmd = RunCommand {
            test_connection: false,
            compact: true,
        };
        cmd.execute(file.path().to_str().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_action_fails_command() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"name": "ask", "resource": {{"type": "aiagent", "options": {{}}}}, "action": {{"template": {{"aiAgentID": "a"}}}}}}"#
        )
        .unwrap();

        let cmd = RunCommand {
            test_connection: false,
            compact: true,
        };
        let err = cmd.execute(file.path().to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }
}
