//! Test command implementation

use clap::Args;
use tracing::info;

use super::{dispatcher_for, load_action, print_json};

/// Test command arguments
#[derive(Args, Debug)]
pub struct TestCommand {
    /// Print the result on a single line
    #[arg(long)]
    pub compact: bool,
}

impl TestCommand {
    /// Validate the resource options, then probe the connection
    pub async fn execute(&self, path: &str) -> anyhow::Result<()> {
        let file = load_action(path)?;
        let dispatcher = dispatcher_for(&file)?;

        let result = dispatcher
            .test_connection(file.action_type(), &file.resource.options)
            .await?;
        info!("Connection to '{}' resource succeeded", file.resource.resource_type);
        print_json(&result, self.compact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_unsupported_for_rest() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "name: ping\nresource:\n  type: restapi\n  options:\n    baseURL: http://localhost\naction: {{}}\n"
        )
        .unwrap();

        let err = TestCommand { compact: true }
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Unsupported operation"));
    }
}
