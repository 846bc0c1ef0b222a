//! Meta command implementation

use clap::Args;
use tracing::info;

use super::{dispatcher_for, load_action, print_json};

/// Meta command arguments
#[derive(Args, Debug)]
pub struct MetaCommand {
    /// Print the schema on a single line
    #[arg(long)]
    pub compact: bool,
}

impl MetaCommand {
    /// Describe the action's resource
    pub async fn execute(&self, path: &str) -> anyhow::Result<()> {
        let file = load_action(path)?;
        let dispatcher = dispatcher_for(&file)?;

        let meta = dispatcher
            .get_meta_info(file.action_type(), &file.resource.options)
            .await?;
        info!(entries = meta.schema.len(), "Described '{}' resource", file.resource.resource_type);
        print_json(&meta, self.compact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_invalid_resource_is_rejected_before_connecting() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "name: tables\nresource:\n  type: postgresql\n  options:\n    port: \"5432\"\naction: {{}}\n"
        )
        .unwrap();

        let err = MetaCommand { compact: false }
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid resource options"));
    }
}
