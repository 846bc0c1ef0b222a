//! Validate command implementation

use clap::Args;
use serde_json::json;
use switchyard_core::{ActionFile, SwitchyardError};
use switchyard_types::ValidateResult;
use tracing::{info, warn};

use super::{dispatcher_for, load_action, print_json};

/// Validate command arguments
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Only check the action file structure, not the connector options
    #[arg(long)]
    pub file_only: bool,
}

impl ValidateCommand {
    /// Execute the validate command
    ///
    /// Never opens a connection. The report is printed for invalid files
    /// too, and the command then fails.
    pub fn execute(&self, path: &str) -> anyhow::Result<()> {
        let file = load_action(path)?;
        let virtual_resource = file.resource.kind().is_some_and(|t| t.is_virtual());

        let outcome = if self.file_only || virtual_resource {
            Ok(ValidateResult::valid())
        } else {
            check_options(&file)?
        };

        let (result, reason) = match outcome {
            Ok(result) => (result, None),
            Err(e) => (ValidateResult::invalid(), Some(e)),
        };
        print_json(
            &json!({
                "name": file.name,
                "type": file.action_type(),
                "valid": result.valid,
                "error": reason.as_ref().map(|e| e.to_string()),
            }),
            false,
        )?;

        match reason {
            Some(e) => {
                warn!("Action file '{}' is invalid: {}", file.name, e);
                Err(e.into())
            }
            None if !result.valid => {
                anyhow::bail!("action '{}' has invalid options", file.name)
            }
            None => {
                info!("Action file '{}' is valid", file.name);
                Ok(())
            }
        }
    }
}

/// Run the connector's option checks
///
/// The inner result holds validation failures; anything else is returned
/// as the outer error.
fn check_options(file: &ActionFile) -> anyhow::Result<Result<ValidateResult, SwitchyardError>> {
    let dispatcher = dispatcher_for(file)?;
    let tag = file.action_type();

    let checked = dispatcher
        .validate_resource(tag, &file.resource.options)
        .and_then(|resource| {
            let action = dispatcher.validate_action(tag, &file.action.template)?;
            Ok(if resource.valid && action.valid {
                ValidateResult::valid()
            } else {
                ValidateResult::invalid()
            })
        });

    match checked {
        Err(e) if !e.is_validation_error() => Err(e.into()),
        other => Ok(other),
    }
}
