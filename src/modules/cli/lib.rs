//! Switchyard CLI
//!
//! Runs a single action file through the dispatcher:
//! - run: Execute the action
//! - validate: Check the resource and action options without connecting
//! - test: Probe the resource connection
//! - meta: Describe the resource (tables, buckets, collections)
//! - types: List the supported resource types

pub mod commands;

pub use commands::{Cli, Commands};

use switchyard_core::SwitchyardError;

/// Process exit status for a failed command
///
/// Failures caused by the action file or its options exit with 2 so
/// scripts can tell them apart from connection and runtime failures (1).
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let client_error = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<SwitchyardError>())
        .any(SwitchyardError::is_client_error);
    if client_error {
        2
    } else {
        1
    }
}
