//! Domain models for Switchyard

mod descriptor;
mod model;
mod types;

pub use descriptor::{ActionDescriptor, ResourceDescriptor};
pub use model::{ActionFile, ActionIds};
pub use types::{EndpointConfig, RuntimeConfig};
