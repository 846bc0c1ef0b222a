//! Type definitions for Switchyard
//!
//! This crate contains shared type definitions used across the Switchyard codebase:
//! the closed set of resource types and the value shapes connectors return.

pub mod resource_type;
pub mod runtime;

pub use resource_type::ResourceType;
pub use runtime::{
    ActionResponse, ConnectionResult, MetaInfoResult, Options, Row, RuntimeResult, ValidateResult,
};
