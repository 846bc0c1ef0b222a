//! Core domain logic for Switchyard
//!
//! This crate contains the domain descriptors, runtime settings, and error
//! types shared by the parser, the runtime, and the CLI.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::SwitchyardError;
