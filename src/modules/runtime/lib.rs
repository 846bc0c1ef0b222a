//! Connector runtime for Switchyard
//!
//! This crate provides the connector contract, one connector per supported
//! data source, the registry mapping type tags to connectors, and the
//! dispatch façade that validates and runs actions.

pub mod connectors;
pub mod dispatch;

pub use connectors::{build_connector, Connector, ConnectorFactory, Registry};
pub use dispatch::{
    into_response, ActionDispatcher, AuditEvent, AuditSink, DispatchRequest,
    HttpVirtualResourceClient, TracingAuditSink, VirtualResourceClient,
};
