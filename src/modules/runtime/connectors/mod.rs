//! Connectors for every supported data source
//!
//! Each connector implements the [`Connector`] contract for one resource
//! type family. The [`Registry`] is the only place that knows which type tag
//! maps to which connector.

pub mod aws;
pub mod common;
mod appwrite;
mod couchdb;
mod dynamodb;
mod elasticsearch;
pub mod firebase;
pub mod google;
pub mod http;
mod mongodb;
mod redis;
mod registry;
mod s3;
mod smtp;
pub mod sql;
mod traits;

pub use appwrite::AppwriteConnector;
pub use couchdb::CouchDbConnector;
pub use dynamodb::DynamoDbConnector;
pub use elasticsearch::ElasticsearchConnector;
pub use firebase::FirebaseConnector;
pub use google::GoogleSheetsConnector;
pub use http::{
    AirtableConnector, GraphQlConnector, HfEndpointConnector, HuggingFaceConnector,
    RestApiConnector,
};
pub use mongodb::MongoDbConnector;
pub use redis::RedisConnector;
pub use registry::{build_connector, ConnectorFactory, Registry};
pub use s3::S3Connector;
pub use smtp::SmtpConnector;
pub use sql::{SqlConnector, SqlDriver, SqlSession};
pub use traits::Connector;
