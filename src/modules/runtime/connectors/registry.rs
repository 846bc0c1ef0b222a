//! Resource type to connector mapping

use std::str::FromStr;
use std::sync::Arc;
use switchyard_core::RuntimeConfig;
use switchyard_types::ResourceType;

use super::sql::{
    ClickHouseDriver, MssqlDriver, MySqlDriver, OracleDriver, PostgresDriver, SnowflakeDriver,
    SqlConnector,
};
use super::{
    AirtableConnector, AppwriteConnector, Connector, CouchDbConnector, DynamoDbConnector,
    ElasticsearchConnector, FirebaseConnector, GoogleSheetsConnector, GraphQlConnector,
    HfEndpointConnector, HuggingFaceConnector, MongoDbConnector, RedisConnector,
    RestApiConnector, S3Connector, SmtpConnector,
};

/// Builds a fresh connector for a resource type
///
/// `None` means there is no in-process connector for the type: either the
/// type is virtual or the factory does not know it.
pub trait ConnectorFactory: Send + Sync {
    fn build(&self, resource_type: ResourceType) -> Option<Box<dyn Connector>>;
}

/// The built-in factory covering every non-virtual resource type
#[derive(Debug, Clone, Default)]
pub struct Registry {
    config: Arc<RuntimeConfig>,
}

impl Registry {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    /// Build a connector from a textual type tag
    pub fn build_tag(&self, tag: &str) -> Option<Box<dyn Connector>> {
        ResourceType::from_str(tag)
            .ok()
            .and_then(|resource_type| self.build(resource_type))
    }
}

impl ConnectorFactory for Registry {
    fn build(&self, resource_type: ResourceType) -> Option<Box<dyn Connector>> {
        let config = Arc::clone(&self.config);
        // Aliases keep their own tag so connectors report what was asked for
        let connector: Box<dyn Connector> = match resource_type.family() {
            ResourceType::Mysql => Box::new(SqlConnector::new(MySqlDriver::new(resource_type, config))),
            ResourceType::Postgresql => {
                Box::new(SqlConnector::new(PostgresDriver::new(resource_type, config)))
            }
            ResourceType::Mssql => Box::new(SqlConnector::new(MssqlDriver::new(config))),
            ResourceType::Oracle => Box::new(SqlConnector::new(OracleDriver::new(config))),
            ResourceType::Clickhouse => Box::new(SqlConnector::new(ClickHouseDriver::new(config))),
            ResourceType::Snowflake => Box::new(SqlConnector::new(SnowflakeDriver::new(config))),
            ResourceType::Redis => Box::new(RedisConnector::new(resource_type, config)),
            ResourceType::Mongodb => Box::new(MongoDbConnector::new(config)),
            ResourceType::Elasticsearch => Box::new(ElasticsearchConnector::new(config)),
            ResourceType::Couchdb => Box::new(CouchDbConnector::new(config)),
            ResourceType::Dynamodb => Box::new(DynamoDbConnector::new(config)),
            ResourceType::Appwrite => Box::new(AppwriteConnector::new(config)),
            ResourceType::Firebase => Box::new(FirebaseConnector::new(config)),
            ResourceType::S3 => Box::new(S3Connector::new(config)),
            ResourceType::Smtp => Box::new(SmtpConnector::new(config)),
            ResourceType::RestApi => Box::new(RestApiConnector::new(config)),
            ResourceType::Graphql => Box::new(GraphQlConnector::new(config)),
            ResourceType::Huggingface => Box::new(HuggingFaceConnector::new(config)),
            ResourceType::HfEndpoint => Box::new(HfEndpointConnector::new(config)),
            ResourceType::Airtable => Box::new(AirtableConnector::new(config)),
            ResourceType::GoogleSheets => Box::new(GoogleSheetsConnector::new(config)),
            ResourceType::Transformer | ResourceType::AiAgent => return None,
            // family() only ever yields canonical tags
            ResourceType::Mariadb
            | ResourceType::Tidb
            | ResourceType::Supabasedb
            | ResourceType::Neon
            | ResourceType::Hydra
            | ResourceType::Upstash => return None,
        };
        Some(connector)
    }
}

/// Build a connector for a type tag with default settings
pub fn build_connector(tag: &str) -> Option<Box<dyn Connector>> {
    Registry::default().build_tag(tag)
}
