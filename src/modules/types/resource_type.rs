//! Resource type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of resource type tags an action may target.
///
/// Alias tags (`mariadb`, `tidb`, `supabasedb`, `neon`, `hydra`, `upstash`)
/// keep their own variant so they round-trip through serde, but resolve to
/// the connector family of their canonical type via [`ResourceType::family`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    RestApi,
    Mysql,
    Mariadb,
    Tidb,
    Postgresql,
    Supabasedb,
    Neon,
    Hydra,
    Redis,
    Upstash,
    Mongodb,
    Elasticsearch,
    S3,
    Smtp,
    Firebase,
    Clickhouse,
    Graphql,
    Mssql,
    Huggingface,
    Dynamodb,
    Snowflake,
    Couchdb,
    HfEndpoint,
    Oracle,
    Appwrite,
    GoogleSheets,
    Airtable,
    Transformer,
    AiAgent,
}

impl ResourceType {
    /// Returns every recognised resource type
    pub fn all() -> &'static [ResourceType] {
        use ResourceType::*;
        &[
            RestApi,
            Mysql,
            Mariadb,
            Tidb,
            Postgresql,
            Supabasedb,
            Neon,
            Hydra,
            Redis,
            Upstash,
            Mongodb,
            Elasticsearch,
            S3,
            Smtp,
            Firebase,
            Clickhouse,
            Graphql,
            Mssql,
            Huggingface,
            Dynamodb,
            Snowflake,
            Couchdb,
            HfEndpoint,
            Oracle,
            Appwrite,
            GoogleSheets,
            Airtable,
            Transformer,
            AiAgent,
        ]
    }

    /// The textual tag used on the wire
    pub fn as_str(&self) -> &'static str {
        use ResourceType::*;
        match self {
            RestApi => "restapi",
            Mysql => "mysql",
            Mariadb => "mariadb",
            Tidb => "tidb",
            Postgresql => "postgresql",
            Supabasedb => "supabasedb",
            Neon => "neon",
            Hydra => "hydra",
            Redis => "redis",
            Upstash => "upstash",
            Mongodb => "mongodb",
            Elasticsearch => "elasticsearch",
            S3 => "s3",
            Smtp => "smtp",
            Firebase => "firebase",
            Clickhouse => "clickhouse",
            Graphql => "graphql",
            Mssql => "mssql",
            Huggingface => "huggingface",
            Dynamodb => "dynamodb",
            Snowflake => "snowflake",
            Couchdb => "couchdb",
            HfEndpoint => "hfendpoint",
            Oracle => "oracle",
            Appwrite => "appwrite",
            GoogleSheets => "googlesheets",
            Airtable => "airtable",
            Transformer => "transformer",
            AiAgent => "aiagent",
        }
    }

    /// Resolve alias tags to the canonical type whose connector serves them
    pub fn family(&self) -> ResourceType {
        use ResourceType::*;
        match self {
            Mariadb | Tidb => Mysql,
            Supabasedb | Neon | Hydra => Postgresql,
            Upstash => Redis,
            other => *other,
        }
    }

    /// Returns true for types executed outside the connector core
    pub fn is_virtual(&self) -> bool {
        matches!(self, ResourceType::Transformer | ResourceType::AiAgent)
    }

    /// Returns true if this type speaks SQL
    pub fn is_sql(&self) -> bool {
        use ResourceType::*;
        matches!(
            self.family(),
            Mysql | Postgresql | Mssql | Oracle | Clickhouse | Snowflake
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::all()
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown resource type: {}", s))
    }
}
