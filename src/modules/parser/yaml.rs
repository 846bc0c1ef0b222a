//! Action file parser (YAML, with JSON accepted as a YAML subset)

use switchyard_core::{ActionFile, SwitchyardError};

use crate::env::EnvSubstitutor;

/// Input format of an action file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    /// Guess the format from a file extension; anything unknown is YAML
    pub fn from_path(path: &str) -> Self {
        if path.to_ascii_lowercase().ends_with(".json") {
            FileFormat::Json
        } else {
            FileFormat::Yaml
        }
    }
}

/// Parser for action files
pub struct ActionFileParser {
    substitutor: EnvSubstitutor,
}

impl ActionFileParser {
    /// Parser that fails on unset `{{ env.NAME }}` variables
    pub fn new() -> Self {
        Self {
            substitutor: EnvSubstitutor::new(),
        }
    }

    /// Parser that leaves unset variables as literal placeholders
    pub fn lenient() -> Self {
        Self {
            substitutor: EnvSubstitutor::lenient(),
        }
    }

    /// Substitute environment placeholders, then decode
    pub fn parse(&self, content: &str, format: FileFormat) -> Result<ActionFile, SwitchyardError> {
        let substituted = self.substitutor.substitute(content)?;
        Self::parse_raw(&substituted, format)
    }

    /// Decode without environment substitution
    pub fn parse_raw(content: &str, format: FileFormat) -> Result<ActionFile, SwitchyardError> {
        match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| SwitchyardError::Config(format!("JSON parse error: {}", e))),
            FileFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| SwitchyardError::Config(format!("YAML parse error: {}", e))),
        }
    }
}

impl Default for ActionFileParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_types::ResourceType;

    #[test]
    fn test_parse_sql_action() {
        let yaml = r#"
name: count-users
resource:
  type: postgresql
  options:
    host: localhost
    port: "5432"
    databaseName: app
    databaseUsername: app
    databasePassword: app
    ssl:
      ssl: false
action:
  template:
    mode: sql
    query: SELECT count(*) AS n FROM users
ids:
  action_id: act_1
"#;
        let file = ActionFileParser::parse_raw(yaml, FileFormat::Yaml).unwrap();
        assert_eq!(file.name, "count-users");
        assert_eq!(file.resource.kind(), Some(ResourceType::Postgresql));
        assert_eq!(file.action_type(), "postgresql");
        assert_eq!(file.action.template.get("mode"), Some(&json!("sql")));
        assert_eq!(file.resource.options["ssl"]["ssl"], json!(false));
        assert_eq!(file.ids.action_id.as_deref(), Some("act_1"));
        assert!(file.ids.resource_id.is_none());
    }

    #[test]
    fn test_parse_json_action_with_settings() {
        let content = r#"{
            "name": "ping",
            "resource": {"type": "restapi", "options": {"baseURL": "http://localhost"}},
            "action": {"type": "restapi", "template": {"url": "/ping", "method": "GET", "bodyType": "none"}},
            "settings": {"http_timeout_secs": 3}
        }"#;
        let file = ActionFileParser::parse_raw(content, FileFormat::Json).unwrap();
        assert_eq!(
            file.runtime_config().http_timeout(),
            Some(std::time::Duration::from_secs(3))
        );
    }

    #[test]
    fn test_parse_substitutes_env() {
        std::env::set_var("SWITCHYARD_YAML_TEST_HOST", "redis.internal");
        let yaml = r#"
name: get-key
resource:
  type: redis
  options:
    host: "{{ env.SWITCHYARD_YAML_TEST_HOST }}"
    port: 6379
action:
  template:
    mode: raw
    query: GET key
"#;
        let file = ActionFileParser::new()
            .parse(yaml, FileFormat::Yaml)
            .unwrap();
        assert_eq!(file.resource.options["host"], json!("redis.internal"));
        assert_eq!(file.resource.options["port"], json!(6379));
        std::env::remove_var("SWITCHYARD_YAML_TEST_HOST");
    }

    #[test]
    fn test_parse_missing_env_var() {
        let yaml = "name: x\nresource:\n  type: redis\n  options:\n    host: \"{{ env.SWITCHYARD_UNSET_9431 }}\"\naction: {}\n";
        assert!(matches!(
            ActionFileParser::new().parse(yaml, FileFormat::Yaml),
            Err(SwitchyardError::EnvVarNotFound(_))
        ));
        let file = ActionFileParser::lenient()
            .parse(yaml, FileFormat::Yaml)
            .unwrap();
        assert_eq!(
            file.resource.options["host"],
            json!("{{ env.SWITCHYARD_UNSET_9431 }}")
        );
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = ActionFileParser::parse_raw("invalid: yaml: content: [", FileFormat::Yaml);
        assert!(matches!(result, Err(SwitchyardError::Config(_))));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path("actions/ping.JSON"), FileFormat::Json);
        assert_eq!(FileFormat::from_path("actions/ping.yaml"), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path("ping"), FileFormat::Yaml);
    }
}
