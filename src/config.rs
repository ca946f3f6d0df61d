//! Configuration types for seatable-mysync.
//!
//! Two layers: [`AppConfig`] describes the environment (MySQL sources, the
//! SeaTable server, the task registry) and loads from a TOML file or
//! environment variables; [`TaskConfig`] describes one sync task and loads
//! from a JSON document.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// SeaTable server configuration
    #[validate(nested)]
    pub seatable: SeaTableConfig,

    /// Named MySQL sources
    #[validate(nested)]
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Task registry
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,

    /// Retry configuration
    #[validate(nested)]
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {}", path, e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse {}: {}", path, e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// `SEATABLE_SERVER_URL` is required; `MYSQL_HOST`/`MYSQL_PORT`/
    /// `MYSQL_USER`/`MYSQL_PASSWORD` define the `primary` source and the
    /// `_2`-suffixed variants optionally define `secondary`. The task
    /// registry comes from `SYNC_TASKS_CONFIG` (see [`tasks_from_env`]).
    pub fn from_env() -> Result<Self> {
        let server_url = std::env::var("SEATABLE_SERVER_URL")
            .map_err(|_| Error::config("SEATABLE_SERVER_URL not set"))?;

        let mut sources = vec![source_from_env("primary", "")?];
        if std::env::var("MYSQL_HOST_2").is_ok() {
            sources.push(source_from_env("secondary", "_2")?);
        }

        let config = Self {
            seatable: SeaTableConfig {
                server_url,
                ..Default::default()
            },
            sources,
            tasks: tasks_from_env()?,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|e| Error::validation(format!("Config validation failed: {}", e)))?;

        Url::parse(&self.seatable.server_url)
            .map_err(|e| Error::config(format!("Invalid SeaTable server URL: {}", e)))?;

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
        }

        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate task name '{}'",
                    task.name
                )));
            }
            if !self.sources.iter().any(|s| s.name == task.source) {
                return Err(Error::validation(format!(
                    "task '{}' references unknown source '{}'",
                    task.name, task.source
                )));
            }
        }

        Ok(())
    }

    /// Look up a task registry entry by name.
    pub fn task(&self, name: &str) -> Option<&TaskEntry> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Look up a MySQL source by name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// SeaTable server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SeaTableConfig {
    /// Server base URL
    #[validate(length(min = 1))]
    pub server_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SeaTableConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl SeaTableConfig {
    /// Get the request timeout duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// One named MySQL source.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// Source name referenced by task entries
    #[validate(length(min = 1))]
    pub name: String,

    /// Host name or address
    #[validate(length(min = 1))]
    pub host: String,

    /// Port
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// User name
    #[validate(length(min = 1))]
    pub username: String,

    /// Password
    #[serde(default, skip_serializing)]
    pub password: String,
}

/// One task registry entry: where the task config lives and which
/// source/database/token it binds to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Task name used on the command line
    pub name: String,

    /// Path to the task's JSON configuration file
    pub config_file: String,

    /// MySQL source name
    #[serde(default = "default_source_name")]
    pub source: String,

    /// Database to select on the source
    pub database: String,

    /// Environment variable holding the task's SeaTable API token
    pub token_env: String,
}

impl TaskEntry {
    /// Resolve the task's API token from the environment.
    pub fn api_token(&self) -> Result<String> {
        std::env::var(&self.token_env)
            .map_err(|_| Error::config(format!("{} not set", self.token_env)))
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Max retry attempts
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Max backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Add jitter
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Get initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Get max backoff duration.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            timestamps: true,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Per-task sync configuration, loaded from a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TaskConfig {
    /// Destination table
    pub seatable: TableTarget,

    /// Batch size for both delete and insert operations
    #[validate(range(min = 1, max = 100000))]
    pub chunk_size: usize,

    /// Query set: exactly one primary plus any number of auxiliaries
    pub data_mappings: Vec<QuerySpec>,
}

/// Destination table reference inside a task config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableTarget {
    /// Table name in the SeaTable base
    pub table_name: String,
}

impl TaskConfig {
    /// Load a task configuration from a JSON file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {}", path, e)))?;
        Self::from_json(&content)
            .map_err(|e| Error::config(format!("Invalid task config {}: {}", path, e)))
    }

    /// Parse a task configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse task config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the destination table name.
    pub fn table_name(&self) -> &str {
        &self.seatable.table_name
    }

    /// Get the primary query spec (the one without a merge rule).
    pub fn primary(&self) -> Option<&QuerySpec> {
        self.data_mappings.iter().find(|m| m.is_primary())
    }

    /// Validate the task configuration.
    ///
    /// Checks the invariants the merge engine relies on: exactly one primary
    /// dataset, unique descriptions, well-formed field mappings, and merge
    /// rules whose fields exist in both the auxiliary and the primary
    /// destination field set.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|e| Error::validation(format!("Task validation failed: {}", e)))?;

        if self.seatable.table_name.is_empty() {
            return Err(Error::validation("table_name must not be empty"));
        }
        if self.data_mappings.is_empty() {
            return Err(Error::validation("data_mappings must not be empty"));
        }

        let primaries = self.data_mappings.iter().filter(|m| m.is_primary()).count();
        if primaries != 1 {
            return Err(Error::validation(format!(
                "expected exactly one mapping without merge_rules, found {}",
                primaries
            )));
        }

        let mut descriptions = HashSet::new();
        for spec in &self.data_mappings {
            if !descriptions.insert(spec.description.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate mapping description '{}'",
                    spec.description
                )));
            }
            spec.validate_fields()?;
        }

        let primary = self
            .primary()
            .ok_or_else(|| Error::validation("no primary mapping found"))?;
        for spec in &self.data_mappings {
            let Some(rule) = &spec.merge_rule else { continue };
            for (role, field) in [("on", &rule.on_field), ("target_field", &rule.target_field)] {
                if !spec.maps_dest_field(field) {
                    return Err(Error::validation(format!(
                        "mapping '{}': merge rule {} '{}' is not a mapped field",
                        spec.description, role, field
                    )));
                }
                if !primary.maps_dest_field(field) {
                    return Err(Error::validation(format!(
                        "mapping '{}': merge rule {} '{}' does not exist in the primary mapping '{}'",
                        spec.description, role, field, primary.description
                    )));
                }
            }
        }

        Ok(())
    }
}

/// One logical data source within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Human label; also the join key between auxiliary data and merge rules
    pub description: String,

    /// SQL text, either a single statement or fragments joined with spaces
    pub sql_query: SqlText,

    /// Ordered source-column to destination-field mapping
    #[serde(
        deserialize_with = "de_field_mappings",
        serialize_with = "ser_field_mappings"
    )]
    pub field_mappings: Vec<(String, String)>,

    /// Merge rule; absent on the primary dataset
    #[serde(default, rename = "merge_rules", skip_serializing_if = "Option::is_none")]
    pub merge_rule: Option<MergeRule>,
}

impl QuerySpec {
    /// Whether this spec is the primary dataset.
    pub fn is_primary(&self) -> bool {
        self.merge_rule.is_none()
    }

    /// The SQL statement to execute.
    pub fn sql(&self) -> String {
        self.sql_query.text()
    }

    /// Whether `name` is one of this spec's destination field names.
    pub fn maps_dest_field(&self, name: &str) -> bool {
        self.field_mappings.iter().any(|(_, dest)| dest == name)
    }

    fn validate_fields(&self) -> Result<()> {
        if self.field_mappings.is_empty() {
            return Err(Error::validation(format!(
                "mapping '{}': field_mappings must not be empty",
                self.description
            )));
        }

        let mut sources = HashSet::new();
        let mut dests = HashSet::new();
        for (source, dest) in &self.field_mappings {
            if source.trim().is_empty() || dest.trim().is_empty() {
                return Err(Error::validation(format!(
                    "mapping '{}': empty field name in field_mappings",
                    self.description
                )));
            }
            if !sources.insert(source.as_str()) {
                return Err(Error::validation(format!(
                    "mapping '{}': duplicate source column '{}'",
                    self.description, source
                )));
            }
            if !dests.insert(dest.as_str()) {
                return Err(Error::validation(format!(
                    "mapping '{}': duplicate destination field '{}'",
                    self.description, dest
                )));
            }
        }
        Ok(())
    }
}

/// SQL text in either of the shapes the task files use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlText {
    /// A single statement
    Statement(String),
    /// A statement split into fragments, joined with single spaces
    Fragments(Vec<String>),
}

impl SqlText {
    /// The statement as a single string.
    pub fn text(&self) -> String {
        match self {
            SqlText::Statement(s) => s.clone(),
            SqlText::Fragments(parts) => parts.join(" "),
        }
    }
}

/// Merge rule: join auxiliary records into the primary set on `on_field`,
/// overwriting `target_field`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeRule {
    /// Destination field both datasets are joined on
    #[serde(rename = "on")]
    pub on_field: String,

    /// Destination field overwritten on the matched primary record
    pub target_field: String,
}

fn de_field_mappings<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, String)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as DeError;

    // serde_json's preserve_order feature keeps the document order here.
    let map = serde_json::Map::deserialize(deserializer)?;
    map.into_iter()
        .map(|(source, dest)| match dest {
            serde_json::Value::String(dest) => Ok((source, dest)),
            other => Err(DeError::custom(format!(
                "field mapping for '{}' must be a string, got {}",
                source, other
            ))),
        })
        .collect()
}

fn ser_field_mappings<S>(
    mappings: &[(String, String)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;

    let mut map = serializer.serialize_map(Some(mappings.len()))?;
    for (source, dest) in mappings {
        map.serialize_entry(source, dest)?;
    }
    map.end()
}

fn source_from_env(name: &str, suffix: &str) -> Result<SourceConfig> {
    let var = |base: &str| format!("{base}{suffix}");
    let require = |base: &str| {
        std::env::var(var(base)).map_err(|_| Error::config(format!("{} not set", var(base))))
    };

    let port = match std::env::var(var("MYSQL_PORT")) {
        Ok(raw) => raw
            .parse::<u16>()
            .map_err(|e| Error::config(format!("Invalid {}: {}", var("MYSQL_PORT"), e)))?,
        Err(_) => default_mysql_port(),
    };

    Ok(SourceConfig {
        name: name.to_string(),
        host: require("MYSQL_HOST")?,
        port,
        username: require("MYSQL_USER")?,
        password: std::env::var(var("MYSQL_PASSWORD")).unwrap_or_default(),
    })
}

/// Wrapper struct for object format: `{"tasks": [...]}`
#[derive(Debug, Deserialize)]
struct TasksWrapper {
    tasks: Vec<TaskEntry>,
}

/// Load the task registry from the `SYNC_TASKS_CONFIG` environment variable.
///
/// Expects base64-encoded JSON in either array format `[{...}, {...}]` or
/// object format `{"tasks": [...]}`; `SYNC_TASKS_JSON` may carry the same
/// content unencoded for local development. Returns an empty registry when
/// neither variable is set.
pub fn tasks_from_env() -> Result<Vec<TaskEntry>> {
    let config_str = match std::env::var("SYNC_TASKS_CONFIG") {
        Ok(encoded) => {
            use base64::{Engine, engine::general_purpose::STANDARD};
            let decoded = STANDARD.decode(&encoded).map_err(|e| {
                Error::config(format!("Failed to decode SYNC_TASKS_CONFIG base64: {}", e))
            })?;
            String::from_utf8(decoded)
                .map_err(|e| Error::config(format!("SYNC_TASKS_CONFIG is not valid UTF-8: {}", e)))?
        }
        Err(_) => match std::env::var("SYNC_TASKS_JSON") {
            Ok(json) => json,
            Err(_) => return Ok(vec![]),
        },
    };

    parse_task_entries(&config_str)
}

fn parse_task_entries(content: &str) -> Result<Vec<TaskEntry>> {
    if let Ok(entries) = serde_json::from_str::<Vec<TaskEntry>>(content) {
        return Ok(entries);
    }
    if let Ok(wrapper) = serde_json::from_str::<TasksWrapper>(content) {
        return Ok(wrapper.tasks);
    }
    Err(Error::config(
        "Failed to parse task registry JSON: expected array [...] or object {\"tasks\": [...]}",
    ))
}

// Defaults
fn default_timeout_secs() -> u64 {
    30
}
fn default_mysql_port() -> u16 {
    3306
}
fn default_source_name() -> String {
    "primary".into()
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    60000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine, engine::general_purpose::STANDARD};
    use std::io::Write;

    const TASK_JSON: &str = r#"{
        "seatable": { "table_name": "Contracts" },
        "chunk_size": 100,
        "data_mappings": [
            {
                "description": "contracts",
                "sql_query": "SELECT id, amount FROM contract",
                "field_mappings": { "id": "ID", "amount": "Amount", "paid": "Paid" }
            },
            {
                "description": "payments",
                "sql_query": ["SELECT id, paid", "FROM payment", "WHERE paid IS NOT NULL"],
                "field_mappings": { "id": "ID", "paid": "Paid" },
                "merge_rules": { "on": "ID", "target_field": "Paid" }
            }
        ]
    }"#;

    #[test]
    fn test_parse_task_config() {
        let config = TaskConfig::from_json(TASK_JSON).unwrap();
        assert_eq!(config.table_name(), "Contracts");
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.data_mappings.len(), 2);

        let primary = config.primary().unwrap();
        assert_eq!(primary.description, "contracts");
        // Document order survives parsing
        let dests: Vec<&str> = primary
            .field_mappings
            .iter()
            .map(|(_, d)| d.as_str())
            .collect();
        assert_eq!(dests, ["ID", "Amount", "Paid"]);
    }

    #[test]
    fn test_sql_fragments_joined() {
        let config = TaskConfig::from_json(TASK_JSON).unwrap();
        let aux = &config.data_mappings[1];
        assert_eq!(
            aux.sql(),
            "SELECT id, paid FROM payment WHERE paid IS NOT NULL"
        );
    }

    #[test]
    fn test_validate_requires_single_primary() {
        let mut config = TaskConfig::from_json(TASK_JSON).unwrap();

        // No primary at all
        config.data_mappings[0].merge_rule = Some(MergeRule {
            on_field: "ID".into(),
            target_field: "Paid".into(),
        });
        assert!(config.validate().is_err());

        // Two primaries
        let mut config = TaskConfig::from_json(TASK_JSON).unwrap();
        config.data_mappings[1].merge_rule = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_merge_rule_fields() {
        let mut config = TaskConfig::from_json(TASK_JSON).unwrap();
        config.data_mappings[1].merge_rule = Some(MergeRule {
            on_field: "Nope".into(),
            target_field: "Paid".into(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Nope"));

        // Field exists in the auxiliary but not in the primary
        let mut config = TaskConfig::from_json(TASK_JSON).unwrap();
        config.data_mappings[0].field_mappings.retain(|(_, d)| d != "Paid");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let json = TASK_JSON.replace("\"chunk_size\": 100", "\"chunk_size\": 0");
        assert!(TaskConfig::from_json(&json).is_err());
    }

    #[test]
    fn test_validate_duplicate_description() {
        let json = TASK_JSON.replace("\"payments\"", "\"contracts\"");
        assert!(TaskConfig::from_json(&json).is_err());
    }

    #[test]
    fn test_field_mappings_serialize_as_object() {
        let config = TaskConfig::from_json(TASK_JSON).unwrap();
        let out = serde_json::to_value(&config.data_mappings[0]).unwrap();
        assert!(out["field_mappings"].is_object());
        assert_eq!(out["field_mappings"]["amount"], "Amount");
    }

    #[test]
    fn test_parse_task_entries_both_formats() {
        let array = r#"[{"name":"contract","config_file":"memo-contract.json","database":"chpm_v2","token_env":"SEATABLE_TOKEN_CONTRACT"}]"#;
        let entries = parse_task_entries(array).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "contract");
        assert_eq!(entries[0].source, "primary");

        let object = format!(r#"{{"tasks":{array}}}"#);
        let entries = parse_task_entries(&object).unwrap();
        assert_eq!(entries[0].database, "chpm_v2");
    }

    #[test]
    fn test_base64_decode_and_parse_logic() {
        let json = r#"[{"name":"payin","config_file":"memo-payin.json","source":"secondary","database":"projectmng","token_env":"SEATABLE_TOKEN_PAYIN"}]"#;
        let encoded = STANDARD.encode(json);

        let decoded = STANDARD.decode(&encoded).expect("Should decode");
        let decoded_str = String::from_utf8(decoded).expect("Should be UTF-8");
        let entries = parse_task_entries(&decoded_str).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "secondary");
    }

    #[test]
    fn test_app_config_from_toml_file() {
        let toml_text = r#"
[seatable]
server_url = "https://cloud.seatable.example"

[[sources]]
name = "primary"
host = "db.internal"
username = "sync"
password = "secret"

[[tasks]]
name = "contract"
config_file = "tasks/memo-contract.json"
database = "chpm_v2"
token_env = "SEATABLE_TOKEN_CONTRACT"
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml_text.as_bytes()).unwrap();

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.sources[0].port, 3306);
        assert_eq!(config.task("contract").unwrap().source, "primary");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_app_config_rejects_unknown_source() {
        let config = AppConfig {
            seatable: SeaTableConfig {
                server_url: "https://cloud.seatable.example".into(),
                ..Default::default()
            },
            sources: vec![],
            tasks: vec![TaskEntry {
                name: "contract".into(),
                config_file: "memo-contract.json".into(),
                source: "primary".into(),
                database: "chpm_v2".into(),
                token_env: "SEATABLE_TOKEN_CONTRACT".into(),
            }],
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
