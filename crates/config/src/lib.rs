use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Config file read when `PROJECTOR_CONFIG` is not set. Missing is fine.
pub const DEFAULT_CONFIG_PATH: &str = "config/projector.toml";

/// `AppConfig` holds all configuration parameters required by the application.
///
/// Values are layered: built-in defaults, then the optional config file, then
/// `PROJECTOR_`-prefixed environment variables (optionally via a `.env` file).
/// Nested keys use `__` in variable names, e.g. `PROJECTOR_DB_HOST`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Database settings ---
    /// Database hostname or service name (e.g. "postgres" in Docker Compose, "localhost" for local runs).
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Database name.
    pub db_name: String,
    /// Maximum number of pooled connections.
    pub db_pool_size: usize,
    /// Directory with `.sql` migrations applied at startup.
    pub migrations_dir: String,

    // --- Content store ---
    /// Which content store implementation backs the projector.
    pub store_backend: StoreBackend,

    // --- Kafka settings ---
    /// List of Kafka brokers (comma-separated string in env, parsed to Vec<String>).
    pub kafka_brokers: Vec<String>,

    // --- HTTP server ---
    /// The port on which the health/metrics server will listen.
    pub http_port: u16,

    // --- Shutdown timeout ---
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub shutdown_timeout: Duration,

    // --- Consumers ---
    /// One entry per projected topic.
    #[serde(default)]
    pub consumers: Vec<ConsumerOptions>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Wire format of a topic, which also selects the handler used for it.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// Self-describing Avro object container payloads.
    #[default]
    Avro,
    /// JSON `ExchangeRate` records.
    ExchangeRate,
    /// JSON `Commodity` records.
    Commodity,
}

/// Settings of one consumer instance. Loaded once, never mutated.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub topic_name: String,
    /// Consumer group id.
    ///
    /// When absent every process start joins a fresh random group and,
    /// because offsets reset to earliest, re-reads the whole topic.
    #[serde(default)]
    pub group_id: Option<String>,
    pub app_name: String,
    /// Target schema. Typed formats name their own schema; there this only
    /// labels the consumer.
    pub schema_name: String,
    /// Identity issued commands are attributed to.
    pub client_name: String,
    /// Target field name -> source field name. Empty means 1:1 pass-through.
    #[serde(default)]
    pub field_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub record_format: RecordFormat,
    /// Content field holding the external id, used for identity lookups.
    #[serde(default = "default_id_field_name")]
    pub id_field_name: String,
    /// Write the message key under `id_field_name` when a record lacks that
    /// field, so identities can be looked up again after a restart. Adds a
    /// string field of that name to the target schema.
    #[serde(default)]
    pub key_field: bool,
}

fn default_id_field_name() -> String {
    "id".to_string()
}

impl ConsumerOptions {
    /// Minimal options for a topic; the rest takes defaults.
    pub fn new(topic_name: &str, app_name: &str, schema_name: &str, client_name: &str) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            group_id: None,
            app_name: app_name.to_string(),
            schema_name: schema_name.to_string(),
            client_name: client_name.to_string(),
            field_mapping: BTreeMap::new(),
            record_format: RecordFormat::default(),
            id_field_name: default_id_field_name(),
            key_field: false,
        }
    }
}

/// Custom deserializer for graceful shutdown timeout.
/// Accepts human-readable formats like "5s", "1m", etc.
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from the file named by `PROJECTOR_CONFIG` (or
    /// [`DEFAULT_CONFIG_PATH`]) and the environment.
    ///
    /// # Errors
    /// Returns an error if a source is malformed or a value has the wrong type.
    pub fn load() -> Result<Self> {
        // Load from .env file (for Docker environment)
        dotenvy::dotenv().ok();

        let path = std::env::var("PROJECTOR_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Same as [`AppConfig::load`] with an explicit config file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            // Database
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "projector")?
            .set_default("db_password", "projector")?
            .set_default("db_name", "content")?
            .set_default("db_pool_size", 16)?
            .set_default("migrations_dir", "migrations")?
            // Content store
            .set_default("store_backend", "postgres")?
            // Kafka
            .set_default("kafka_brokers", vec!["localhost:9092"])?
            // HTTP
            .set_default("http_port", 8081)?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("PROJECTOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("kafka_brokers"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Failed to load configuration")
    }

    /// libpq-style connection string for the configured database.
    pub fn database_dsn(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable",
            self.db_host, self.db_port, self.db_user, self.db_password, self.db_name
        )
    }
}
