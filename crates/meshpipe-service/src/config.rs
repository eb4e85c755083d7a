use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use meshpipe_crypto::{DecryptionKey, KeyError, KeyRing};
use meshpipe_ingest::{ConnectionConfig, PipelineConfig};
use meshpipe_postgres::PostgresConfig;

/// Service settings, loaded from `MESHPIPE_`-prefixed environment
/// variables with serde defaults per field.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Port for the health/stats surface
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    // MQTT configuration
    #[serde(default = "default_mqtt_broker_host")]
    pub mqtt_broker_host: String,

    #[serde(default = "default_mqtt_broker_port")]
    pub mqtt_broker_port: u16,

    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,

    #[serde(default = "default_mqtt_username")]
    pub mqtt_username: String,

    #[serde(default = "default_mqtt_password")]
    pub mqtt_password: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    #[serde(default = "default_initial_backoff_secs")]
    pub mqtt_initial_backoff_secs: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub mqtt_max_backoff_secs: u64,

    // Filtering configuration
    #[serde(default = "default_shortname_pattern")]
    pub shortname_pattern: String,

    /// Battery storage threshold in volts
    #[serde(default = "default_min_storage_voltage")]
    pub min_storage_voltage: f64,

    // Decryption keys, base64, tried in order. Empty entries are
    // skipped.
    #[serde(default = "default_key_1")]
    pub decryption_key_1: String,

    #[serde(default = "default_key_1_desc")]
    pub decryption_key_1_desc: String,

    #[serde(default = "default_key_2")]
    pub decryption_key_2: String,

    #[serde(default = "default_key_2_desc")]
    pub decryption_key_2_desc: String,

    #[serde(default = "default_key_3")]
    pub decryption_key_3: String,

    #[serde(default = "default_key_3_desc")]
    pub decryption_key_3_desc: String,

    /// Heartbeat interval for the liveness task in seconds
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    // Durable store configuration. When postgres is disabled the
    // service runs cache-only and state is lost on restart.
    #[serde(default)]
    pub postgres_enabled: bool,

    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_pool_size")]
    pub postgres_pool_size: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_mqtt_broker_host() -> String {
    "mqtt.bayme.sh".to_string()
}

fn default_mqtt_broker_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "#".to_string()
}

fn default_mqtt_username() -> String {
    "meshdev".to_string()
}

fn default_mqtt_password() -> String {
    "large4cats".to_string()
}

fn default_mqtt_client_id() -> String {
    "meshpipe-ingest".to_string()
}

fn default_initial_backoff_secs() -> u64 {
    5
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_shortname_pattern() -> String {
    meshpipe_domain::DEFAULT_SHORTNAME_PATTERN.to_string()
}

fn default_min_storage_voltage() -> f64 {
    20.0
}

fn default_key_1() -> String {
    // Default channel key published with the radio firmware.
    "1PG7OiApB1nwvP+rz05pAQ==".to_string()
}

fn default_key_1_desc() -> String {
    "default channel key (16 bytes)".to_string()
}

fn default_key_2() -> String {
    "MgkxoOxSr8pwXSkjvXrjt8pH8eStGHEIwKACN3TavNQ=".to_string()
}

fn default_key_2_desc() -> String {
    "fleet key (32 bytes)".to_string()
}

fn default_key_3() -> String {
    "AQ==".to_string()
}

fn default_key_3_desc() -> String {
    "simple default (1 byte)".to_string()
}

fn default_heartbeat_secs() -> u64 {
    60
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "meshpipe".to_string()
}

fn default_postgres_username() -> String {
    "meshpipe".to_string()
}

fn default_postgres_password() -> String {
    "meshpipe".to_string()
}

fn default_postgres_pool_size() -> usize {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("MESHPIPE"))
            .build()?
            .try_deserialize()
    }

    /// Assemble the key ring from the configured slots. An invalid key
    /// is a startup error, not a degraded mode.
    pub fn keyring(&self) -> Result<KeyRing, KeyError> {
        let slots = [
            (&self.decryption_key_1, &self.decryption_key_1_desc),
            (&self.decryption_key_2, &self.decryption_key_2_desc),
            (&self.decryption_key_3, &self.decryption_key_3_desc),
        ];

        let mut keys = Vec::new();
        for (encoded, description) in slots {
            if encoded.is_empty() {
                continue;
            }
            keys.push(DecryptionKey::from_base64(encoded, description.clone())?);
        }
        Ok(KeyRing::new(keys))
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            broker_host: self.mqtt_broker_host.clone(),
            broker_port: self.mqtt_broker_port,
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            topic: self.mqtt_topic.clone(),
            client_id: self.mqtt_client_id.clone(),
            initial_backoff_secs: self.mqtt_initial_backoff_secs,
            max_backoff_secs: self.mqtt_max_backoff_secs,
            ..Default::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_storage_voltage: self.min_storage_voltage,
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_pool_size,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}
