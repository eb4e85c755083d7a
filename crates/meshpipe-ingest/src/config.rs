use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bus connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: String,
    pub password: String,
    /// Topic filter, re-subscribed on every reconnect.
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// First retry delay after a failed connect or a drop.
    pub initial_backoff_secs: u64,
    /// Backoff ceiling; the delay doubles up to this value.
    pub max_backoff_secs: u64,
    /// Bound on joining the connection task during `stop()`.
    pub stop_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            username: String::new(),
            password: String::new(),
            topic: "#".to_string(),
            client_id: "meshpipe-ingest".to_string(),
            keep_alive_secs: 30,
            initial_backoff_secs: 5,
            max_backoff_secs: 300,
            stop_timeout_secs: 10,
        }
    }
}

impl ConnectionConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Pipeline behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Battery readings at or below this voltage are not persisted.
    /// The fleet's charge controllers idle around 20 V, so anything
    /// lower is a disconnected or faulty sensor.
    pub min_storage_voltage: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_storage_voltage: 20.0,
        }
    }
}
