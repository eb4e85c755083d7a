use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};

use meshpipe_domain::{DomainError, DomainResult, NodeRecord, NodeStore};

use crate::client::PostgresClient;
use crate::models::NodeRow;

const ALL_COLUMNS: &str = "node_key, node_id, shortname, longname, latitude, longitude, \
     last_known_voltage, last_known_battery_percent, \
     last_seen_battery, last_seen_location, last_seen";

/// PostgreSQL implementation of the NodeStore trait. `put` is a full
/// overwrite of the row, matching the store contract.
#[derive(Clone)]
pub struct PostgresNodeStore {
    client: PostgresClient,
}

impl PostgresNodeStore {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    /// Create the `mesh_nodes` table when it does not exist yet.
    pub async fn ensure_schema(&self) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::StoreError)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS mesh_nodes (
                node_key TEXT PRIMARY KEY,
                node_id BIGINT NOT NULL,
                shortname TEXT,
                longname TEXT,
                latitude DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
                last_known_voltage DOUBLE PRECISION,
                last_known_battery_percent DOUBLE PRECISION,
                last_seen_battery TIMESTAMPTZ,
                last_seen_location TIMESTAMPTZ,
                last_seen TIMESTAMPTZ
            )",
            &[],
        )
        .await
        .context("failed to create mesh_nodes table")
        .map_err(DomainError::StoreError)?;

        info!("mesh_nodes schema ready");
        Ok(())
    }
}

#[async_trait]
impl NodeStore for PostgresNodeStore {
    async fn get(&self, node_id: u32) -> DomainResult<Option<NodeRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::StoreError)?;

        let sql = format!("SELECT {ALL_COLUMNS} FROM mesh_nodes WHERE node_key = $1");
        let row = conn
            .query_opt(sql.as_str(), &[&node_id.to_string()])
            .await
            .map_err(|e| DomainError::StoreError(e.into()))?;

        Ok(row.map(|row| NodeRow::from_row(&row).into()))
    }

    async fn put(&self, record: &NodeRecord) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::StoreError)?;

        let row = NodeRow::from(record);
        conn.execute(
            "INSERT INTO mesh_nodes (node_key, node_id, shortname, longname, latitude, \
                 longitude, last_known_voltage, last_known_battery_percent, \
                 last_seen_battery, last_seen_location, last_seen)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (node_key) DO UPDATE SET
                 node_id = EXCLUDED.node_id,
                 shortname = EXCLUDED.shortname,
                 longname = EXCLUDED.longname,
                 latitude = EXCLUDED.latitude,
                 longitude = EXCLUDED.longitude,
                 last_known_voltage = EXCLUDED.last_known_voltage,
                 last_known_battery_percent = EXCLUDED.last_known_battery_percent,
                 last_seen_battery = EXCLUDED.last_seen_battery,
                 last_seen_location = EXCLUDED.last_seen_location,
                 last_seen = EXCLUDED.last_seen",
            &[
                &row.node_key,
                &row.node_id,
                &row.shortname,
                &row.longname,
                &row.latitude,
                &row.longitude,
                &row.last_known_voltage,
                &row.last_known_battery_percent,
                &row.last_seen_battery,
                &row.last_seen_location,
                &row.last_seen,
            ],
        )
        .await
        .map_err(|e| DomainError::StoreError(e.into()))?;

        debug!(
            node_key = %row.node_key,
            shortname = row.shortname.as_deref().unwrap_or("unnamed"),
            "stored node record"
        );
        Ok(())
    }

    async fn scan_all(&self) -> DomainResult<Vec<NodeRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::StoreError)?;

        let sql = format!("SELECT {ALL_COLUMNS} FROM mesh_nodes");
        let rows = conn
            .query(sql.as_str(), &[])
            .await
            .map_err(|e| DomainError::StoreError(e.into()))?;

        let records = rows
            .iter()
            .map(|row| NodeRow::from_row(row).into())
            .collect::<Vec<NodeRecord>>();

        debug!(count = records.len(), "scanned mesh_nodes");
        Ok(records)
    }
}
