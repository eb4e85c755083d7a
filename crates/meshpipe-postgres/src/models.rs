use chrono::{DateTime, Utc};
use meshpipe_domain::NodeRecord;
use tokio_postgres::Row;

/// Row shape for the `mesh_nodes` table. The key is the node id as a
/// decimal string; the numeric id is stored alongside for queries.
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub node_key: String,
    pub node_id: i64,
    pub shortname: Option<String>,
    pub longname: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_known_voltage: Option<f64>,
    pub last_known_battery_percent: Option<f64>,
    pub last_seen_battery: Option<DateTime<Utc>>,
    pub last_seen_location: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl NodeRow {
    pub fn from_row(row: &Row) -> Self {
        Self {
            node_key: row.get("node_key"),
            node_id: row.get("node_id"),
            shortname: row.get("shortname"),
            longname: row.get("longname"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            last_known_voltage: row.get("last_known_voltage"),
            last_known_battery_percent: row.get("last_known_battery_percent"),
            last_seen_battery: row.get("last_seen_battery"),
            last_seen_location: row.get("last_seen_location"),
            last_seen: row.get("last_seen"),
        }
    }
}

impl From<&NodeRecord> for NodeRow {
    fn from(record: &NodeRecord) -> Self {
        Self {
            node_key: record.node_id.to_string(),
            node_id: i64::from(record.node_id),
            shortname: record.shortname.clone(),
            longname: record.longname.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            last_known_voltage: record.last_known_voltage,
            last_known_battery_percent: record.last_known_battery_percent,
            last_seen_battery: record.last_seen_battery,
            last_seen_location: record.last_seen_location,
            last_seen: record.last_seen,
        }
    }
}

impl From<NodeRow> for NodeRecord {
    fn from(row: NodeRow) -> Self {
        NodeRecord {
            node_id: row.node_id as u32,
            shortname: row.shortname,
            longname: row.longname,
            latitude: row.latitude,
            longitude: row.longitude,
            last_known_voltage: row.last_known_voltage,
            last_known_battery_percent: row.last_known_battery_percent,
            last_seen_battery: row.last_seen_battery,
            last_seen_location: row.last_seen_location,
            last_seen: row.last_seen,
        }
    }
}
