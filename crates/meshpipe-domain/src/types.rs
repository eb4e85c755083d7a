use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message as it arrived off the bus. Produced by the connection
/// manager, consumed exactly once by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// Which last-seen timestamp an upsert refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Battery,
    Location,
    Generic,
}

/// Per-node persisted state.
///
/// Every data field is optional and merge-on-write: a field changes only
/// when an update actually carries a value, so an absent field can never
/// erase something we already learned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: u32,
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

impl NodeRecord {
    pub fn new(node_id: u32) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    /// Merge the non-empty fields of an update into this record.
    pub fn apply(&mut self, update: &NodeUpdate) {
        if let Some(shortname) = &update.shortname {
            self.shortname = Some(shortname.clone());
        }
        if let Some(longname) = &update.longname {
            self.longname = Some(longname.clone());
        }
        if let Some(latitude) = update.latitude {
            self.latitude = Some(latitude);
        }
        if let Some(longitude) = update.longitude {
            self.longitude = Some(longitude);
        }
        if let Some(voltage) = update.voltage {
            self.last_known_voltage = Some(voltage);
        }
        if let Some(battery_percent) = update.battery_percent {
            self.last_known_battery_percent = Some(battery_percent);
        }
    }

    /// Refresh exactly the timestamp selected by the update kind.
    pub fn stamp(&mut self, kind: UpdateKind, now: DateTime<Utc>) {
        match kind {
            UpdateKind::Battery => self.last_seen_battery = Some(now),
            UpdateKind::Location => self.last_seen_location = Some(now),
            UpdateKind::Generic => self.last_seen = Some(now),
        }
    }
}

/// Partial-field input to an upsert. `None` means "not observed", never
/// "clear".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub shortname: Option<String>,
    pub longname: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub voltage: Option<f64>,
    pub battery_percent: Option<f64>,
}
