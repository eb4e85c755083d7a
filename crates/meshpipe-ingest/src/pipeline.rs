use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use meshpipe_codec::proto::{mesh_packet::PayloadVariant, MeshPacket};
use meshpipe_codec::{
    decode_data, decode_envelope, decode_json, decode_payload, PayloadKind, PositionReport,
    PowerReading,
};
use meshpipe_crypto::Decryptor;
use meshpipe_domain::{
    CacheStats, FilterStats, NodeFilter, NodeStateCache, NodeUpdate, PipelineStats, RawMessage,
    StatsSnapshot, UpdateKind,
};

use crate::config::PipelineConfig;
use crate::mqtt::RawMessageHandler;

/// Mutable pipeline state. One lock for both pieces: the single bus
/// consumer means the lock is uncontended, and filter and cache must
/// anyway be consistent with each other within one message.
struct PipelineState {
    filter: NodeFilter,
    cache: NodeStateCache,
}

/// Aggregate view for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub pipeline: StatsSnapshot,
    pub filter: FilterStats,
    pub cache: CacheStats,
    pub decryption_keys: usize,
}

/// Orchestrates one raw bus message end to end: topic dispatch, envelope
/// decode, admission, opportunistic decryption, payload decode, and the
/// cache upserts that feed the durable store.
///
/// No error class in here may escape `handle_message`; every failure
/// path increments a counter and moves on.
pub struct Pipeline {
    decryptor: Decryptor,
    state: Mutex<PipelineState>,
    stats: Arc<PipelineStats>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        decryptor: Decryptor,
        filter: NodeFilter,
        cache: NodeStateCache,
        stats: Arc<PipelineStats>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            decryptor,
            state: Mutex::new(PipelineState { filter, cache }),
            stats,
            config,
        }
    }

    /// Seed the cache from the durable store and replay known shortnames
    /// into the filter. Store unavailability is not fatal: the pipeline
    /// starts cold and stays cache-only.
    pub async fn load_existing(&self) -> usize {
        let mut state = self.state.lock().await;
        let loaded = match state.cache.load().await {
            Ok(count) => count,
            Err(error) => {
                warn!(%error, "could not preload node records, starting empty");
                return 0;
            }
        };

        let known: Vec<(u32, String)> = state
            .cache
            .all()
            .filter_map(|record| {
                record
                    .shortname
                    .as_ref()
                    .map(|name| (record.node_id, name.clone()))
            })
            .collect();
        for (node_id, shortname) in known {
            state.filter.update_shortname(node_id, &shortname);
        }

        info!(nodes = loaded, "seeded filter from existing records");
        loaded
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub async fn status_report(&self) -> StatusReport {
        let state = self.state.lock().await;
        StatusReport {
            pipeline: self.stats.snapshot(),
            filter: state.filter.stats(),
            cache: state.cache.stats(),
            decryption_keys: self.decryptor.key_count(),
        }
    }

    pub async fn process(&self, message: RawMessage) {
        self.stats.saw_message();

        if message.topic.contains("/json/") {
            self.handle_json(&message).await;
        } else if message.topic.contains("/e/") {
            self.handle_envelope(&message).await;
        } else {
            debug!(topic = %message.topic, "ignoring message on unhandled topic");
        }
    }

    async fn handle_json(&self, message: &RawMessage) {
        match decode_json(&message.payload) {
            Ok(value) => {
                self.stats.saw_json();
                debug!(topic = %message.topic, %value, "received json packet");
            }
            Err(error) => {
                self.stats.decode_error();
                debug!(topic = %message.topic, %error, "json packet did not decode");
            }
        }
    }

    async fn handle_envelope(&self, message: &RawMessage) {
        let packet = match decode_envelope(&message.payload) {
            Ok(packet) => packet,
            Err(error) => {
                self.stats.decode_error();
                debug!(topic = %message.topic, %error, "envelope did not decode");
                return;
            }
        };
        self.stats.decoded_envelope();

        let from_node = packet.from;
        let mut state = self.state.lock().await;

        if !state.filter.should_process(&packet) {
            self.stats.filtered();
            debug!(
                from_node = %format_args!("{from_node:x}"),
                shortname = state.filter.shortname(from_node),
                "packet filtered out"
            );
            return;
        }

        match packet.payload_variant {
            Some(PayloadVariant::Decoded(ref data)) => {
                let kind = decode_payload(data.portnum, &data.payload);
                self.handle_payload(&mut state, &packet, kind).await;
            }
            Some(PayloadVariant::Encrypted(ref ciphertext)) => {
                self.handle_encrypted(&mut state, &packet, ciphertext).await;
            }
            None => {
                // should_process already rejected this shape.
                debug!(
                    from_node = %format_args!("{from_node:x}"),
                    "packet carries no payload variant"
                );
            }
        }
    }

    async fn handle_encrypted(
        &self,
        state: &mut PipelineState,
        packet: &MeshPacket,
        ciphertext: &[u8],
    ) {
        let from_node = packet.from;

        let Some(plaintext) = self.decryptor.try_decrypt(ciphertext, packet.id, from_node)
        else {
            self.stats.decrypt_failure();
            debug!(
                from_node = %format_args!("{from_node:x}"),
                "no key decrypted packet"
            );
            return;
        };

        // The cipher has no integrity check; parsing is the real test of
        // whether the key was right.
        let data = match decode_data(&plaintext) {
            Ok(data) => data,
            Err(error) => {
                self.stats.decrypt_failure();
                debug!(
                    from_node = %format_args!("{from_node:x}"),
                    %error,
                    "decrypted bytes did not parse"
                );
                return;
            }
        };
        self.stats.decrypted_packet();

        // Admission re-check on the sender id from the clear header.
        if !state.filter.should_process_decrypted(from_node) {
            self.stats.filtered();
            debug!(
                from_node = %format_args!("{from_node:x}"),
                shortname = state.filter.shortname(from_node),
                "decrypted packet filtered out"
            );
            return;
        }

        info!(
            from_node = %format_args!("{from_node:x}"),
            portnum = data.portnum,
            "decrypted packet"
        );
        let kind = decode_payload(data.portnum, &data.payload);
        self.handle_payload(state, packet, kind).await;
    }

    async fn handle_payload(
        &self,
        state: &mut PipelineState,
        packet: &MeshPacket,
        kind: PayloadKind,
    ) {
        let from_node = packet.from;
        self.stats.handled_payload();

        match kind {
            PayloadKind::NodeInfo(user) => {
                if !user.short_name.is_empty() {
                    state.filter.update_shortname(from_node, &user.short_name);
                }
                info!(
                    from_node = %format_args!("{from_node:x}"),
                    short_name = %user.short_name,
                    long_name = %user.long_name,
                    "node info"
                );

                if !state.filter.is_admitted(from_node) {
                    debug!(
                        from_node = %format_args!("{from_node:x}"),
                        "skipping nodeinfo storage for non-admitted node"
                    );
                    return;
                }
                let update = NodeUpdate {
                    shortname: non_empty(user.short_name),
                    longname: non_empty(user.long_name),
                    ..Default::default()
                };
                state.cache.upsert(from_node, update, UpdateKind::Generic).await;
                self.stats.stored_record();
            }

            PayloadKind::Position(position) => {
                let report = PositionReport::from_position(&position);
                let Some((latitude, longitude)) = report.coordinates() else {
                    debug!(
                        from_node = %format_args!("{from_node:x}"),
                        "position without a fix"
                    );
                    return;
                };
                info!(
                    from_node = %format_args!("{from_node:x}"),
                    latitude,
                    longitude,
                    maps_url = report.maps_url().as_deref().unwrap_or(""),
                    "position"
                );

                if !state.filter.is_admitted(from_node) {
                    debug!(
                        from_node = %format_args!("{from_node:x}"),
                        "skipping position storage for non-admitted node"
                    );
                    return;
                }
                let update = NodeUpdate {
                    latitude: Some(latitude),
                    longitude: Some(longitude),
                    ..Default::default()
                };
                state
                    .cache
                    .upsert(from_node, update, UpdateKind::Location)
                    .await;
                self.stats.stored_record();
            }

            PayloadKind::Telemetry(telemetry) => {
                let reading = PowerReading::from_telemetry(&telemetry);
                if reading.is_empty() {
                    debug!(
                        from_node = %format_args!("{from_node:x}"),
                        "telemetry without power metrics"
                    );
                    return;
                }

                if !state.filter.is_admitted(from_node) {
                    debug!(
                        from_node = %format_args!("{from_node:x}"),
                        shortname = state.filter.shortname(from_node),
                        "skipping telemetry storage for non-admitted node"
                    );
                    return;
                }

                match reading.voltage {
                    Some(voltage) if voltage > self.config.min_storage_voltage => {
                        info!(
                            from_node = %format_args!("{from_node:x}"),
                            voltage, "storing power data"
                        );
                        let update = NodeUpdate {
                            voltage: reading.voltage,
                            battery_percent: reading.battery_percent,
                            ..Default::default()
                        };
                        state
                            .cache
                            .upsert(from_node, update, UpdateKind::Battery)
                            .await;
                        self.stats.stored_record();
                    }
                    Some(voltage) => {
                        debug!(
                            from_node = %format_args!("{from_node:x}"),
                            voltage,
                            threshold = self.config.min_storage_voltage,
                            "skipping power data below storage threshold"
                        );
                    }
                    None => {}
                }
            }

            PayloadKind::Text(text) => {
                info!(
                    from_node = %format_args!("{from_node:x}"),
                    shortname = state.filter.shortname(from_node),
                    %text,
                    "text message"
                );
            }

            PayloadKind::Routing(_)
            | PayloadKind::NeighborInfo(_)
            | PayloadKind::Traceroute(_) => {
                debug!(
                    from_node = %format_args!("{from_node:x}"),
                    kind = kind.label(),
                    "mesh control payload"
                );
            }

            PayloadKind::Unknown { portnum, .. } => {
                debug!(
                    from_node = %format_args!("{from_node:x}"),
                    portnum, "payload on unhandled port"
                );
            }

            PayloadKind::DecodeFailure { portnum, .. } => {
                self.stats.decode_error();
                debug!(
                    from_node = %format_args!("{from_node:x}"),
                    portnum, "payload did not decode"
                );
            }
        }
    }
}

#[async_trait]
impl RawMessageHandler for Pipeline {
    async fn handle_message(&self, message: RawMessage) {
        self.process(message).await;
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
