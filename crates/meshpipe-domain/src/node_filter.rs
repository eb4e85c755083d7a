use meshpipe_codec::proto::{mesh_packet::PayloadVariant, MeshPacket, PortNum};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::{DomainError, DomainResult};

/// Shortname-based admission filter.
///
/// NODEINFO broadcasts are the only way to learn which id carries which
/// shortname, so they are always processed; everything else requires the
/// sender to be currently admitted. Encrypted packets pass through
/// unconditionally and admission is re-checked once the sender's payload
/// is readable. The posture is deliberately fail-open: when a decision
/// cannot be evaluated, process the packet rather than silently drop
/// data.
#[derive(Debug)]
pub struct NodeFilter {
    pattern: Regex,
    shortnames: HashMap<u32, String>,
    admitted: HashSet<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total_nodes: usize,
    pub admitted_nodes: usize,
    pub blocked_nodes: usize,
}

impl NodeFilter {
    /// Build a filter from a shortname pattern. The pattern is a
    /// substring search, not a full match. Invalid patterns are a
    /// startup error.
    pub fn new(pattern: &str) -> DomainResult<Self> {
        let compiled = Regex::new(pattern).map_err(|source| DomainError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        info!(pattern, "initialized node filter");
        Ok(Self {
            pattern: compiled,
            shortnames: HashMap::new(),
            admitted: HashSet::new(),
        })
    }

    /// Record a node's shortname and re-evaluate its admission.
    /// Returns whether the node is admitted now.
    pub fn update_shortname(&mut self, node_id: u32, shortname: &str) -> bool {
        self.shortnames.insert(node_id, shortname.to_string());

        if self.pattern.is_match(shortname) {
            if self.admitted.insert(node_id) {
                info!(
                    node_id = %format_args!("{node_id:x}"),
                    shortname, "node admitted"
                );
            }
            true
        } else {
            if self.admitted.remove(&node_id) {
                debug!(
                    node_id = %format_args!("{node_id:x}"),
                    shortname, "node no longer admitted"
                );
            }
            false
        }
    }

    pub fn is_admitted(&self, node_id: u32) -> bool {
        self.admitted.contains(&node_id)
    }

    /// Last-known shortname, `"unknown"` for strangers.
    pub fn shortname(&self, node_id: u32) -> &str {
        self.shortnames
            .get(&node_id)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    /// Pre-decryption decision for a whole packet.
    pub fn should_process(&self, packet: &MeshPacket) -> bool {
        match &packet.payload_variant {
            Some(PayloadVariant::Decoded(data)) => {
                if data.portnum == PortNum::NodeinfoApp as i32 {
                    // Sole source of shortname learning; never filtered.
                    true
                } else {
                    self.is_admitted(packet.from)
                }
            }
            // Sender identity is only trustworthy after decryption.
            Some(PayloadVariant::Encrypted(_)) => true,
            None => false,
        }
    }

    /// Post-decryption re-check, keyed on the envelope's sender id.
    pub fn should_process_decrypted(&self, from_node: u32) -> bool {
        self.is_admitted(from_node)
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            total_nodes: self.shortnames.len(),
            admitted_nodes: self.admitted.len(),
            blocked_nodes: self.shortnames.len() - self.admitted.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_SHORTNAME_PATTERN;
    use meshpipe_codec::proto::Data;

    fn default_filter() -> NodeFilter {
        NodeFilter::new(DEFAULT_SHORTNAME_PATTERN).unwrap()
    }

    fn decoded_packet(from: u32, portnum: PortNum) -> MeshPacket {
        MeshPacket {
            from,
            payload_variant: Some(PayloadVariant::Decoded(Data {
                portnum: portnum as i32,
                payload: vec![0x01],
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    #[test]
    fn invalid_pattern_is_a_startup_error() {
        assert!(matches!(
            NodeFilter::new("BB[").unwrap_err(),
            DomainError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn matching_shortname_admits() {
        let mut filter = default_filter();
        assert!(filter.update_shortname(42, "BB07"));
        assert!(filter.is_admitted(42));
    }

    #[test]
    fn shortname_change_revokes_admission() {
        let mut filter = default_filter();
        assert!(filter.update_shortname(42, "BB07"));
        assert!(!filter.update_shortname(42, "XX07"));
        assert!(!filter.is_admitted(42));
        // The shortname itself is still remembered.
        assert_eq!(filter.shortname(42), "XX07");
    }

    #[test]
    fn pattern_is_substring_search() {
        let mut filter = default_filter();
        assert!(filter.update_shortname(1, "relay-BB23-east"));
    }

    #[test]
    fn nodeinfo_always_passes() {
        let filter = default_filter();
        let packet = decoded_packet(0x999, PortNum::NodeinfoApp);
        assert!(filter.should_process(&packet));
    }

    #[test]
    fn other_ports_require_admission() {
        let mut filter = default_filter();
        let packet = decoded_packet(0x999, PortNum::PositionApp);
        assert!(!filter.should_process(&packet));

        filter.update_shortname(0x999, "BB11");
        assert!(filter.should_process(&packet));
    }

    #[test]
    fn encrypted_always_passes_pre_decryption() {
        let filter = default_filter();
        let packet = MeshPacket {
            from: 0x123,
            payload_variant: Some(PayloadVariant::Encrypted(vec![0xAA])),
            ..Default::default()
        };
        assert!(filter.should_process(&packet));
        // Post-decryption check still applies.
        assert!(!filter.should_process_decrypted(0x123));
    }

    #[test]
    fn packet_without_variant_is_dropped() {
        let filter = default_filter();
        assert!(!filter.should_process(&MeshPacket::default()));
    }

    #[test]
    fn unknown_node_has_placeholder_shortname() {
        let filter = default_filter();
        assert_eq!(filter.shortname(7), "unknown");
    }

    #[test]
    fn stats_track_admitted_and_blocked() {
        let mut filter = default_filter();
        filter.update_shortname(1, "BB01");
        filter.update_shortname(2, "CC02");
        filter.update_shortname(3, "BB03");
        assert_eq!(
            filter.stats(),
            FilterStats {
                total_nodes: 3,
                admitted_nodes: 2,
                blocked_nodes: 1
            }
        );
    }
}
