use prost::Message;
use tracing::debug;

use crate::proto::{
    NeighborInfo, PortNum, Position, RouteDiscovery, Routing, Telemetry, User,
};

/// A decoded per-port payload.
///
/// Total by construction: unknown ports and malformed payloads are
/// variants, not errors, so decode failure can never escape the codec
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadKind {
    Text(String),
    Telemetry(Telemetry),
    Position(Position),
    NodeInfo(User),
    Routing(Routing),
    NeighborInfo(NeighborInfo),
    Traceroute(RouteDiscovery),
    /// Port we do not dispatch on; raw bytes passed through.
    Unknown { portnum: i32, payload: Vec<u8> },
    /// Known port whose payload failed to parse; raw bytes retained.
    DecodeFailure { portnum: i32, payload: Vec<u8> },
}

impl PayloadKind {
    /// Short tag for logging and counters.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Telemetry(_) => "telemetry",
            Self::Position(_) => "position",
            Self::NodeInfo(_) => "nodeinfo",
            Self::Routing(_) => "routing",
            Self::NeighborInfo(_) => "neighborinfo",
            Self::Traceroute(_) => "traceroute",
            Self::Unknown { .. } => "unknown",
            Self::DecodeFailure { .. } => "decode_error",
        }
    }
}

/// Dispatch a payload by application port number.
pub fn decode_payload(portnum: i32, payload: &[u8]) -> PayloadKind {
    let port = match PortNum::try_from(portnum) {
        Ok(port) => port,
        Err(_) => {
            return PayloadKind::Unknown {
                portnum,
                payload: payload.to_vec(),
            }
        }
    };

    let decoded = match port {
        PortNum::TextMessageApp => std::str::from_utf8(payload)
            .map(|text| PayloadKind::Text(text.to_string()))
            .map_err(|e| e.to_string()),
        PortNum::TelemetryApp => Telemetry::decode(payload)
            .map(PayloadKind::Telemetry)
            .map_err(|e| e.to_string()),
        PortNum::PositionApp => Position::decode(payload)
            .map(PayloadKind::Position)
            .map_err(|e| e.to_string()),
        PortNum::NodeinfoApp => User::decode(payload)
            .map(PayloadKind::NodeInfo)
            .map_err(|e| e.to_string()),
        PortNum::RoutingApp => Routing::decode(payload)
            .map(PayloadKind::Routing)
            .map_err(|e| e.to_string()),
        PortNum::NeighborinfoApp => NeighborInfo::decode(payload)
            .map(PayloadKind::NeighborInfo)
            .map_err(|e| e.to_string()),
        PortNum::TracerouteApp => RouteDiscovery::decode(payload)
            .map(PayloadKind::Traceroute)
            .map_err(|e| e.to_string()),
        _ => {
            return PayloadKind::Unknown {
                portnum,
                payload: payload.to_vec(),
            }
        }
    };

    match decoded {
        Ok(kind) => kind,
        Err(error) => {
            debug!(portnum, %error, "payload decode failed");
            PayloadKind::DecodeFailure {
                portnum,
                payload: payload.to_vec(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_decodes_as_utf8() {
        let kind = decode_payload(PortNum::TextMessageApp as i32, "hello mesh".as_bytes());
        assert_eq!(kind, PayloadKind::Text("hello mesh".to_string()));
    }

    #[test]
    fn invalid_utf8_text_is_a_decode_failure() {
        let kind = decode_payload(PortNum::TextMessageApp as i32, &[0xFF, 0xFE]);
        assert!(matches!(kind, PayloadKind::DecodeFailure { portnum: 1, .. }));
    }

    #[test]
    fn nodeinfo_decodes() {
        let user = User {
            id: "!aabbcc".to_string(),
            long_name: "Base Station 42".to_string(),
            short_name: "BB42".to_string(),
            ..Default::default()
        };
        let kind = decode_payload(PortNum::NodeinfoApp as i32, &user.encode_to_vec());
        match kind {
            PayloadKind::NodeInfo(decoded) => assert_eq!(decoded.short_name, "BB42"),
            other => panic!("expected NodeInfo, got {}", other.label()),
        }
    }

    #[test]
    fn position_decodes() {
        let position = Position {
            latitude_i: 377749000,
            longitude_i: -1224194000,
            ..Default::default()
        };
        let kind = decode_payload(PortNum::PositionApp as i32, &position.encode_to_vec());
        match kind {
            PayloadKind::Position(decoded) => {
                assert_eq!(decoded.latitude_i, 377749000);
                assert_eq!(decoded.longitude_i, -1224194000);
            }
            other => panic!("expected Position, got {}", other.label()),
        }
    }

    #[test]
    fn unknown_port_passes_raw_bytes_through() {
        let kind = decode_payload(440, &[0xDE, 0xAD]);
        assert_eq!(
            kind,
            PayloadKind::Unknown {
                portnum: 440,
                payload: vec![0xDE, 0xAD]
            }
        );
    }

    #[test]
    fn undispatched_known_port_is_unknown() {
        // ADMIN is in the schema but not in our dispatch table.
        let kind = decode_payload(PortNum::AdminApp as i32, &[0x01]);
        assert!(matches!(kind, PayloadKind::Unknown { portnum: 6, .. }));
    }

    #[test]
    fn malformed_known_port_is_a_decode_failure_not_a_panic() {
        // 0xFF repeated is an invalid varint stream for these messages.
        let bad = vec![0x0A, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let kind = decode_payload(PortNum::TelemetryApp as i32, &bad);
        assert!(matches!(
            kind,
            PayloadKind::DecodeFailure { portnum: 67, .. }
        ));
    }

    #[test]
    fn traceroute_decodes_route_list() {
        let discovery = RouteDiscovery {
            route: vec![0x11, 0x22, 0x33],
            ..Default::default()
        };
        let kind = decode_payload(PortNum::TracerouteApp as i32, &discovery.encode_to_vec());
        match kind {
            PayloadKind::Traceroute(decoded) => assert_eq!(decoded.route.len(), 3),
            other => panic!("expected Traceroute, got {}", other.label()),
        }
    }
}
