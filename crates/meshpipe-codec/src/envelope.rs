use prost::Message;
use tracing::debug;

use crate::error::{CodecError, Result};
use crate::proto::{Data, MeshPacket, ServiceEnvelope};

/// Decode the outer wire wrapper and extract its packet.
///
/// Decode failure is data, not a fault: callers drop the message and
/// count it. An envelope without a packet field is treated the same way.
pub fn decode_envelope(bytes: &[u8]) -> Result<MeshPacket> {
    let envelope = ServiceEnvelope::decode(bytes)?;
    debug!(
        gateway_id = %envelope.gateway_id,
        channel_id = %envelope.channel_id,
        "decoded service envelope"
    );
    envelope.packet.ok_or(CodecError::MissingPacket)
}

/// Parse decrypted plaintext as an application payload.
///
/// Counter-mode decryption succeeds structurally with any key, so a
/// wrong key usually yields bytes that either fail to parse or parse to
/// a message with no fields set. Both cases are rejected here; this is
/// the real validation step for opportunistic decryption.
pub fn decode_data(bytes: &[u8]) -> Result<Data> {
    let data = Data::decode(bytes)?;
    if data == Data::default() {
        return Err(CodecError::EmptyData);
    }
    Ok(data)
}

/// Parse a JSON-topic payload.
pub fn decode_json(bytes: &[u8]) -> Result<serde_json::Value> {
    let text = std::str::from_utf8(bytes)?;
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{mesh_packet, PortNum};

    fn envelope_bytes(packet: Option<MeshPacket>) -> Vec<u8> {
        ServiceEnvelope {
            packet,
            channel_id: "LongFast".to_string(),
            gateway_id: "!cafe0001".to_string(),
        }
        .encode_to_vec()
    }

    #[test]
    fn decodes_envelope_with_packet() {
        let bytes = envelope_bytes(Some(MeshPacket {
            from: 0x1234,
            id: 7,
            ..Default::default()
        }));
        let packet = decode_envelope(&bytes).unwrap();
        assert_eq!(packet.from, 0x1234);
        assert_eq!(packet.id, 7);
    }

    #[test]
    fn envelope_without_packet_is_an_error() {
        let bytes = envelope_bytes(None);
        assert!(matches!(
            decode_envelope(&bytes),
            Err(CodecError::MissingPacket)
        ));
    }

    #[test]
    fn truncated_envelope_is_an_error_not_a_panic() {
        let mut bytes = envelope_bytes(Some(MeshPacket {
            from: 1,
            payload_variant: Some(mesh_packet::PayloadVariant::Encrypted(vec![0xAA; 32])),
            ..Default::default()
        }));
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            decode_envelope(&bytes),
            Err(CodecError::Envelope(_))
        ));
    }

    #[test]
    fn garbage_envelope_is_an_error() {
        assert!(decode_envelope(&[0xFF, 0xFF, 0xFF, 0x00, 0x13]).is_err());
    }

    #[test]
    fn data_with_fields_parses() {
        let bytes = Data {
            portnum: PortNum::TextMessageApp as i32,
            payload: b"ping".to_vec(),
            ..Default::default()
        }
        .encode_to_vec();
        let data = decode_data(&bytes).unwrap();
        assert_eq!(data.payload, b"ping");
    }

    #[test]
    fn empty_data_is_rejected() {
        // A wrong decryption key frequently produces an empty buffer or
        // bytes that parse to an all-default message.
        assert!(matches!(decode_data(&[]), Err(CodecError::EmptyData)));
    }

    #[test]
    fn json_object_parses() {
        let value = decode_json(br#"{"from": 305419896, "type": "position"}"#).unwrap();
        assert_eq!(value["type"], "position");
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(decode_json(b"{not json").is_err());
        assert!(decode_json(&[0xC0, 0x80]).is_err());
    }
}
