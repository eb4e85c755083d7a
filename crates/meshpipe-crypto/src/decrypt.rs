use aes::cipher::{KeyIvInit, StreamCipher};
use tracing::debug;

use crate::keyring::{KeyMaterial, KeyRing};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Tries every key in the ring against a ciphertext.
///
/// Counter mode carries no integrity check, so every AES key "succeeds"
/// structurally; the first non-empty output is returned and the caller
/// decides whether the plaintext actually parses. Per-key attempts are
/// deliberately silent to keep a busy mesh from flooding the logs.
#[derive(Debug, Clone)]
pub struct Decryptor {
    ring: KeyRing,
}

impl Decryptor {
    pub fn new(ring: KeyRing) -> Self {
        Self { ring }
    }

    pub fn key_count(&self) -> usize {
        self.ring.len()
    }

    /// Attempt decryption with each key in declaration order.
    ///
    /// Returns `None` only when every key produced empty output (or the
    /// ring itself is empty).
    pub fn try_decrypt(
        &self,
        ciphertext: &[u8],
        packet_id: u32,
        from_node: u32,
    ) -> Option<Vec<u8>> {
        for key in self.ring.keys() {
            let plaintext = decrypt_packet(&key.material, ciphertext, packet_id, from_node);
            if !plaintext.is_empty() {
                return Some(plaintext);
            }
        }
        debug!(
            from_node = %format_args!("{from_node:x}"),
            packet_id,
            keys = self.ring.len(),
            "no key produced usable plaintext"
        );
        None
    }
}

/// Decrypt one packet with one key.
///
/// Nonce construction depends on the key length and must stay bit-exact
/// with the radio firmware:
/// - 16-byte key: packet id and sender id each widened to u64, little
///   endian, concatenated (16 bytes).
/// - 32-byte key: packet id and sender id as little-endian u32s, padded
///   with 8 zero bytes.
/// - 1-byte key: no nonce, plain byte-wise XOR.
pub fn decrypt_packet(
    key: &KeyMaterial,
    ciphertext: &[u8],
    packet_id: u32,
    from_node: u32,
) -> Vec<u8> {
    let mut buf = ciphertext.to_vec();
    match key {
        KeyMaterial::Xor(k) => {
            for byte in &mut buf {
                *byte ^= k;
            }
        }
        KeyMaterial::Aes128(k) => {
            let nonce = wide_nonce(packet_id, from_node);
            let mut cipher = Aes128Ctr::new(k.into(), (&nonce).into());
            cipher.apply_keystream(&mut buf);
        }
        KeyMaterial::Aes256(k) => {
            let nonce = packed_nonce(packet_id, from_node);
            let mut cipher = Aes256Ctr::new(k.into(), (&nonce).into());
            cipher.apply_keystream(&mut buf);
        }
    }
    buf
}

/// 16-byte-key nonce: both ids widened to 8 little-endian bytes.
fn wide_nonce(packet_id: u32, from_node: u32) -> [u8; 16] {
    let mut nonce = [0u8; 16];
    nonce[..8].copy_from_slice(&u64::from(packet_id).to_le_bytes());
    nonce[8..].copy_from_slice(&u64::from(from_node).to_le_bytes());
    nonce
}

/// 32-byte-key nonce: two little-endian u32s plus 8 zero bytes.
fn packed_nonce(packet_id: u32, from_node: u32) -> [u8; 16] {
    let mut nonce = [0u8; 16];
    nonce[..4].copy_from_slice(&packet_id.to_le_bytes());
    nonce[4..8].copy_from_slice(&from_node.to_le_bytes());
    nonce
}
