use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::info;

use crate::error::{KeyError, Result};

/// Key material, classified by length at construction time.
///
/// The length decides the whole decryption algorithm (§nonce rules in
/// [`crate::decrypt`]), so an unsupported length is a configuration
/// error, not a runtime decryption failure.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Byte-wise stream XOR, no nonce.
    Xor(u8),
    /// AES-128 in counter mode.
    Aes128([u8; 16]),
    /// AES-256 in counter mode.
    Aes256([u8; 32]),
}

impl KeyMaterial {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            1 => Ok(Self::Xor(bytes[0])),
            16 => {
                let mut key = [0u8; 16];
                key.copy_from_slice(bytes);
                Ok(Self::Aes128(key))
            }
            32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(bytes);
                Ok(Self::Aes256(key))
            }
            other => Err(KeyError::UnsupportedLength(other)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Xor(_) => 1,
            Self::Aes128(_) => 16,
            Self::Aes256(_) => 32,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for KeyMaterial {
    // Key bytes never reach logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial({} bytes)", self.len())
    }
}

/// A candidate decryption key with a human-readable description for
/// startup logging and diagnostics.
#[derive(Debug, Clone)]
pub struct DecryptionKey {
    pub material: KeyMaterial,
    pub description: String,
}

impl DecryptionKey {
    pub fn from_bytes(bytes: &[u8], description: impl Into<String>) -> Result<Self> {
        Ok(Self {
            material: KeyMaterial::from_bytes(bytes)?,
            description: description.into(),
        })
    }

    /// Parse a key from its base64 form as carried in configuration.
    pub fn from_base64(encoded: &str, description: impl Into<String>) -> Result<Self> {
        let description = description.into();
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|source| KeyError::InvalidBase64 {
                description: description.clone(),
                source,
            })?;
        Self::from_bytes(&bytes, description)
    }
}

/// Ordered list of candidate keys, tried in declaration order.
///
/// Immutable after construction; cloning is cheap enough for the single
/// pipeline this serves.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: Vec<DecryptionKey>,
}

impl KeyRing {
    pub fn new(keys: Vec<DecryptionKey>) -> Self {
        for key in &keys {
            info!(
                description = %key.description,
                key_len = key.material.len(),
                "loaded decryption key"
            );
        }
        Self { keys }
    }

    pub fn keys(&self) -> &[DecryptionKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
