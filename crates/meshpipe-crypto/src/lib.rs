pub mod decrypt;
mod error;
pub mod keyring;

pub use decrypt::Decryptor;
pub use error::{KeyError, Result};
pub use keyring::{DecryptionKey, KeyMaterial, KeyRing};
