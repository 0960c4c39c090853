use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::types::DecryptionError;

/// Length of a secretbox key in bytes
pub const KEY_LENGTH: usize = 32;

/// Per-channel symmetric key.
///
/// `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; KEY_LENGTH]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Decodes the base64 `shared_secret` returned by an authorizer
    pub fn from_base64(encoded: &str) -> Result<Self, DecryptionError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| DecryptionError::InvalidKey(e.to_string()))?;
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            DecryptionError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}
