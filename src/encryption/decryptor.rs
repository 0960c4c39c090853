use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::SharedSecret;
use crate::messaging::PusherEvent;
use crate::types::DecryptionError;

/// Length of a secretbox nonce in bytes
pub const NONCE_LENGTH: usize = 24;

/// Wire shape of an encrypted channel's `data`
#[derive(Debug, Clone, Deserialize)]
struct EncryptedPayload {
    nonce: String,
    ciphertext: String,
}

/// Holds per-channel keys and decrypts payloads of private-encrypted channels
#[derive(Debug, Default)]
pub struct EncryptionModule {
    keys: RwLock<HashMap<String, SharedSecret>>,
}

impl EncryptionModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the key for `channel`, replacing any previous one
    pub async fn register_key(&self, channel: &str, secret: SharedSecret) {
        self.keys.write().await.insert(channel.to_string(), secret);
        tracing::debug!("Registered key for channel {}", channel);
    }

    /// Discards the key for `channel`; returns whether one was registered
    pub async fn remove_key(&self, channel: &str) -> bool {
        self.keys.write().await.remove(channel).is_some()
    }

    pub async fn has_key(&self, channel: &str) -> bool {
        self.keys.read().await.contains_key(channel)
    }

    /// Decrypts `event`'s data with the key registered for `channel`.
    ///
    /// On success the returned event is identical to the input except that `data` holds
    /// the plaintext. Failures leave the key in place.
    pub async fn decrypt(
        &self,
        channel: &str,
        event: &PusherEvent,
    ) -> Result<PusherEvent, DecryptionError> {
        let cipher = {
            let keys = self.keys.read().await;
            let secret = keys
                .get(channel)
                .ok_or_else(|| DecryptionError::KeyNotFound(channel.to_string()))?;
            XSalsa20Poly1305::new_from_slice(secret.as_bytes())
                .map_err(|e| DecryptionError::InvalidKey(e.to_string()))?
        };

        let payload: EncryptedPayload = event.data_as().ok_or_else(|| {
            DecryptionError::MalformedPayload("expected {nonce, ciphertext} object".to_string())
        })?;
        let nonce = decode_field("nonce", &payload.nonce)?;
        if nonce.len() != NONCE_LENGTH {
            return Err(DecryptionError::MalformedPayload(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LENGTH,
                nonce.len()
            )));
        }
        let ciphertext = decode_field("ciphertext", &payload.ciphertext)?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| DecryptionError::AuthenticationFailed(channel.to_string()))?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| {
            DecryptionError::MalformedPayload("plaintext is not UTF-8".to_string())
        })?;

        Ok(event.with_data(plaintext))
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, DecryptionError> {
    STANDARD
        .decode(value)
        .map_err(|e| DecryptionError::MalformedPayload(format!("{}: {}", name, e)))
}
