// Encryption module - Shared secrets and payload decryption for private-encrypted channels
mod decryptor;
mod secret;

pub use decryptor::{EncryptionModule, NONCE_LENGTH};
pub use secret::{KEY_LENGTH, SharedSecret};

#[cfg(test)]
pub(crate) use decryptor::tests::encrypted_frame;
