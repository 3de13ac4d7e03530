use twoqr_types::{u2f::PublicKey, KeyProviderError};

mod software;

pub use software::SoftwareKeyProvider;

/// Pluggable keystore holding the device's P-256 private keys.
///
/// Private keys never leave the provider. Keys are addressed by their base64url key handle, which
/// is also the `keyID` the relying party echoes back in authentication messages.
#[cfg_attr(any(test, feature = "testable"), mockall::automock)]
#[async_trait::async_trait]
pub trait KeyProvider {
    /// Whether a key exists under `key_id`.
    async fn has_key(&self, key_id: &str) -> bool;

    /// Create a P-256 key under `key_id` and return its public half. Calling it again for an
    /// existing key returns the same public key.
    ///
    /// Fails with [`KeyProviderError::KeyGenUnsupported`] when the keystore has no P-256 support
    /// and with [`KeyProviderError::InsecureDevice`] when the device is not protected by a lock.
    async fn generate_key(&mut self, key_id: &str) -> Result<PublicKey, KeyProviderError>;

    /// ECDSA sign `message` with SHA-256, returning the DER encoded signature.
    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>, KeyProviderError>;

    /// The X.509 DER attestation certificate for `key_id`. May be empty.
    async fn export_certificate(&self, key_id: &str) -> Result<Vec<u8>, KeyProviderError>;

    /// Delete the key under `key_id`. Deleting a key that does not exist is not an error.
    async fn delete_key(&mut self, key_id: &str) -> Result<(), KeyProviderError>;

    /// Delete every key.
    async fn clear(&mut self) -> Result<(), KeyProviderError>;
}

#[cfg(any(test, feature = "testable"))]
impl MockKeyProvider {
    /// A keystore which refuses to create keys with `error`, and has no keys to sign with.
    pub fn failing_generation(error: KeyProviderError) -> Self {
        let mut keys = MockKeyProvider::new();
        keys.expect_has_key().returning(|_| false);
        keys.expect_generate_key()
            .returning(move |_| Err(error.clone()))
            .once();
        keys.expect_sign().never();
        keys
    }
}
