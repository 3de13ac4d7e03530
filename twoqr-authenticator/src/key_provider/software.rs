use std::collections::HashMap;

use p256::{
    ecdsa::{signature::Signer, SigningKey},
    SecretKey,
};
use twoqr_types::{u2f::PublicKey, KeyProviderError};

use super::KeyProvider;

/// A [`KeyProvider`] keeping P-256 keys in memory.
///
/// Useful for tests and for platforms without a hardware keystore. Nothing is persisted, so keys
/// are lost when the provider is dropped.
pub struct SoftwareKeyProvider {
    keys: HashMap<String, SigningKey>,
    secure: bool,
    certificate: Vec<u8>,
}

impl Default for SoftwareKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareKeyProvider {
    /// An empty provider which reports a secure device and no attestation certificate.
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
            secure: true,
            certificate: Vec::new(),
        }
    }

    /// A provider on a device without a lock screen. Key generation fails with
    /// [`KeyProviderError::InsecureDevice`].
    pub fn insecure() -> Self {
        Self {
            secure: false,
            ..Self::new()
        }
    }

    /// Builder method for the DER certificate returned by [`KeyProvider::export_certificate`].
    pub fn certificate(self, certificate: Vec<u8>) -> Self {
        Self {
            certificate,
            ..self
        }
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key was generated yet.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn public_key(signing_key: &SigningKey) -> Result<PublicKey, KeyProviderError> {
        let encoded = signing_key.verifying_key().to_encoded_point(false);
        PublicKey::from_uncompressed(encoded.as_bytes())
            .ok_or_else(|| KeyProviderError::Keystore("malformed public key".into()))
    }
}

#[async_trait::async_trait]
impl KeyProvider for SoftwareKeyProvider {
    async fn has_key(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    async fn generate_key(&mut self, key_id: &str) -> Result<PublicKey, KeyProviderError> {
        if !self.secure {
            return Err(KeyProviderError::InsecureDevice);
        }
        if let Some(existing) = self.keys.get(key_id) {
            return Self::public_key(existing);
        }

        let private_key = {
            let mut rng = rand::thread_rng();
            SecretKey::random(&mut rng)
        };
        let signing_key = SigningKey::from(private_key);
        let public_key = Self::public_key(&signing_key)?;
        self.keys.insert(key_id.to_owned(), signing_key);
        Ok(public_key)
    }

    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        let signing_key = self.keys.get(key_id).ok_or(KeyProviderError::KeyNotFound)?;
        let signature: p256::ecdsa::Signature = signing_key.sign(message);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    async fn export_certificate(&self, key_id: &str) -> Result<Vec<u8>, KeyProviderError> {
        if !self.keys.contains_key(key_id) {
            return Err(KeyProviderError::KeyNotFound);
        }
        Ok(self.certificate.clone())
    }

    async fn delete_key(&mut self, key_id: &str) -> Result<(), KeyProviderError> {
        self.keys.remove(key_id);
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), KeyProviderError> {
        self.keys.clear();
        Ok(())
    }
}
