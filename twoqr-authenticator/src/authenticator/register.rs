use twoqr_types::{
    encoding,
    message::RegistrationMessage,
    rand::random_array,
    relying_party::{RegistrationPayload, RelyingPartyInfo},
    u2f::{PublicKey, RegisterResponse},
    ClientData, KeyRecord, ProtocolError, ServerRecord,
};

use super::Authenticator;
use crate::{user_approval::RegistrationPrompt, CredentialStore, KeyProvider};

/// Length of a freshly generated key handle, before base64url.
pub const KEY_HANDLE_LEN: usize = 16;

/// A signed registration response waiting for the relying party's verdict.
///
/// Nothing was written to the store yet. Pass it to [`Authenticator::commit_registration`] once
/// the relying party accepted it, or drop it.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    server: ServerRecord,
    key: KeyRecord,
    client_data: String,
    registration_data: String,
}

impl PendingRegistration {
    /// The server this registration is for.
    pub fn server(&self) -> &ServerRecord {
        &self.server
    }

    /// The key that will be stored.
    pub fn key(&self) -> &KeyRecord {
        &self.key
    }

    /// What to show the user before sending the registration.
    pub fn prompt(&self) -> RegistrationPrompt {
        RegistrationPrompt {
            app_name: self.server.app_name.clone(),
            app_url: self.server.app_url.clone(),
            user_id: self.key.user_id.clone(),
        }
    }

    /// The body for `POST <appURL>/register`.
    pub fn payload(
        &self,
        device_name: impl Into<String>,
        fcm_token: Option<String>,
    ) -> RegistrationPayload {
        RegistrationPayload {
            client_data: self.client_data.clone(),
            registration_data: self.registration_data.clone(),
            device_name: device_name.into(),
            fcm_token,
        }
    }
}

impl<S, K> Authenticator<S, K>
where
    S: CredentialStore,
    K: KeyProvider,
{
    /// Build a signed registration response for `message`, using the relying party `info`
    /// fetched from its info URL.
    ///
    /// A fresh 16 byte key handle is generated along with a new key. The store is only read.
    pub async fn register(
        &mut self,
        message: &RegistrationMessage,
        info: RelyingPartyInfo,
    ) -> Result<PendingRegistration, ProtocolError> {
        if info.app_id_bytes().is_none() {
            return Err(ProtocolError::InvalidRelyingPartyInfo(
                "appID is not base64url of 32 bytes".into(),
            ));
        }
        let server = ServerRecord::from(info);

        if self
            .store
            .is_user_already_registered(message.user_id(), &server.app_id)
            .await?
        {
            log::warn!(
                "{} is already registered with {}",
                message.user_id(),
                server.app_id
            );
            return Err(ProtocolError::DuplicateRegistration);
        }

        let key_handle = random_array::<KEY_HANDLE_LEN>();
        let key_id = encoding::base64url(&key_handle);
        let public_key = self.keys.generate_key(&key_id).await?;

        let client_data = ClientData::enrollment(message.challenge(), server.app_url.as_str());
        let response = match self
            .sign_registration(&server, &client_data, &key_handle, public_key)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.forget_key(&key_id).await;
                return Err(err);
            }
        };
        log::debug!("built registration for {} with key {key_id}", server.app_id);

        Ok(PendingRegistration {
            key: KeyRecord::new(key_id, server.app_id.as_str(), message.user_id()),
            server,
            client_data: client_data.to_base64url(),
            registration_data: encoding::base64url(&response.encode()),
        })
    }

    /// Give up on a registration the user or the relying party did not accept, deleting the key
    /// generated for it.
    pub async fn discard_registration(
        &mut self,
        pending: PendingRegistration,
    ) -> Result<(), ProtocolError> {
        self.keys.delete_key(&pending.key.key_id).await?;
        log::debug!("discarded key {}", pending.key.key_id);
        Ok(())
    }

    /// Record a registration the relying party accepted: its server, then its key.
    pub async fn commit_registration(
        &mut self,
        pending: PendingRegistration,
    ) -> Result<(), ProtocolError> {
        let PendingRegistration { server, key, .. } = pending;
        self.store.insert_server(server).await?;
        let (key_id, app_id) = (key.key_id.clone(), key.app_id.clone());
        self.store.insert_key(key).await?;
        log::info!("registered key {key_id} with {app_id}");
        Ok(())
    }

    async fn sign_registration(
        &self,
        server: &ServerRecord,
        client_data: &ClientData,
        key_handle: &[u8; KEY_HANDLE_LEN],
        public_key: PublicKey,
    ) -> Result<RegisterResponse, ProtocolError> {
        let key_id = encoding::base64url(key_handle);
        let application = self.application_parameter(server)?;
        let challenge = client_data.hash();

        let signature_target =
            RegisterResponse::signature_target(&application, &challenge, key_handle, public_key);
        let signature = self.keys.sign(&key_id, &signature_target).await?;
        let attestation_certificate = self.keys.export_certificate(&key_id).await?;

        Ok(RegisterResponse {
            public_key,
            key_handle: key_handle.to_vec(),
            attestation_certificate,
            signature,
        })
    }

    /// Best effort removal of a key nothing will reference.
    async fn forget_key(&mut self, key_id: &str) {
        if let Err(err) = self.keys.delete_key(key_id).await {
            log::error!("could not delete unused key {key_id}: {err}");
        }
    }
}
