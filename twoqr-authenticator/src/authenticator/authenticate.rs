use twoqr_types::{
    encoding,
    message::AuthenticationMessage,
    relying_party::AuthenticationPayload,
    u2f::{AuthenticationResponse, UserPresence},
    ClientData, KeyRecord, ProtocolError, ServerRecord,
};

use super::Authenticator;
use crate::{user_approval::ApprovalPrompt, CredentialStore, KeyProvider};

/// An authentication request that passed the counter check, with everything needed to prompt
/// the user and sign.
#[derive(Debug, Clone)]
pub struct AuthenticationContext {
    server: ServerRecord,
    key: KeyRecord,
    challenge: String,
    server_counter: u32,
    missed: u32,
}

impl AuthenticationContext {
    /// The relying party.
    pub fn server(&self) -> &ServerRecord {
        &self.server
    }

    /// The key that will sign.
    pub fn key(&self) -> &KeyRecord {
        &self.key
    }

    /// The relying party's challenge, base64url of 32 bytes.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// The counter the relying party sent, which the assertion will carry.
    pub fn server_counter(&self) -> u32 {
        self.server_counter
    }

    /// Challenges issued by the relying party for this key that never reached the device.
    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// What to show the user before signing.
    pub fn prompt(&self) -> ApprovalPrompt {
        ApprovalPrompt {
            app_name: self.server.app_name.clone(),
            app_url: self.server.app_url.clone(),
            user_id: self.key.user_id.clone(),
            missed: self.missed,
        }
    }
}

/// A signed assertion waiting for the relying party's verdict.
///
/// The counter was not advanced yet. Pass it to [`Authenticator::confirm_assertion`] once the
/// relying party accepted it, or drop it.
#[derive(Debug, Clone)]
pub struct PendingAssertion {
    key_id: String,
    counter: u32,
    payload: AuthenticationPayload,
}

impl PendingAssertion {
    /// The key that signed.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The counter the assertion carries.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// The body for `POST <appURL>/auth`.
    pub fn payload(&self) -> &AuthenticationPayload {
        &self.payload
    }
}

impl<S, K> Authenticator<S, K>
where
    S: CredentialStore,
    K: KeyProvider,
{
    /// Look up the key and server `message` refers to and enforce the anti-replay rule: the
    /// relying party's counter must be strictly greater than the stored one.
    ///
    /// Nothing is signed and nothing is written.
    pub async fn check_counter(
        &self,
        message: &AuthenticationMessage,
    ) -> Result<AuthenticationContext, ProtocolError> {
        let key = self
            .store
            .get_key(message.key_id())
            .await?
            .ok_or(ProtocolError::UnknownCredential)?;
        if key.app_id != message.app_id() {
            log::warn!(
                "key {} belongs to {}, not {}",
                key.key_id,
                key.app_id,
                message.app_id()
            );
            return Err(ProtocolError::UnknownCredential);
        }
        let server = self
            .store
            .get_server(message.app_id())
            .await?
            .ok_or(ProtocolError::UnknownServer)?;

        let local_counter = key.counter;
        let server_counter = message.counter();
        if server_counter <= local_counter {
            log::warn!(
                "rejecting stale challenge for key {}: server counter {server_counter}, local counter {local_counter}",
                key.key_id
            );
            return Err(ProtocolError::ReplayOrStaleChallenge {
                local_counter,
                server_counter,
            });
        }
        let missed = server_counter - local_counter - 1;
        if missed > 0 {
            log::debug!("{missed} challenges for key {} never arrived", key.key_id);
        }

        Ok(AuthenticationContext {
            server,
            key,
            challenge: message.challenge().to_owned(),
            server_counter,
            missed,
        })
    }

    /// Sign an assertion for a request that passed [`Authenticator::check_counter`] and that the
    /// user approved.
    ///
    /// The stored counter is read again right before signing, since it may have advanced while
    /// the user was being asked.
    pub async fn authenticate(
        &self,
        context: &AuthenticationContext,
    ) -> Result<PendingAssertion, ProtocolError> {
        let local_counter = self.store.get_counter(&context.key.key_id).await?;
        let counter = context.server_counter;
        if counter <= local_counter {
            log::warn!(
                "counter of key {} moved to {local_counter} before signing {counter}",
                context.key.key_id
            );
            return Err(ProtocolError::ReplayOrStaleChallenge {
                local_counter,
                server_counter: counter,
            });
        }

        let client_data =
            ClientData::assertion(context.challenge.as_str(), context.server.app_url.as_str());
        let application = self.application_parameter(&context.server)?;
        let challenge = client_data.hash();
        let user_presence = UserPresence::PRESENT;

        let signature_target = AuthenticationResponse::signature_target(
            &application,
            user_presence,
            counter,
            &challenge,
        );
        let signature = self
            .keys
            .sign(&context.key.key_id, &signature_target)
            .await?;

        let response = AuthenticationResponse {
            user_presence,
            counter,
            signature,
        };
        log::debug!(
            "signed assertion with key {} at counter {counter}",
            context.key.key_id
        );

        Ok(PendingAssertion {
            key_id: context.key.key_id.clone(),
            counter,
            payload: AuthenticationPayload {
                client_data: client_data.to_base64url(),
                signature_data: encoding::base64url(&response.encode()),
            },
        })
    }

    /// Advance the key's counter to the one of an assertion the relying party accepted.
    pub async fn confirm_assertion(
        &mut self,
        pending: &PendingAssertion,
    ) -> Result<(), ProtocolError> {
        self.store
            .set_counter(&pending.key_id, pending.counter)
            .await?;
        log::info!(
            "counter of key {} advanced to {}",
            pending.key_id,
            pending.counter
        );
        Ok(())
    }
}
