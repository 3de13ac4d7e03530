use twoqr_types::{crypto::sha256, encoding, ProtocolError, ServerRecord};

use crate::{CredentialStore, KeyProvider};

mod authenticate;
mod register;

pub use self::{
    authenticate::{AuthenticationContext, PendingAssertion},
    register::PendingRegistration,
};

#[cfg(test)]
mod tests;

/// Which bytes are hashed into the U2F application parameter.
///
/// The same choice applies to registration and authentication, a relying party verifying
/// signatures has to use it as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppParameter {
    /// SHA-256 of the relying party's `appURL` text, as U2F does with the facet.
    #[default]
    AppUrl,
    /// SHA-256 of the 32 decoded `appID` bytes.
    AppId,
}

/// The device authenticator: owns the credential store and the keystore and builds signed U2F
/// responses.
///
/// The authenticator never talks to the network. Registration and authentication are split in
/// two steps: building the response, then committing its effect on the store once the relying
/// party accepted it.
pub struct Authenticator<S, K> {
    /// Provides credential storage capabilities
    store: S,
    /// Holds the private keys
    keys: K,
    /// How the application parameter is computed
    app_parameter: AppParameter,
}

impl<S, K> Authenticator<S, K>
where
    S: CredentialStore,
    K: KeyProvider,
{
    /// Create an authenticator with a backing storage and a keystore.
    pub fn new(store: S, keys: K) -> Self {
        Self {
            store,
            keys,
            app_parameter: AppParameter::default(),
        }
    }

    /// Builder method for choosing how the application parameter is computed.
    pub fn app_parameter(self, app_parameter: AppParameter) -> Self {
        Self {
            app_parameter,
            ..self
        }
    }

    /// How the application parameter is computed.
    pub fn app_parameter_kind(&self) -> AppParameter {
        self.app_parameter
    }

    /// Access the [`CredentialStore`] to look into what is stored.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Exclusively access the [`CredentialStore`] to look into what is stored and modify it if needed.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Access the [`KeyProvider`].
    pub fn key_provider(&self) -> &K {
        &self.keys
    }

    /// Exclusively access the [`KeyProvider`].
    pub fn key_provider_mut(&mut self) -> &mut K {
        &mut self.keys
    }

    /// Forget every registration and delete every key.
    pub async fn wipe(&mut self) -> Result<(), ProtocolError> {
        self.store.clear().await?;
        self.keys.clear().await?;
        log::info!("wiped all registrations");
        Ok(())
    }

    /// The 32 byte application parameter for `server`.
    pub fn application_parameter(&self, server: &ServerRecord) -> Result<[u8; 32], ProtocolError> {
        match self.app_parameter {
            AppParameter::AppUrl => Ok(sha256(server.app_url.as_bytes())),
            AppParameter::AppId => {
                let app_id = encoding::try_fixed_from_base64url::<32>(&server.app_id)
                    .ok_or_else(|| {
                        ProtocolError::InvalidRelyingPartyInfo("appID is not 32 bytes".into())
                    })?;
                Ok(sha256(&app_id))
            }
        }
    }
}
