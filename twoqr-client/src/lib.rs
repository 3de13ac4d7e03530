//! # 2Q2R Client
//!
//! This crate defines a [`Session`] type driving the device side of the 2Q2R protocol. A
//! session takes the text of a scanned QR code or of a push notification, talks to the relying
//! party through a [`RelyingPartyTransport`] and uses an [`Authenticator`] to build and commit
//! the signed U2F responses. A [`UserApproval`] implementation is asked before anything is sent.
//!
//! The session holds no global state: create one per device, with its store, keystore and
//! configuration, and keep it for as long as the device runs.
//!
//! HTTP is abstracted behind [`RelyingPartyTransport`]. The `reqwest` feature implements it for
//! `reqwest::Client`.
use std::future::Future;

use indexmap::IndexSet;

use serde::Serialize;
use twoqr_authenticator::{
    Approval, Authenticator, CredentialStore, KeyProvider, PendingRegistration, UserApproval,
};
use twoqr_types::{
    encoding,
    message::{AuthenticationMessage, InvalidMessage, Message, RegistrationMessage},
    relying_party::{
        with_trailing_slash, DeclinePayload, DeclineStatus, Envelope, RelyingPartyInfo,
    },
    KeyDetails, ProtocolError,
};
use typeshare::typeshare;
use url::Url;

mod config;
mod transport;

pub use self::{
    config::{SessionConfig, DEFAULT_ANSWERED_CAPACITY, DEFAULT_APPROVAL_TIMEOUT},
    transport::{RelyingPartyResponse, RelyingPartyTransport},
};

#[cfg(test)]
mod tests;

/// What a processed message achieved.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "content")]
pub enum Outcome {
    /// The relying party accepted a new key.
    Registered {
        /// The relying party.
        #[serde(rename = "appID")]
        app_id: String,
        /// The new key handle.
        #[serde(rename = "keyID")]
        key_id: String,
    },
    /// The relying party accepted an assertion.
    Authenticated {
        /// The relying party.
        #[serde(rename = "appID")]
        app_id: String,
        /// The key that signed.
        #[serde(rename = "keyID")]
        key_id: String,
        /// The key's counter from now on.
        counter: u32,
    },
}

/// A `Session` dispatches 2Q2R messages. Users of this struct should supply an
/// [`Authenticator`], a [`UserApproval`] and a [`RelyingPartyTransport`].
///
/// A challenge is never answered twice, whether the answer was an accepted response, a rejected
/// one or a decline notice. The session remembers the last `answered_capacity` answered
/// challenges of its [`SessionConfig`].
pub struct Session<S, K, U, T>
where
    S: CredentialStore,
    K: KeyProvider,
    U: UserApproval,
    T: RelyingPartyTransport,
{
    authenticator: Authenticator<S, K>,
    approval: U,
    transport: T,
    config: SessionConfig,
    answered: IndexSet<String>,
}

impl<S, K, U, T> Session<S, K, U, T>
where
    S: CredentialStore,
    K: KeyProvider,
    U: UserApproval,
    T: RelyingPartyTransport,
{
    /// Create a `Session` with the default [`SessionConfig`].
    pub fn new(authenticator: Authenticator<S, K>, approval: U, transport: T) -> Self {
        Self {
            authenticator,
            approval,
            transport,
            config: SessionConfig::default(),
            answered: IndexSet::new(),
        }
    }

    /// Builder method for replacing the configuration.
    pub fn config(self, config: SessionConfig) -> Self {
        Self { config, ..self }
    }

    /// The session's configuration.
    pub fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read access to the authenticator
    pub fn authenticator(&self) -> &Authenticator<S, K> {
        &self.authenticator
    }

    /// Write access to the authenticator
    pub fn authenticator_mut(&mut self) -> &mut Authenticator<S, K> {
        &mut self.authenticator
    }

    /// Read access to the transport, useful to inspect a test double.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Process the text of a scanned QR code.
    pub async fn process(&mut self, raw: &str) -> Result<Outcome, ProtocolError> {
        let message: Message = raw.parse().inspect_err(|err| {
            log::debug!("rejected message: {err}");
        })?;
        self.ensure_unanswered(message.challenge())?;

        match message {
            Message::Registration(message) => self.register(message).await,
            Message::Authentication(message) => self.authenticate(message).await,
        }
    }

    /// Process the text of a push notification. Only authentication requests are pushed.
    pub async fn handle_push(&mut self, raw: &str) -> Result<Outcome, ProtocolError> {
        match raw.parse::<Message>()? {
            Message::Authentication(message) => {
                self.ensure_unanswered(message.challenge())?;
                self.authenticate(message).await
            }
            Message::Registration(_) => {
                log::debug!("ignoring registration request delivered by push");
                Err(InvalidMessage::UnknownType("R".into()).into())
            }
        }
    }

    /// Every key on the device, most recently used first.
    pub async fn list_keys(&self) -> Result<Vec<KeyDetails>, ProtocolError> {
        Ok(self.authenticator.store().list_keys().await?)
    }

    /// Forget every registration and delete every key.
    pub async fn wipe(&mut self) -> Result<(), ProtocolError> {
        self.authenticator.wipe().await?;
        self.answered.clear();
        Ok(())
    }

    fn ensure_unanswered(&self, challenge: &str) -> Result<(), ProtocolError> {
        if self.answered.contains(encoding::unpadded(challenge)) {
            log::warn!("challenge {challenge} was already answered");
            return Err(ProtocolError::ChallengeAlreadyAnswered);
        }
        Ok(())
    }

    fn mark_answered(&mut self, challenge: &str) {
        self.answered.insert(encoding::unpadded(challenge).to_owned());
        while self.answered.len() > self.config.answered_capacity {
            self.answered.shift_remove_index(0);
        }
    }

    async fn register(&mut self, message: RegistrationMessage) -> Result<Outcome, ProtocolError> {
        let info_url = Url::parse(&with_trailing_slash(message.info_url()))
            .map_err(|_| InvalidMessage::InfoUrl)?;
        log::debug!("fetching relying party info from {info_url}");
        let body = self.transport.fetch_info(info_url).await?.accepted()?;
        let info: RelyingPartyInfo = serde_json::from_str(&body)
            .map_err(|err| ProtocolError::InvalidRelyingPartyInfo(err.to_string()))?;

        let pending = self.authenticator.register(&message, info).await?;
        let url = match endpoint(&pending.server().app_url, "register") {
            Ok(url) => url,
            Err(err) => return Err(self.abandon(pending, err).await),
        };

        let prompt = pending.prompt();
        let declined = match self.ask(self.approval.confirm_registration(&prompt)).await {
            Some(Approval::Approved) => None,
            Some(Approval::Declined) => {
                log::warn!("user declined registration with {}", prompt.app_url);
                Some(ProtocolError::UserDeclined)
            }
            None => Some(ProtocolError::ApprovalTimedOut),
        };
        if let Some(err) = declined {
            return Err(self.abandon(pending, err).await);
        }

        let payload = pending.payload(
            self.config.device_name.as_str(),
            self.config.push_token.clone(),
        );
        self.mark_answered(message.challenge());
        if let Err(err) = self.send(url, payload).await {
            return Err(self.abandon(pending, err).await);
        }

        let outcome = Outcome::Registered {
            app_id: pending.server().app_id.clone(),
            key_id: pending.key().key_id.clone(),
        };
        self.authenticator.commit_registration(pending).await?;
        Ok(outcome)
    }

    async fn authenticate(
        &mut self,
        message: AuthenticationMessage,
    ) -> Result<Outcome, ProtocolError> {
        let context = self.authenticator.check_counter(&message).await?;
        let url = endpoint(&context.server().app_url, "auth")?;
        let prompt = context.prompt();
        if prompt.is_suspicious() {
            log::warn!(
                "{} authentications for key {} were missed",
                prompt.missed,
                context.key().key_id
            );
        }

        let status = match self.ask(self.approval.approve_authentication(&prompt)).await {
            Some(Approval::Approved) => None,
            Some(Approval::Declined) => Some(DeclineStatus::Canceled),
            None => Some(DeclineStatus::TimedOut),
        };
        if let Some(status) = status {
            self.decline(url, message.challenge(), status).await;
            return Err(match status {
                DeclineStatus::TimedOut => ProtocolError::ApprovalTimedOut,
                _ => ProtocolError::UserDeclined,
            });
        }

        let pending = self.authenticator.authenticate(&context).await?;
        self.mark_answered(message.challenge());
        self.send(url, pending.payload()).await?;

        self.authenticator.confirm_assertion(&pending).await?;
        Ok(Outcome::Authenticated {
            app_id: message.app_id().to_owned(),
            key_id: pending.key_id().to_owned(),
            counter: pending.counter(),
        })
    }

    /// Drop a registration that will never be committed, returning `err`.
    async fn abandon(
        &mut self,
        pending: PendingRegistration,
        err: ProtocolError,
    ) -> ProtocolError {
        if let Err(discard) = self.authenticator.discard_registration(pending).await {
            log::error!("could not discard registration: {discard}");
        }
        err
    }

    /// Wait for the user's answer, `None` once the approval timeout expired.
    async fn ask(&self, prompt: impl Future<Output = Approval>) -> Option<Approval> {
        tokio::time::timeout(self.config.approval_timeout, prompt)
            .await
            .ok()
    }

    /// Send a decline notice. Failing to deliver it is only logged, the relying party will time
    /// out the challenge on its own.
    async fn decline(&mut self, url: Url, challenge: &str, status: DeclineStatus) {
        log::warn!("declining challenge {challenge}: {status:?}");
        self.mark_answered(challenge);
        let notice = Envelope::failure(DeclinePayload::new(challenge, status));
        match self.transport.post_json(url, &notice).await {
            Ok(response) if !response.is_success() => {
                log::warn!("relying party answered {} to a decline", response.status);
            }
            Ok(_) => {}
            Err(err) => log::warn!("could not deliver decline notice: {err}"),
        }
    }

    async fn send<P>(&self, url: Url, payload: P) -> Result<(), ProtocolError>
    where
        P: Serialize + Sync,
    {
        let response = if self.config.envelope {
            self.transport
                .post_json(url, &Envelope::success(payload))
                .await?
        } else {
            self.transport.post_json(url, &payload).await?
        };
        response
            .accepted()
            .map(|_| ())
            .inspect_err(|err| log::warn!("relying party rejected the response: {err}"))
    }
}

/// Join `path` to a relying party's `appURL`.
fn endpoint(app_url: &str, path: &str) -> Result<Url, ProtocolError> {
    Url::parse(&with_trailing_slash(app_url))
        .and_then(|base| base.join(path))
        .map_err(|err| ProtocolError::InvalidRelyingPartyInfo(format!("appURL: {err}")))
}
