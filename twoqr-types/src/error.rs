use serde::Serialize;

use crate::message::InvalidMessage;

/// Who has to act to get past an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    /// The scanned or pushed input is wrong, fix your input.
    Input,
    /// The device cannot perform the operation, fix your device.
    Device,
    /// The relying party refused or misbehaved, contact the relying party.
    RelyingParty,
    /// Connectivity or a local timeout, trying again may help.
    Transient,
}

/// Errors raised by a key provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "type", content = "content")]
pub enum KeyProviderError {
    /// The keystore cannot create P-256 keys.
    #[error("the keystore cannot generate P-256 keys")]
    KeyGenUnsupported,
    /// The keystore does not offer hardware or OS level protection.
    #[error("the device keystore is not secure")]
    InsecureDevice,
    /// The keystore cannot produce ECDSA signatures.
    #[error("the keystore cannot sign")]
    SigningUnavailable,
    /// No key exists under the requested key handle.
    #[error("no key for this key handle")]
    KeyNotFound,
    /// Any other keystore failure.
    #[error("keystore failure: {0}")]
    Keystore(String),
}

/// Errors raised by a credential store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "type", content = "content")]
pub enum StoreError {
    /// No server record for the `appID`.
    #[error("unknown server")]
    UnknownServer,
    /// No key record for the key handle.
    #[error("unknown credential")]
    UnknownCredential,
    /// The user already holds a key for this server.
    #[error("the user is already registered with this server")]
    DuplicateUser,
    /// A key with this handle already exists.
    #[error("duplicate key handle")]
    DuplicateKey,
    /// Counters only move forward.
    #[error("counter {requested} is below the stored counter {current}")]
    CounterRegression {
        /// Counter currently stored.
        current: u32,
        /// Counter that was rejected.
        requested: u32,
    },
    /// Reading or writing the backing file failed.
    #[error("storage I/O failure: {0}")]
    Io(String),
    /// The backing file could not be decoded.
    #[error("corrupt store: {0}")]
    Corrupt(String),
    /// The database reported an error.
    #[error("database failure: {0}")]
    Database(String),
}

/// Every way processing a 2Q2R message can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "type", content = "content")]
pub enum ProtocolError {
    /// The raw message failed validation.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] InvalidMessage),
    /// The relying party's info document is unusable.
    #[error("invalid relying party info: {0}")]
    InvalidRelyingPartyInfo(String),
    /// The message refers to a server this device never registered with.
    #[error("unknown server")]
    UnknownServer,
    /// The message refers to a key this device does not hold.
    #[error("unknown credential")]
    UnknownCredential,
    /// The user already holds a key for this server.
    #[error("already registered with this server")]
    DuplicateRegistration,
    /// The relying party's counter does not move past the local one.
    #[error("stale or replayed challenge: server counter {server_counter}, local counter {local_counter}")]
    ReplayOrStaleChallenge {
        /// Counter stored on the device.
        local_counter: u32,
        /// Counter carried by the message.
        server_counter: u32,
    },
    /// This challenge was already answered by this session.
    #[error("this challenge was already answered")]
    ChallengeAlreadyAnswered,
    /// See [`KeyProviderError::KeyGenUnsupported`].
    #[error("the keystore cannot generate P-256 keys")]
    KeyGenUnsupported,
    /// See [`KeyProviderError::InsecureDevice`].
    #[error("the device keystore is not secure")]
    InsecureDevice,
    /// See [`KeyProviderError::SigningUnavailable`].
    #[error("the keystore cannot sign")]
    SigningUnavailable,
    /// The store knows the key but the keystore lost it.
    #[error("the keystore has no key for this credential")]
    KeyNotFound,
    /// Any other keystore failure.
    #[error("keystore failure: {0}")]
    KeystoreError(String),
    /// The credential store failed.
    #[error("storage failure: {0}")]
    Storage(String),
    /// The relying party could not be reached. Never retried automatically.
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// The relying party answered with something other than 200.
    #[error("relying party rejected the request ({status}): {message}")]
    RelyingPartyRejected {
        /// HTTP status.
        status: u16,
        /// Response body, verbatim.
        message: String,
    },
    /// The user declined the request.
    #[error("the user declined")]
    UserDeclined,
    /// Nobody answered the approval prompt in time.
    #[error("approval timed out")]
    ApprovalTimedOut,
}

impl ProtocolError {
    /// Who has to act on this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProtocolError::InvalidMessage(_)
            | ProtocolError::UnknownServer
            | ProtocolError::UnknownCredential
            | ProtocolError::DuplicateRegistration
            | ProtocolError::ReplayOrStaleChallenge { .. }
            | ProtocolError::ChallengeAlreadyAnswered
            | ProtocolError::UserDeclined => ErrorClass::Input,
            ProtocolError::KeyGenUnsupported
            | ProtocolError::InsecureDevice
            | ProtocolError::SigningUnavailable
            | ProtocolError::KeyNotFound
            | ProtocolError::KeystoreError(_)
            | ProtocolError::Storage(_) => ErrorClass::Device,
            ProtocolError::InvalidRelyingPartyInfo(_)
            | ProtocolError::RelyingPartyRejected { .. } => ErrorClass::RelyingParty,
            ProtocolError::NetworkFailure(_) | ProtocolError::ApprovalTimedOut => {
                ErrorClass::Transient
            }
        }
    }
}

impl From<KeyProviderError> for ProtocolError {
    fn from(src: KeyProviderError) -> Self {
        match src {
            KeyProviderError::KeyGenUnsupported => ProtocolError::KeyGenUnsupported,
            KeyProviderError::InsecureDevice => ProtocolError::InsecureDevice,
            KeyProviderError::SigningUnavailable => ProtocolError::SigningUnavailable,
            KeyProviderError::KeyNotFound => ProtocolError::KeyNotFound,
            KeyProviderError::Keystore(msg) => ProtocolError::KeystoreError(msg),
        }
    }
}

impl From<StoreError> for ProtocolError {
    fn from(src: StoreError) -> Self {
        match src {
            StoreError::UnknownServer => ProtocolError::UnknownServer,
            StoreError::UnknownCredential => ProtocolError::UnknownCredential,
            StoreError::DuplicateUser | StoreError::DuplicateKey => {
                ProtocolError::DuplicateRegistration
            }
            StoreError::CounterRegression { current, requested } => {
                ProtocolError::ReplayOrStaleChallenge {
                    local_counter: current,
                    server_counter: requested,
                }
            }
            err @ (StoreError::Io(_) | StoreError::Corrupt(_) | StoreError::Database(_)) => {
                ProtocolError::Storage(err.to_string())
            }
        }
    }
}
