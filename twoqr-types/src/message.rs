//! The 2Q2R text messages, as decoded from a QR code or received through a push notification.
//!
//! Both messages are ASCII, space delimited and start with a single letter tag:
//!
//! ```text
//! R <challenge> <infoURL> <userID>
//! A <appID> <challenge> <keyID> <counter>
//! ```
//!
//! Parsing is all or nothing: a [`Message`] can only be obtained from text which passed every
//! check, so code further down the line never sees a partially valid request.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::encoding;


/// Length of a decoded challenge.
pub const CHALLENGE_LEN: usize = 32;

/// Length of a decoded `appID`.
pub const APP_ID_LEN: usize = 32;

const REGISTRATION_TAG: &str = "R";
const AUTHENTICATION_TAG: &str = "A";
const REGISTRATION_FIELDS: usize = 4;
const AUTHENTICATION_FIELDS: usize = 5;

/// The outcome of identifying a raw message without keeping its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// `R` message, see [`RegistrationMessage`]
    Registration,
    /// `A` message, see [`AuthenticationMessage`]
    Authentication,
    /// Anything that failed validation
    Invalid,
}

/// Reasons for rejecting a raw message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "type", content = "content")]
pub enum InvalidMessage {
    /// Nothing was scanned.
    #[error("the message is empty")]
    Empty,
    /// The first field is neither `R` nor `A`.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    /// The message does not have the number of fields its type requires.
    #[error("expected {expected} fields but found {found}")]
    FieldCount {
        /// Fields required by the message type, tag included.
        expected: usize,
        /// Fields present in the message.
        found: usize,
    },
    /// A field is empty, which happens with consecutive spaces.
    #[error("field {0} is empty")]
    EmptyField(usize),
    /// The challenge is not base64url of exactly 32 bytes.
    #[error("the challenge is not base64url of 32 bytes")]
    Challenge,
    /// The `appID` is not base64url of exactly 32 bytes.
    #[error("the appID is not base64url of 32 bytes")]
    AppId,
    /// The info URL uses characters outside of `[A-Za-z0-9:/.]`.
    #[error("the info URL contains unsupported characters")]
    InfoUrl,
    /// The counter is not a decimal unsigned 32 bit integer.
    #[error("the counter is not an unsigned 32-bit decimal")]
    Counter,
}

/// A request to register this device with a relying party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationMessage {
    challenge: String,
    info_url: String,
    user_id: String,
}

impl RegistrationMessage {
    /// The relying party's challenge, base64url of 32 bytes, as it appeared in the message.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Where the relying party's metadata can be fetched from.
    pub fn info_url(&self) -> &str {
        &self.info_url
    }

    /// The account being registered.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// A request to prove possession of a previously registered credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationMessage {
    app_id: String,
    challenge: String,
    key_id: String,
    counter: u32,
}

impl AuthenticationMessage {
    /// The relying party's identifier, base64url of 32 bytes.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// The relying party's challenge, base64url of 32 bytes.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// The key handle the relying party expects to be used.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The relying party's view of the credential's counter.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

/// A validated 2Q2R message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Register this device with a relying party
    Registration(RegistrationMessage),
    /// Authenticate with an existing credential
    Authentication(AuthenticationMessage),
}

impl Message {
    /// Validate `raw` and report which kind of message it is, [`MessageType::Invalid`] if any
    /// check fails.
    pub fn identify_type(raw: &str) -> MessageType {
        match raw.parse::<Message>() {
            Ok(message) => message.message_type(),
            Err(_) => MessageType::Invalid,
        }
    }

    /// The kind of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Registration(_) => MessageType::Registration,
            Message::Authentication(_) => MessageType::Authentication,
        }
    }

    /// The challenge carried by either kind of message.
    pub fn challenge(&self) -> &str {
        match self {
            Message::Registration(reg) => reg.challenge(),
            Message::Authentication(auth) => auth.challenge(),
        }
    }
}

fn check_field_count(fields: &[&str], expected: usize) -> Result<(), InvalidMessage> {
    if fields.len() != expected {
        return Err(InvalidMessage::FieldCount {
            expected,
            found: fields.len(),
        });
    }
    match fields.iter().position(|f| f.is_empty()) {
        Some(index) => Err(InvalidMessage::EmptyField(index)),
        None => Ok(()),
    }
}

fn is_challenge(field: &str) -> bool {
    encoding::try_fixed_from_base64url::<CHALLENGE_LEN>(field).is_some()
}

fn is_info_url(field: &str) -> bool {
    field
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '/' | '.'))
}

fn parse_counter(field: &str) -> Result<u32, InvalidMessage> {
    // `u32::from_str` would also take a leading `+`
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidMessage::Counter);
    }
    field.parse().map_err(|_| InvalidMessage::Counter)
}

impl FromStr for RegistrationMessage {
    type Err = InvalidMessage;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = raw.split(' ').collect();
        if fields[0] != REGISTRATION_TAG {
            return Err(InvalidMessage::UnknownType(fields[0].to_owned()));
        }
        check_field_count(&fields, REGISTRATION_FIELDS)?;

        if !is_challenge(fields[1]) {
            return Err(InvalidMessage::Challenge);
        }
        if !is_info_url(fields[2]) {
            return Err(InvalidMessage::InfoUrl);
        }

        Ok(Self {
            challenge: fields[1].to_owned(),
            info_url: fields[2].to_owned(),
            user_id: fields[3].to_owned(),
        })
    }
}

impl FromStr for AuthenticationMessage {
    type Err = InvalidMessage;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = raw.split(' ').collect();
        if fields[0] != AUTHENTICATION_TAG {
            return Err(InvalidMessage::UnknownType(fields[0].to_owned()));
        }
        check_field_count(&fields, AUTHENTICATION_FIELDS)?;

        if encoding::try_fixed_from_base64url::<APP_ID_LEN>(fields[1]).is_none() {
            return Err(InvalidMessage::AppId);
        }
        if !is_challenge(fields[2]) {
            return Err(InvalidMessage::Challenge);
        }
        let counter = parse_counter(fields[4])?;

        Ok(Self {
            app_id: fields[1].to_owned(),
            challenge: fields[2].to_owned(),
            key_id: fields[3].to_owned(),
            counter,
        })
    }
}

impl FromStr for Message {
    type Err = InvalidMessage;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(InvalidMessage::Empty);
        }
        match raw.split(' ').next() {
            Some(REGISTRATION_TAG) => raw.parse().map(Message::Registration),
            Some(AUTHENTICATION_TAG) => raw.parse().map(Message::Authentication),
            Some(other) => Err(InvalidMessage::UnknownType(other.to_owned())),
            None => Err(InvalidMessage::Empty),
        }
    }
}

impl fmt::Display for RegistrationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{REGISTRATION_TAG} {} {} {}",
            self.challenge, self.info_url, self.user_id
        )
    }
}

impl fmt::Display for AuthenticationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{AUTHENTICATION_TAG} {} {} {} {}",
            self.app_id, self.challenge, self.key_id, self.counter
        )
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Registration(reg) => reg.fmt(f),
            Message::Authentication(auth) => auth.fmt(f),
        }
    }
}
