use std::fmt;

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::{crypto::sha256, encoding};

/// The U2F client data a device signs over, serialized as `{"typ":..,"challenge":..,"origin":..}`.
///
/// The JSON text produced by [`ClientData::to_json`] is the exact byte string hashed into the
/// challenge parameter and sent to the relying party, so it must not be re-serialized in between.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientData {
    /// Which operation this client data belongs to.
    pub typ: ClientDataType,

    /// The relying party's challenge, exactly as it appeared in the scanned message.
    pub challenge: String,

    /// The relying party's `appURL`.
    pub origin: String,
}

/// Discriminates registration from authentication client data.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientDataType {
    /// Serializes to the string `"navigator.id.finishEnrollment"`
    #[serde(rename = "navigator.id.finishEnrollment")]
    Enroll,

    /// Serializes to the string `"navigator.id.getAssertion"`
    #[serde(rename = "navigator.id.getAssertion")]
    Sign,
}

impl fmt::Display for ClientDataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let renamed = match self {
            ClientDataType::Enroll => "navigator.id.finishEnrollment",
            ClientDataType::Sign => "navigator.id.getAssertion",
        };
        f.write_str(renamed)
    }
}

impl ClientData {
    /// Client data for a registration.
    pub fn enrollment(challenge: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            typ: ClientDataType::Enroll,
            challenge: challenge.into(),
            origin: origin.into(),
        }
    }

    /// Client data for an authentication.
    pub fn assertion(challenge: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            typ: ClientDataType::Sign,
            challenge: challenge.into(),
            origin: origin.into(),
        }
    }

    /// The canonical JSON text. Slashes are never escaped.
    pub fn to_json(&self) -> String {
        // SAFETY: a struct of strings and a unit enum always serializes
        serde_json::to_string(self).unwrap()
    }

    /// SHA-256 of the canonical JSON text, the U2F challenge parameter.
    pub fn hash(&self) -> [u8; 32] {
        sha256(self.to_json().as_bytes())
    }

    /// The canonical JSON text in base64url, as sent to relying parties.
    pub fn to_base64url(&self) -> String {
        encoding::base64url(self.to_json().as_bytes())
    }
}
