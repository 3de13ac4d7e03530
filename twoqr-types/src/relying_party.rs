//! JSON documents exchanged with a relying party.
//!
//! Field names follow the relying party's camelCase wire format.

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::{encoding, message::APP_ID_LEN};

/// Metadata a relying party publishes at its info URL.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelyingPartyInfo {
    /// base64url of the relying party's 32 byte identifier.
    #[serde(rename = "appID")]
    pub app_id: String,

    /// Human readable name shown to the user.
    pub app_name: String,

    /// Base URL the device posts its responses to. Older relying parties call it `baseURL`.
    #[serde(rename = "appURL", alias = "baseURL")]
    pub app_url: String,
}

impl RelyingPartyInfo {
    /// Decode the `appID`, which must be exactly 32 bytes.
    pub fn app_id_bytes(&self) -> Option<[u8; APP_ID_LEN]> {
        encoding::try_fixed_from_base64url(&self.app_id)
    }

    /// Copy of this info with a `/` appended to the `appURL` when it lacks one.
    pub fn normalized(mut self) -> Self {
        self.app_url = with_trailing_slash(&self.app_url);
        self
    }
}

/// Append a `/` to `url` unless it already ends with one, so endpoint paths can be joined to it.
pub fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_owned()
    } else {
        format!("{url}/")
    }
}

/// Body of `POST <appURL>/register`.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    /// base64url of the client data JSON.
    pub client_data: String,
    /// base64url of the U2F registration response.
    pub registration_data: String,
    /// Name of this device as shown by the relying party.
    pub device_name: String,
    /// Token the relying party can use to push authentication requests to this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
}

/// Body of `POST <appURL>/auth`.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationPayload {
    /// base64url of the client data JSON.
    pub client_data: String,
    /// base64url of the U2F authentication response.
    pub signature_data: String,
}

status_enum! {
    /// Why the device is refusing to answer a challenge.
    DeclineStatus {
        /// The user declined the request.
        Canceled: 401 => "the user declined the request",
        /// Nobody answered the prompt in time.
        TimedOut: 408 => "the request timed out on the device",
    }
}

/// Failure notice sent instead of an authentication response.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclinePayload {
    /// The challenge being declined, as received.
    pub challenge: String,
    /// Numeric [`DeclineStatus`].
    pub error_status: u16,
    /// Human readable reason.
    pub error_message: String,
}

impl DeclinePayload {
    /// Build the notice for `challenge`.
    pub fn new(challenge: impl Into<String>, status: DeclineStatus) -> Self {
        Self {
            challenge: challenge.into(),
            error_status: status.into(),
            error_message: status.reason().to_owned(),
        }
    }
}

/// Wraps a payload as `{"successful": .., "data": ..}` for relying parties that expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Whether the device completed the operation.
    pub successful: bool,
    /// The wrapped payload.
    pub data: T,
}

impl<T> Envelope<T> {
    /// Envelope for a completed operation.
    pub fn success(data: T) -> Self {
        Self {
            successful: true,
            data,
        }
    }

    /// Envelope for a declined or failed operation.
    pub fn failure(data: T) -> Self {
        Self {
            successful: false,
            data,
        }
    }
}
