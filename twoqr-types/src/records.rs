use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::relying_party::RelyingPartyInfo;

/// A relying party this device has registered with at least once.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// base64url of the 32 byte application identifier, primary key.
    #[serde(rename = "appID")]
    pub app_id: String,
    /// Human readable name.
    pub app_name: String,
    /// Base URL responses are posted to, always ending in `/`.
    #[serde(rename = "appURL")]
    pub app_url: String,
}

impl From<RelyingPartyInfo> for ServerRecord {
    fn from(info: RelyingPartyInfo) -> Self {
        let info = info.normalized();
        Self {
            app_id: info.app_id,
            app_name: info.app_name,
            app_url: info.app_url,
        }
    }
}

/// A credential this device holds.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// base64url key handle, primary key.
    #[serde(rename = "keyID")]
    pub key_id: String,
    /// The [`ServerRecord`] this key belongs to.
    #[serde(rename = "appID")]
    pub app_id: String,
    /// The account the key was registered for.
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Highest counter the relying party accepted for this key.
    pub counter: u32,
    /// When the key was registered or last used.
    #[typeshare(serialized_as = "String")]
    pub last_used: DateTime<Utc>,
}

impl KeyRecord {
    /// A freshly registered key, counter zero and used now.
    pub fn new(
        key_id: impl Into<String>,
        app_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            app_id: app_id.into(),
            user_id: user_id.into(),
            counter: 0,
            last_used: Utc::now(),
        }
    }
}

/// A key joined with its relying party, for listing what is registered on the device.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDetails {
    /// base64url key handle.
    #[serde(rename = "keyID")]
    pub key_id: String,
    /// The registered account.
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Name of the relying party.
    pub app_name: String,
    /// Base URL of the relying party.
    #[serde(rename = "appURL")]
    pub app_url: String,
    /// Current counter.
    pub counter: u32,
    /// When the key was registered or last used.
    #[typeshare(serialized_as = "String")]
    pub last_used: DateTime<Utc>,
}

impl KeyDetails {
    /// Join a key with the relying party it belongs to.
    pub fn new(key: &KeyRecord, server: &ServerRecord) -> Self {
        Self {
            key_id: key.key_id.clone(),
            user_id: key.user_id.clone(),
            app_name: server.app_name.clone(),
            app_url: server.app_url.clone(),
            counter: key.counter,
            last_used: key.last_used,
        }
    }
}
