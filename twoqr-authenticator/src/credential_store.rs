use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use twoqr_types::{KeyDetails, KeyRecord, ServerRecord, StoreError};

#[cfg(any(feature = "tokio", test))]
mod file;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "tokio", test))]
pub use file::FileStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;


/// Use this on a type that enables storage and fetching of the device's registrations.
///
/// A store owns every [`ServerRecord`] and [`KeyRecord`] and upholds their invariants:
/// * no key without its server,
/// * one key per `(appID, userID)`,
/// * a key's counter never goes down.
///
/// Mutations take `&mut self`. Share a store between tasks by wrapping it in a tokio
/// `Mutex` or `RwLock` (feature `tokio`), which serializes writers while readers keep seeing a
/// consistent snapshot.
#[async_trait::async_trait]
pub trait CredentialStore {
    /// Get the server registered under `app_id`.
    async fn get_server(&self, app_id: &str) -> Result<Option<ServerRecord>, StoreError>;

    /// Whether a server is registered under `app_id`.
    async fn has_server(&self, app_id: &str) -> Result<bool, StoreError>;

    /// Whether a key exists under `key_id`.
    async fn has_key(&self, key_id: &str) -> Result<bool, StoreError>;

    /// Get the key registered under `key_id`.
    async fn get_key(&self, key_id: &str) -> Result<Option<KeyRecord>, StoreError>;

    /// Whether `user_id` already holds a key for the server `app_id`.
    async fn is_user_already_registered(
        &self,
        user_id: &str,
        app_id: &str,
    ) -> Result<bool, StoreError>;

    /// The counter of `key_id`, [`StoreError::UnknownCredential`] if there is no such key.
    async fn get_counter(&self, key_id: &str) -> Result<u32, StoreError>;

    /// Every key joined with its server, most recently used first.
    async fn list_keys(&self) -> Result<Vec<KeyDetails>, StoreError>;

    /// Save a server. Does nothing if a server with the same `appID` exists.
    async fn insert_server(&mut self, server: ServerRecord) -> Result<(), StoreError>;

    /// Save a new key.
    ///
    /// Fails with [`StoreError::UnknownServer`] if its server was not inserted first, with
    /// [`StoreError::DuplicateUser`] if the user already holds a key for that server and with
    /// [`StoreError::DuplicateKey`] if the key handle is taken.
    async fn insert_key(&mut self, key: KeyRecord) -> Result<(), StoreError>;

    /// Move the counter of `key_id` to `value` and mark the key as used now.
    ///
    /// The check against the current counter and the write happen as one step. A `value` below
    /// the current counter fails with [`StoreError::CounterRegression`] and changes nothing.
    async fn set_counter(&mut self, key_id: &str, value: u32) -> Result<(), StoreError>;

    /// Delete every server and key.
    async fn clear(&mut self) -> Result<(), StoreError>;
}

/// In-memory store for registrations
///
/// Useful for tests, and the state behind `FileStore`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    servers: BTreeMap<String, ServerRecord>,
    keys: BTreeMap<String, KeyRecord>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn user_registered(&self, user_id: &str, app_id: &str) -> bool {
        self.keys
            .values()
            .any(|key| key.app_id == app_id && key.user_id == user_id)
    }

    fn counter(&self, key_id: &str) -> Result<u32, StoreError> {
        self.keys
            .get(key_id)
            .map(|key| key.counter)
            .ok_or(StoreError::UnknownCredential)
    }

    fn details(&self) -> Vec<KeyDetails> {
        let mut details: Vec<KeyDetails> = self
            .keys
            .values()
            .filter_map(|key| {
                let server = self.servers.get(&key.app_id)?;
                Some(KeyDetails::new(key, server))
            })
            .collect();
        details.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        details
    }

    fn add_server(&mut self, server: ServerRecord) {
        self.servers.entry(server.app_id.clone()).or_insert(server);
    }

    fn add_key(&mut self, key: KeyRecord) -> Result<(), StoreError> {
        if !self.servers.contains_key(&key.app_id) {
            return Err(StoreError::UnknownServer);
        }
        if self.user_registered(&key.user_id, &key.app_id) {
            return Err(StoreError::DuplicateUser);
        }
        if self.keys.contains_key(&key.key_id) {
            return Err(StoreError::DuplicateKey);
        }
        self.keys.insert(key.key_id.clone(), key);
        Ok(())
    }

    fn advance_counter(&mut self, key_id: &str, value: u32) -> Result<(), StoreError> {
        let key = self
            .keys
            .get_mut(key_id)
            .ok_or(StoreError::UnknownCredential)?;
        if value < key.counter {
            return Err(StoreError::CounterRegression {
                current: key.counter,
                requested: value,
            });
        }
        key.counter = value;
        key.last_used = Utc::now();
        Ok(())
    }

    fn wipe(&mut self) {
        self.servers.clear();
        self.keys.clear();
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryStore {
    async fn get_server(&self, app_id: &str) -> Result<Option<ServerRecord>, StoreError> {
        Ok(self.servers.get(app_id).cloned())
    }

    async fn has_server(&self, app_id: &str) -> Result<bool, StoreError> {
        Ok(self.servers.contains_key(app_id))
    }

    async fn has_key(&self, key_id: &str) -> Result<bool, StoreError> {
        Ok(self.keys.contains_key(key_id))
    }

    async fn get_key(&self, key_id: &str) -> Result<Option<KeyRecord>, StoreError> {
        Ok(self.keys.get(key_id).cloned())
    }

    async fn is_user_already_registered(
        &self,
        user_id: &str,
        app_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.user_registered(user_id, app_id))
    }

    async fn get_counter(&self, key_id: &str) -> Result<u32, StoreError> {
        self.counter(key_id)
    }

    async fn list_keys(&self) -> Result<Vec<KeyDetails>, StoreError> {
        Ok(self.details())
    }

    async fn insert_server(&mut self, server: ServerRecord) -> Result<(), StoreError> {
        self.add_server(server);
        Ok(())
    }

    async fn insert_key(&mut self, key: KeyRecord) -> Result<(), StoreError> {
        self.add_key(key)
    }

    async fn set_counter(&mut self, key_id: &str, value: u32) -> Result<(), StoreError> {
        self.advance_counter(key_id, value)
    }

    async fn clear(&mut self) -> Result<(), StoreError> {
        self.wipe();
        Ok(())
    }
}

/// Implements [`CredentialStore`] for a tokio lock around a store, taking `$read` for lookups and
/// `$write` for mutations.
#[cfg(any(feature = "tokio", test))]
macro_rules! locked_store {
    ($lock:ty, $read:ident, $write:ident) => {
        #[async_trait::async_trait]
        impl<S: CredentialStore + Send + Sync> CredentialStore for $lock {
            async fn get_server(&self, app_id: &str) -> Result<Option<ServerRecord>, StoreError> {
                self.$read().await.get_server(app_id).await
            }

            async fn has_server(&self, app_id: &str) -> Result<bool, StoreError> {
                self.$read().await.has_server(app_id).await
            }

            async fn has_key(&self, key_id: &str) -> Result<bool, StoreError> {
                self.$read().await.has_key(key_id).await
            }

            async fn get_key(&self, key_id: &str) -> Result<Option<KeyRecord>, StoreError> {
                self.$read().await.get_key(key_id).await
            }

            async fn is_user_already_registered(
                &self,
                user_id: &str,
                app_id: &str,
            ) -> Result<bool, StoreError> {
                self.$read()
                    .await
                    .is_user_already_registered(user_id, app_id)
                    .await
            }

            async fn get_counter(&self, key_id: &str) -> Result<u32, StoreError> {
                self.$read().await.get_counter(key_id).await
            }

            async fn list_keys(&self) -> Result<Vec<KeyDetails>, StoreError> {
                self.$read().await.list_keys().await
            }

            async fn insert_server(&mut self, server: ServerRecord) -> Result<(), StoreError> {
                self.$write().await.insert_server(server).await
            }

            async fn insert_key(&mut self, key: KeyRecord) -> Result<(), StoreError> {
                self.$write().await.insert_key(key).await
            }

            async fn set_counter(&mut self, key_id: &str, value: u32) -> Result<(), StoreError> {
                self.$write().await.set_counter(key_id, value).await
            }

            async fn clear(&mut self) -> Result<(), StoreError> {
                self.$write().await.clear().await
            }
        }
    };
}

#[cfg(any(feature = "tokio", test))]
locked_store!(std::sync::Arc<tokio::sync::Mutex<S>>, lock, lock);
#[cfg(any(feature = "tokio", test))]
locked_store!(std::sync::Arc<tokio::sync::RwLock<S>>, read, write);
#[cfg(any(feature = "tokio", test))]
locked_store!(tokio::sync::Mutex<S>, lock, lock);
#[cfg(any(feature = "tokio", test))]
locked_store!(tokio::sync::RwLock<S>, read, write);
