use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::fs;

use twoqr_types::{KeyDetails, KeyRecord, ServerRecord, StoreError};

use super::{CredentialStore, MemoryStore};

/// A [`CredentialStore`] persisted as a JSON document through `tokio::fs`.
///
/// Every mutation is applied to a copy of the state, written to a temporary file next to the
/// target and renamed over it. The in-memory state only changes once the rename succeeded, so a
/// failed write leaves both the file and the store as they were.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: MemoryStore,
}

fn io_error(err: io::Error) -> StoreError {
    StoreError::Io(err.to_string())
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match fs::read(&path).await {
            Ok(contents) => serde_json::from_slice(&contents)
                .map_err(|err| StoreError::Corrupt(err.to_string()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => MemoryStore::default(),
            Err(err) => return Err(io_error(err)),
        };
        log::debug!("opened credential store at {}", path.display());
        Ok(Self { path, state })
    }

    /// Where the store is persisted.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &MemoryStore) -> Result<(), StoreError> {
        let contents =
            serde_json::to_vec_pretty(state).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        let written = match fs::write(&tmp, contents).await {
            Ok(()) => fs::rename(&tmp, &self.path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            log::error!(
                "failed to persist credential store to {}: {err}",
                self.path.display()
            );
            // best effort, the original file is untouched either way
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(err));
        }
        Ok(())
    }

    /// Apply `change` to a copy of the state, persist it and only then keep it.
    async fn update<F>(&mut self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut MemoryStore) -> Result<(), StoreError> + Send,
    {
        let mut next = self.state.clone();
        change(&mut next)?;
        self.persist(&next).await?;
        self.state = next;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for FileStore {
    async fn get_server(&self, app_id: &str) -> Result<Option<ServerRecord>, StoreError> {
        self.state.get_server(app_id).await
    }

    async fn has_server(&self, app_id: &str) -> Result<bool, StoreError> {
        self.state.has_server(app_id).await
    }

    async fn has_key(&self, key_id: &str) -> Result<bool, StoreError> {
        self.state.has_key(key_id).await
    }

    async fn get_key(&self, key_id: &str) -> Result<Option<KeyRecord>, StoreError> {
        self.state.get_key(key_id).await
    }

    async fn is_user_already_registered(
        &self,
        user_id: &str,
        app_id: &str,
    ) -> Result<bool, StoreError> {
        self.state.is_user_already_registered(user_id, app_id).await
    }

    async fn get_counter(&self, key_id: &str) -> Result<u32, StoreError> {
        self.state.get_counter(key_id).await
    }

    async fn list_keys(&self) -> Result<Vec<KeyDetails>, StoreError> {
        self.state.list_keys().await
    }

    async fn insert_server(&mut self, server: ServerRecord) -> Result<(), StoreError> {
        if self.state.servers.contains_key(&server.app_id) {
            return Ok(());
        }
        self.update(|state| {
            state.add_server(server);
            Ok(())
        })
        .await
    }

    async fn insert_key(&mut self, key: KeyRecord) -> Result<(), StoreError> {
        self.update(|state| state.add_key(key)).await
    }

    async fn set_counter(&mut self, key_id: &str, value: u32) -> Result<(), StoreError> {
        self.update(|state| state.advance_counter(key_id, value))
            .await
    }

    async fn clear(&mut self) -> Result<(), StoreError> {
        self.update(|state| {
            state.wipe();
            Ok(())
        })
        .await
    }
}
