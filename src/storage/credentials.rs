//! Per-user provider credentials.
//!
//! [`CredentialStore`] is the read side the sync path depends on. Absence of a
//! credential is a normal answer (`Ok(None)`), not an error.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::store::Store;
use crate::core::fingerprint::token_fingerprint;
use crate::core::models::ProviderCredential;
use crate::core::provider::Provider;
use crate::error::{Result, UpkeepError};

/// Token lookup by (user, provider).
pub trait CredentialStore: Send + Sync {
    /// The stored credential, if any.
    ///
    /// # Errors
    /// Returns an error only if the backing storage fails.
    fn get_credential(&self, user_id: &str, provider: Provider)
    -> Result<Option<ProviderCredential>>;

    /// The stored token, if any.
    ///
    /// # Errors
    /// Returns an error only if the backing storage fails.
    fn get_token(&self, user_id: &str, provider: Provider) -> Result<Option<String>> {
        Ok(self.get_credential(user_id, provider)?.map(|c| c.token))
    }
}

type CacheKey = (String, Provider);

/// SQLite-backed credential store with a read-through cache.
pub struct SqliteCredentialStore {
    store: Arc<Store>,
    cache: RwLock<HashMap<CacheKey, Option<ProviderCredential>>>,
}

impl std::fmt::Debug for SqliteCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCredentialStore").finish_non_exhaustive()
    }
}

impl SqliteCredentialStore {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite a credential.
    ///
    /// # Errors
    /// Returns a validation error for an empty user id or token, or a storage error.
    pub fn save(&self, credential: &ProviderCredential) -> Result<()> {
        if credential.user_id.trim().is_empty() {
            return Err(UpkeepError::validation("user_id", "must not be empty"));
        }
        if credential.token.trim().is_empty() {
            return Err(UpkeepError::validation("token", "must not be empty"));
        }

        self.store.save_credential(credential)?;
        self.invalidate(&credential.user_id, credential.provider);

        tracing::info!(
            user_id = %credential.user_id,
            provider = %credential.provider,
            fingerprint = %token_fingerprint(&credential.token),
            "Saved credential"
        );
        Ok(())
    }

    /// Disconnect a provider. Returns whether a credential existed.
    ///
    /// # Errors
    /// Returns an error if the backing storage fails.
    pub fn remove(&self, user_id: &str, provider: Provider) -> Result<bool> {
        let removed = self.store.delete_credential(user_id, provider)?;
        self.invalidate(user_id, provider);
        tracing::info!(user_id, provider = %provider, removed, "Removed credential");
        Ok(removed)
    }

    /// Providers the user has connected.
    ///
    /// # Errors
    /// Returns an error if the backing storage fails.
    pub fn connected_providers(&self, user_id: &str) -> Result<Vec<Provider>> {
        self.store.credential_providers(user_id)
    }

    fn invalidate(&self, user_id: &str, provider: Provider) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&(user_id.to_string(), provider));
        }
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn get_credential(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<ProviderCredential>> {
        let key = (user_id.to_string(), provider);
        if let Ok(cache) = self.cache.read()
            && let Some(hit) = cache.get(&key)
        {
            return Ok(hit.clone());
        }

        let loaded = self.store.load_credential(user_id, provider)?;
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, loaded.clone());
        }
        Ok(loaded)
    }
}
