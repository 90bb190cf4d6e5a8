//! Credential persistence for the access/refresh token pair
//!
//! Two opaque strings are stored: the short-lived access token attached to
//! every request and the longer-lived refresh token used only by the refresh
//! call. Storage I/O goes through a [`CredentialBackend`]; the [`TokenStore`]
//! façade applies the tolerant failure policy on top of it:
//!
//! - writes that fail are logged and swallowed,
//! - reads that fail look like a missing value,
//! - deleting an absent key is not an error.
//!
//! The production backend is the OS keyring (Keychain on macOS, Secret
//! Service on Linux, Windows Credential Manager on Windows). A process-local
//! [`MemoryBackend`] is available for tests and throwaway sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{AtelierError, Result};

/// Default keyring service name under which both tokens are stored.
pub const DEFAULT_SERVICE_NAME: &str = "atelier";

// ---------------------------------------------------------------------------
// TokenKey
// ---------------------------------------------------------------------------

/// The two credential slots held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    /// Bearer token attached to ordinary requests.
    AccessToken,
    /// Bearer token presented only to the refresh endpoint.
    RefreshToken,
}

impl TokenKey {
    /// Both keys, in the order `clear_all` deletes them.
    pub const ALL: [TokenKey; 2] = [TokenKey::AccessToken, TokenKey::RefreshToken];

    /// Storage name of the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use atelier::auth::token_store::TokenKey;
    ///
    /// assert_eq!(TokenKey::AccessToken.as_str(), "accessToken");
    /// assert_eq!(TokenKey::RefreshToken.as_str(), "refreshToken");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKey::AccessToken => "accessToken",
            TokenKey::RefreshToken => "refreshToken",
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CredentialBackend
// ---------------------------------------------------------------------------

/// Fallible key-value storage underneath [`TokenStore`].
///
/// Implementations report every failure; the façade decides what to do
/// with it. `read` returns `Ok(None)` when the key is absent and `remove`
/// returns `Ok(())` when there is nothing to delete.
pub trait CredentialBackend: Send + Sync + fmt::Debug {
    /// Stores `value` under `key`, replacing any previous value.
    fn write(&self, key: TokenKey, value: &str) -> Result<()>;

    /// Reads the value stored under `key`.
    fn read(&self, key: TokenKey) -> Result<Option<String>>;

    /// Removes the value stored under `key`.
    fn remove(&self, key: TokenKey) -> Result<()>;
}

/// OS keyring backend.
///
/// Each key becomes one keyring entry: service = the configured service
/// name, user = the key's storage name.
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    /// Creates a backend storing entries under `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// The keyring service name entries are stored under.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: TokenKey) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key.as_str())
            .map_err(|e| AtelierError::Keyring(e).into())
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl CredentialBackend for KeyringBackend {
    fn write(&self, key: TokenKey, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(AtelierError::Keyring)?;
        Ok(())
    }

    fn read(&self, key: TokenKey) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AtelierError::Keyring(e).into()),
        }
    }

    fn remove(&self, key: TokenKey) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AtelierError::Keyring(e).into()),
        }
    }
}

/// Process-local backend; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<TokenKey, String>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TokenKey, String>>> {
        self.values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory credential backend lock poisoned"))
    }
}

impl CredentialBackend for MemoryBackend {
    fn write(&self, key: TokenKey, value: &str) -> Result<()> {
        self.lock()?.insert(key, value.to_string());
        Ok(())
    }

    fn read(&self, key: TokenKey) -> Result<Option<String>> {
        Ok(self.lock()?.get(&key).cloned())
    }

    fn remove(&self, key: TokenKey) -> Result<()> {
        self.lock()?.remove(&key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Tolerant credential store shared by the refresh operation and the
/// request dispatcher.
///
/// Cloning is cheap; clones share the same backend. None of the methods
/// return errors: storage failures are logged with `tracing::warn!` and the
/// caller carries on. Writes are last-write-wins.
///
/// # Examples
///
/// ```
/// use atelier::auth::token_store::{TokenKey, TokenStore};
///
/// let store = TokenStore::in_memory();
/// store.save(TokenKey::AccessToken, "A1");
/// assert_eq!(store.get(TokenKey::AccessToken).as_deref(), Some("A1"));
///
/// store.clear_all();
/// assert!(store.get(TokenKey::AccessToken).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct TokenStore {
    backend: Arc<dyn CredentialBackend>,
}

impl TokenStore {
    /// Wraps an arbitrary backend.
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by the OS keyring under `service`.
    pub fn keyring(service: impl Into<String>) -> Self {
        Self::new(Arc::new(KeyringBackend::new(service)))
    }

    /// Store backed by a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Writes `value` under `key`. Failures are logged, never returned.
    pub fn save(&self, key: TokenKey, value: &str) {
        if let Err(e) = self.backend.write(key, value) {
            tracing::warn!(key = %key, error = %e, "failed to save credential");
        }
    }

    /// Reads the value under `key`; `None` when absent or unreadable.
    pub fn get(&self, key: TokenKey) -> Option<String> {
        match self.backend.read(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read credential");
                None
            }
        }
    }

    /// Removes the value under `key`. Deleting an absent key is a no-op.
    pub fn delete(&self, key: TokenKey) {
        if let Err(e) = self.backend.remove(key) {
            tracing::warn!(key = %key, error = %e, "failed to delete credential");
        }
    }

    /// Deletes both tokens.
    pub fn clear_all(&self) {
        for key in TokenKey::ALL {
            self.delete(key);
        }
        tracing::debug!("cleared stored credentials");
    }

    /// Convenience for `get(TokenKey::AccessToken)`.
    pub fn access_token(&self) -> Option<String> {
        self.get(TokenKey::AccessToken)
    }

    /// Convenience for `get(TokenKey::RefreshToken)`.
    pub fn refresh_token(&self) -> Option<String> {
        self.get(TokenKey::RefreshToken)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend where every operation fails.
    #[derive(Debug)]
    struct BrokenBackend;

    impl CredentialBackend for BrokenBackend {
        fn write(&self, _key: TokenKey, _value: &str) -> Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }

        fn read(&self, _key: TokenKey) -> Result<Option<String>> {
            Err(anyhow::anyhow!("locked"))
        }

        fn remove(&self, _key: TokenKey) -> Result<()> {
            Err(anyhow::anyhow!("locked"))
        }
    }

    #[test]
    fn test_token_key_storage_names() {
        assert_eq!(TokenKey::AccessToken.as_str(), "accessToken");
        assert_eq!(TokenKey::RefreshToken.as_str(), "refreshToken");
        assert_eq!(TokenKey::AccessToken.to_string(), "accessToken");
    }

    #[test]
    fn test_save_then_get_returns_value() {
        let store = TokenStore::in_memory();
        store.save(TokenKey::RefreshToken, "R1");
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_save_overwrites_previous_value() {
        let store = TokenStore::in_memory();
        store.save(TokenKey::AccessToken, "A1");
        store.save(TokenKey::AccessToken, "A2");
        assert_eq!(store.access_token().as_deref(), Some("A2"));
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let store = TokenStore::in_memory();
        store.delete(TokenKey::AccessToken);
        store.delete(TokenKey::AccessToken);
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_clear_all_removes_both_tokens() {
        let store = TokenStore::in_memory();
        store.save(TokenKey::AccessToken, "A1");
        store.save(TokenKey::RefreshToken, "R1");
        store.clear_all();
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn test_clear_all_on_empty_store_is_noop() {
        let store = TokenStore::in_memory();
        store.clear_all();
        store.clear_all();
    }

    #[test]
    fn test_clones_share_backend() {
        let store = TokenStore::in_memory();
        let other = store.clone();
        store.save(TokenKey::AccessToken, "shared");
        assert_eq!(other.access_token().as_deref(), Some("shared"));
    }

    #[test]
    fn test_backend_failures_are_swallowed() {
        let store = TokenStore::new(Arc::new(BrokenBackend));
        store.save(TokenKey::AccessToken, "A1");
        assert!(store.get(TokenKey::AccessToken).is_none());
        store.delete(TokenKey::AccessToken);
        store.clear_all();
    }

    #[test]
    fn test_keyring_backend_default_service() {
        assert_eq!(KeyringBackend::default().service(), "atelier");
        assert_eq!(KeyringBackend::new("custom").service(), "custom");
    }

    // -----------------------------------------------------------------------
    // Keyring integration tests  (require system keyring; skipped in CI)
    // -----------------------------------------------------------------------

    #[test]
    #[ignore = "requires system keyring"]
    fn test_keyring_roundtrip() {
        let store = TokenStore::keyring("atelier-test-roundtrip");
        store.save(TokenKey::AccessToken, "integration_access");
        store.save(TokenKey::RefreshToken, "integration_refresh");
        assert_eq!(store.access_token().as_deref(), Some("integration_access"));
        assert_eq!(store.refresh_token().as_deref(), Some("integration_refresh"));
        store.clear_all();
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    #[ignore = "requires system keyring"]
    fn test_keyring_delete_is_idempotent() {
        let backend = KeyringBackend::new("atelier-test-idempotent");
        backend.remove(TokenKey::AccessToken).expect("first delete");
        backend
            .remove(TokenKey::AccessToken)
            .expect("second delete is no-op");
    }
}
