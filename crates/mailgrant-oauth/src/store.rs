//! Token ownership and durable persistence.
//!
//! [`TokenStore`] is the single owner of the [`AuthorizationToken`]. Every
//! refresh or grant exchange happens while holding its lock, and every change
//! is written through to the [`TokenPersistence`] backend before the lock is
//! released.

use crate::error::{Error, Result};
use crate::token::AuthorizationToken;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Durable storage for the token across process restarts.
pub trait TokenPersistence: Send + Sync + fmt::Debug {
    /// Loads the stored token. Returns an unset token if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load(&self) -> Result<AuthorizationToken>;

    /// Stores the token, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn save(&self, token: &AuthorizationToken) -> Result<()>;
}

/// Process-local persistence.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    token: StdMutex<Option<AuthorizationToken>>,
    saves: AtomicUsize,
}

impl MemoryPersistence {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `token`.
    #[must_use]
    pub fn with_token(token: AuthorizationToken) -> Self {
        Self {
            token: StdMutex::new(Some(token)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of times [`TokenPersistence::save`] has been called.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl TokenPersistence for MemoryPersistence {
    fn load(&self) -> Result<AuthorizationToken> {
        let stored = self
            .token
            .lock()
            .map_err(|_| Error::Persistence("memory store poisoned".into()))?;
        Ok(stored.clone().unwrap_or_default())
    }

    fn save(&self, token: &AuthorizationToken) -> Result<()> {
        let mut stored = self
            .token
            .lock()
            .map_err(|_| Error::Persistence("memory store poisoned".into()))?;
        *stored = Some(token.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Owner of the current authorization token.
#[derive(Debug)]
pub struct TokenStore {
    token: Mutex<AuthorizationToken>,
    persistence: Arc<dyn TokenPersistence>,
}

impl TokenStore {
    /// Opens a store backed by `persistence`, loading the saved token.
    ///
    /// # Errors
    ///
    /// Returns an error if the saved token cannot be loaded.
    pub fn open(persistence: Arc<dyn TokenPersistence>) -> Result<Self> {
        let token = persistence.load()?;
        debug!(
            unset = token.is_unset(),
            refreshable = token.refresh_token().is_ok(),
            "Loaded authorization token"
        );
        Ok(Self {
            token: Mutex::new(token),
            persistence,
        })
    }

    /// Creates an empty store that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            token: Mutex::new(AuthorizationToken::default()),
            persistence: Arc::new(MemoryPersistence::new()),
        }
    }

    /// Acquires exclusive access to the token.
    ///
    /// Only one holder exists at a time; concurrent callers wait here.
    pub async fn lock(&self) -> TokenGuard<'_> {
        TokenGuard {
            token: self.token.lock().await,
            persistence: self.persistence.as_ref(),
        }
    }

    /// Returns a copy of the current token.
    pub async fn snapshot(&self) -> AuthorizationToken {
        self.token.lock().await.clone()
    }

    /// Empties the store and persists the empty token.
    ///
    /// # Errors
    ///
    /// Returns an error if the empty token cannot be persisted.
    pub async fn reset(&self) -> Result<()> {
        self.lock().await.replace(AuthorizationToken::default())
    }
}

/// Exclusive access to the stored token.
pub struct TokenGuard<'a> {
    token: MutexGuard<'a, AuthorizationToken>,
    persistence: &'a dyn TokenPersistence,
}

impl TokenGuard<'_> {
    /// Persists `token` and then makes it the current token.
    ///
    /// The in-memory token only changes once the backend accepted the write.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write. The current token
    /// is left as it was.
    pub fn replace(&mut self, token: AuthorizationToken) -> Result<()> {
        self.persistence.save(&token)?;
        *self.token = token;
        Ok(())
    }
}

impl Deref for TokenGuard<'_> {
    type Target = AuthorizationToken;

    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl fmt::Debug for TokenGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TokenGuard").field(&*self.token).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Loads a fixed token and refuses every write.
    #[derive(Debug)]
    struct FailingSave(AuthorizationToken);

    impl TokenPersistence for FailingSave {
        fn load(&self) -> Result<AuthorizationToken> {
            Ok(self.0.clone())
        }

        fn save(&self, _token: &AuthorizationToken) -> Result<()> {
            Err(Error::Persistence("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_open_loads_saved_token() {
        let saved = AuthorizationToken::new("AT1", Utc::now()).with_refresh_token("RT1");
        let persistence = Arc::new(MemoryPersistence::with_token(saved.clone()));
        let store = TokenStore::open(persistence).unwrap();
        assert_eq!(store.snapshot().await, saved);
    }

    #[tokio::test]
    async fn test_replace_writes_through() {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = TokenStore::open(persistence.clone()).unwrap();

        store
            .lock()
            .await
            .replace(AuthorizationToken::new("AT1", Utc::now()))
            .unwrap();

        assert_eq!(persistence.save_count(), 1);
        assert_eq!(persistence.load().unwrap().access_token, "AT1");
        assert_eq!(store.snapshot().await.access_token, "AT1");
    }

    #[tokio::test]
    async fn test_rejected_write_keeps_current_token() {
        let saved = AuthorizationToken::new("AT1", Utc::now()).with_refresh_token("RT1");
        let store = TokenStore::open(Arc::new(FailingSave(saved.clone()))).unwrap();

        let result = store
            .lock()
            .await
            .replace(AuthorizationToken::new("AT2", Utc::now()).with_refresh_token("RT2"));

        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(store.snapshot().await, saved);

        assert!(store.reset().await.is_err());
        assert_eq!(store.snapshot().await, saved);
    }

    #[tokio::test]
    async fn test_reset_persists_empty_token() {
        let saved = AuthorizationToken::new("AT1", Utc::now()).with_refresh_token("RT1");
        let persistence = Arc::new(MemoryPersistence::with_token(saved));
        let store = TokenStore::open(persistence.clone()).unwrap();

        store.reset().await.unwrap();

        assert!(store.snapshot().await.is_unset());
        assert!(persistence.load().unwrap().is_unset());
    }
}
