use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

const KEYRING_SERVICE: &str = "qradmin";
pub const ACCESS_KEY: &str = "access_token";
pub const REFRESH_KEY: &str = "refresh_token";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("Credential storage error: {0}")]
    Storage(String),
}

/// Trait for credential storage backends
pub trait CredentialStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<String>, SessionError>;
    fn store(&self, name: &str, value: &str) -> Result<(), SessionError>;
    fn delete(&self, name: &str) -> Result<(), SessionError>;
}

/// Production credential storage using the system keyring
pub struct KeyringStore;

impl CredentialStore for KeyringStore {
    fn load(&self, name: &str) -> Result<Option<String>, SessionError> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, name)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SessionError::Keyring(e)),
        }
    }

    fn store(&self, name: &str, value: &str) -> Result<(), SessionError> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, name)?;
        entry.set_password(value)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), SessionError> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, name)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SessionError::Keyring(e)),
        }
    }
}

/// In-memory credential storage (tests, ephemeral sessions)
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Option<String>, SessionError> {
        let values = self
            .values
            .lock()
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(values.get(name).cloned())
    }

    fn store(&self, name: &str, value: &str) -> Result<(), SessionError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), SessionError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        values.remove(name);
        Ok(())
    }
}

/// Authentication session shared by every request-issuing component.
///
/// Cloning is cheap and all clones see the same credential. A replaced
/// credential is visible to the next request immediately and is announced on
/// the watch channel returned by [`Session::subscribe`].
#[derive(Clone)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
    store: Arc<dyn CredentialStore>,
    updates: Arc<watch::Sender<Option<String>>>,
}

impl Session {
    /// Create a session backed by `store`, restoring any persisted token
    pub fn new(store: Arc<dyn CredentialStore>) -> Result<Self, SessionError> {
        let token = store.load(ACCESS_KEY)?;
        if token.is_some() {
            debug!("Session: restored persisted access token");
        }
        let (tx, _rx) = watch::channel(token.clone());

        Ok(Session {
            token: Arc::new(RwLock::new(token)),
            store,
            updates: Arc::new(tx),
        })
    }

    /// Session backed by the system keyring
    pub fn from_keyring() -> Result<Self, SessionError> {
        Self::new(Arc::new(KeyringStore))
    }

    /// Ephemeral session that persists nothing outside the process
    pub fn in_memory() -> Self {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
        let (tx, _rx) = watch::channel(None);
        Session {
            token: Arc::new(RwLock::new(None)),
            store,
            updates: Arc::new(tx),
        }
    }

    /// Current bearer token
    pub fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Replace the bearer token, persist it and notify subscribers
    pub fn set_token(&self, token: &str) -> Result<(), SessionError> {
        {
            let mut guard = match self.token.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if guard.as_deref() == Some(token) {
                return Ok(());
            }
            *guard = Some(token.to_string());
        }
        self.updates.send_replace(Some(token.to_string()));
        self.store.store(ACCESS_KEY, token)?;
        info!("Session: access token updated");
        Ok(())
    }

    pub fn set_refresh_token(&self, token: &str) -> Result<(), SessionError> {
        self.store.store(REFRESH_KEY, token)
    }

    /// Forget all credentials
    pub fn clear(&self) -> Result<(), SessionError> {
        {
            let mut guard = match self.token.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = None;
        }
        self.updates.send_replace(None);
        self.store.delete(ACCESS_KEY)?;
        self.store.delete(REFRESH_KEY)?;
        info!("Session: cleared");
        Ok(())
    }

    /// Receive every credential change
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_replacement_visible_to_all_clones() {
        let session = Session::in_memory();
        let other = session.clone();
        assert!(!other.is_authenticated());

        session.set_token("first").unwrap();
        assert_eq!(other.token().as_deref(), Some("first"));

        other.set_token("second").unwrap();
        assert_eq!(session.token().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_updates_are_broadcast() {
        let session = Session::in_memory();
        let mut rx = session.subscribe();

        session.set_token("abc").unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_deref(), Some("abc"));

        session.clear().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[test]
    fn test_token_persisted_and_restored() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(store.clone()).unwrap();
        session.set_token("persisted").unwrap();

        let restored = Session::new(store).unwrap();
        assert_eq!(restored.token().as_deref(), Some("persisted"));
    }
}
