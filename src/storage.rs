use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::error::Error;

/// Durable key names shared with the rest of the app.
///
/// The durable store is a flat string-keyed, string-valued space; tokens are
/// stored verbatim and the expiry interval as a stringified integer.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const BLE_TOKEN: &str = "bleToken";
    pub const USER_ID: &str = "userId";
    pub const FCM_TOKEN: &str = "fcmToken";
    pub const EXPIRY_INTERVAL: &str = "expiryNotificationInterval";
    pub const HAS_LAUNCHED_BEFORE: &str = "hasLaunchedBefore";
}

/// Consumer-provided durable key-value storage.
///
/// On device this is backed by the platform's persistent store; tests and
/// ephemeral contexts use [`MemoryStorage`]. Writers to the same key race
/// with last-write-wins semantics — callers own any ordering discipline.
///
/// # Example
///
/// ```rust,ignore
/// impl KeyValueStorage for DeviceStorage {
///     async fn get(&self, key: &str) -> Result<Option<String>, Error> {
///         self.bridge.read(key).await.map_err(|e| Error::Storage(e.to_string()))
///     }
///     // ...
/// }
/// ```
pub trait KeyValueStorage: Send + Sync + 'static {
    /// Read a value. `Ok(None)` means the key is absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, Error>> + Send;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

// One storage instance typically backs both stores and the API client.
impl<T: KeyValueStorage> KeyValueStorage for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        T::get(self, key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        T::set(self, key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        T::remove(self, key).await
    }
}

/// In-memory [`KeyValueStorage`] for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.inner.lock().expect("storage lock").get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.inner
            .lock()
            .expect("storage lock")
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.inner.lock().expect("storage lock").remove(key);
        Ok(())
    }
}
