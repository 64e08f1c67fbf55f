use tokio::sync::watch;

use crate::mirror::MirrorQueue;
use crate::storage::{KeyValueStorage, keys};
use crate::types::{LoginProvider, TokenPair, TokenUpdate, UserId};

/// Immutable snapshot of the authentication session.
///
/// Invariant: `logged_in` implies both `access_token` and `refresh_token`
/// are present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user_id: Option<UserId>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub device_token: Option<String>,
    pub provider: Option<LoginProvider>,
    pub logged_in: bool,
}

/// Single authoritative copy of the current authentication session.
///
/// Holds the in-memory state and keeps the durable copy in step. Durable
/// writes happen before the in-memory update, so a crash in between leaves
/// storage ahead of memory — recovered by the next [`restore_session`].
/// Storage failures are never fatal: operations report `false` and the next
/// launch retries.
///
/// [`restore_session`]: SessionStore::restore_session
pub struct SessionStore<S: KeyValueStorage> {
    storage: S,
    mirror: Option<MirrorQueue>,
    tx: watch::Sender<Session>,
}

impl<S: KeyValueStorage> SessionStore<S> {
    #[must_use]
    pub fn new(storage: S) -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self {
            storage,
            mirror: None,
            tx,
        }
    }

    /// Attach a companion-device mirror queue. The access token is enqueued
    /// on every successful [`set_session`](SessionStore::set_session).
    #[must_use]
    pub fn with_mirror(mut self, mirror: MirrorQueue) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Current session snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.tx.borrow().logged_in
    }

    /// Watch the session for changes (UI binding point).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Establish a session after a successful login exchange.
    ///
    /// Tokens are persisted first, then the in-memory state is updated.
    /// Returns `false` without touching memory if any durable write fails.
    /// The companion-device mirror is best-effort and never affects the
    /// result.
    pub async fn set_session(
        &self,
        user_id: impl Into<UserId>,
        tokens: TokenPair,
        provider: LoginProvider,
    ) -> bool {
        let user_id = user_id.into();

        let mut writes = vec![
            (keys::ACCESS_TOKEN, tokens.access_token.as_str()),
            (keys::REFRESH_TOKEN, tokens.refresh_token.as_str()),
            (keys::USER_ID, user_id.as_str()),
        ];
        if let Some(device) = tokens.device_token.as_deref() {
            writes.push((keys::BLE_TOKEN, device));
        }
        for (key, value) in writes {
            if let Err(e) = self.storage.set(key, value).await {
                tracing::error!(error = %e, key, "failed to persist session");
                return false;
            }
        }

        self.tx.send_replace(Session {
            user_id: Some(user_id),
            access_token: Some(tokens.access_token.clone()),
            refresh_token: Some(tokens.refresh_token),
            device_token: tokens.device_token,
            provider: Some(provider),
            logged_in: true,
        });

        if let Some(mirror) = &self.mirror {
            mirror.enqueue(&tokens.access_token);
        }
        tracing::info!(provider = ?provider, "session established");
        true
    }

    /// Restore the session from durable storage on process start.
    ///
    /// The session is active only if both the access and refresh tokens are
    /// present. Never errors; storage failures read as "not found".
    pub async fn restore_session(&self) -> bool {
        let access = self.read_key(keys::ACCESS_TOKEN).await;
        let refresh = self.read_key(keys::REFRESH_TOKEN).await;

        let (Some(access), Some(refresh)) = (access, refresh) else {
            tracing::debug!("no stored session to restore");
            return false;
        };

        let user_id = self.read_key(keys::USER_ID).await.map(UserId);
        let device_token = self.read_key(keys::BLE_TOKEN).await;

        self.tx.send_replace(Session {
            user_id,
            access_token: Some(access),
            refresh_token: Some(refresh),
            device_token,
            // provider is not persisted; a profile fetch fills it in
            provider: None,
            logged_in: true,
        });
        tracing::info!("session restored from storage");
        true
    }

    /// Merge a subset of token fields into storage and memory.
    ///
    /// Fields not supplied are left unchanged. Returns `false` (memory
    /// untouched) if any durable write fails.
    pub async fn update_tokens(&self, update: TokenUpdate) -> bool {
        let pairs = [
            (keys::ACCESS_TOKEN, update.access_token.as_deref()),
            (keys::REFRESH_TOKEN, update.refresh_token.as_deref()),
            (keys::BLE_TOKEN, update.device_token.as_deref()),
            (keys::USER_ID, update.user_id.as_ref().map(UserId::as_str)),
        ];
        for (key, value) in pairs {
            let Some(value) = value else { continue };
            if let Err(e) = self.storage.set(key, value).await {
                tracing::error!(error = %e, key, "failed to persist token update");
                return false;
            }
        }

        self.tx.send_modify(|session| {
            if let Some(access) = update.access_token {
                session.access_token = Some(access);
            }
            if let Some(refresh) = update.refresh_token {
                session.refresh_token = Some(refresh);
            }
            if let Some(device) = update.device_token {
                session.device_token = Some(device);
            }
            if let Some(user_id) = update.user_id {
                session.user_id = Some(user_id);
            }
        });
        true
    }

    /// Log out: erase durable keys and reset memory to logged-out defaults.
    ///
    /// Erasure is best-effort; failures are logged and the in-memory reset
    /// happens regardless.
    pub async fn clear_session(&self) {
        for key in [
            keys::ACCESS_TOKEN,
            keys::REFRESH_TOKEN,
            keys::BLE_TOKEN,
            keys::USER_ID,
        ] {
            if let Err(e) = self.storage.remove(key).await {
                tracing::warn!(error = %e, key, "failed to erase session key");
            }
        }
        self.tx.send_replace(Session::default());
        tracing::info!("session cleared");
    }

    async fn read_key(&self, key: &str) -> Option<String> {
        match self.storage.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, key, "storage read failed during restore");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::error::Error;
    use crate::mirror::TokenMirror;
    use crate::storage::MemoryStorage;
    use crate::token;

    use super::*;

    /// Storage whose writes always fail.
    struct BrokenStorage;

    impl KeyValueStorage for BrokenStorage {
        async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), Error> {
            Err(Error::Storage("disk full".into()))
        }

        async fn remove(&self, _key: &str) -> Result<(), Error> {
            Err(Error::Storage("disk full".into()))
        }
    }

    #[tokio::test]
    async fn set_then_restore_roundtrips() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());

        let tokens = TokenPair::new("A1", "R1").with_device_token("B1");
        assert!(
            store
                .set_session("user-7", tokens, LoginProvider::Kakao)
                .await
        );

        // simulated process restart: fresh store over the same durable space
        let restored = SessionStore::new(storage);
        assert!(restored.restore_session().await);

        let session = restored.snapshot();
        assert!(session.logged_in);
        assert_eq!(session.user_id, Some(UserId::from("user-7")));
        assert_eq!(session.access_token.as_deref(), Some("A1"));
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
        assert_eq!(session.device_token.as_deref(), Some("B1"));
    }

    #[tokio::test]
    async fn clear_then_restore_is_inactive() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store
            .set_session("user-7", TokenPair::new("A1", "R1"), LoginProvider::Google)
            .await;

        store.clear_session().await;
        assert!(!store.is_logged_in());

        let restored = SessionStore::new(storage);
        assert!(!restored.restore_session().await);
        assert_eq!(restored.snapshot(), Session::default());
    }

    #[tokio::test]
    async fn restore_requires_both_tokens() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(keys::ACCESS_TOKEN, "A1").await.unwrap();
        // no refresh token stored

        let store = SessionStore::new(storage);
        assert!(!store.restore_session().await);
        assert!(!store.is_logged_in());
    }

    #[tokio::test]
    async fn storage_failure_reports_false_and_leaves_memory() {
        let store = SessionStore::new(BrokenStorage);
        let ok = store
            .set_session("user-7", TokenPair::new("A1", "R1"), LoginProvider::Kakao)
            .await;
        assert!(!ok);
        assert!(!store.is_logged_in());
    }

    #[tokio::test]
    async fn kakao_login_decodes_token_subject() {
        let access = token::tests::make_token(r#"{"sub":"member-1204"}"#);
        let user_id = token::decode_subject(&access).unwrap();

        let store = SessionStore::new(MemoryStorage::new());
        assert!(
            store
                .set_session(
                    user_id.clone(),
                    TokenPair::new(access, "R1"),
                    LoginProvider::Kakao,
                )
                .await
        );

        let session = store.snapshot();
        assert!(session.logged_in);
        assert_eq!(session.user_id, Some(UserId::from("member-1204")));
        assert_eq!(session.provider, Some(LoginProvider::Kakao));
        assert_eq!(user_id, "member-1204");
    }

    #[tokio::test]
    async fn update_tokens_merges_partial_fields() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store
            .set_session("user-7", TokenPair::new("A1", "R1"), LoginProvider::Kakao)
            .await;

        assert!(
            store
                .update_tokens(TokenUpdate::new().access_token("A2"))
                .await
        );

        let session = store.snapshot();
        assert_eq!(session.access_token.as_deref(), Some("A2"));
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
        assert_eq!(
            storage.get(keys::ACCESS_TOKEN).await.unwrap().as_deref(),
            Some("A2")
        );
        assert_eq!(
            storage.get(keys::REFRESH_TOKEN).await.unwrap().as_deref(),
            Some("R1")
        );
    }

    struct RecordingMirror {
        seen: Arc<Mutex<Vec<String>>>,
        notify: Arc<tokio::sync::Notify>,
    }

    impl TokenMirror for RecordingMirror {
        async fn push_access_token(&self, token: &str) -> Result<(), Error> {
            self.seen.lock().unwrap().push(token.to_owned());
            self.notify.notify_one();
            Ok(())
        }
    }

    #[tokio::test]
    async fn set_session_mirrors_access_token() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notify = Arc::new(tokio::sync::Notify::new());
        let queue = MirrorQueue::spawn(RecordingMirror {
            seen: seen.clone(),
            notify: notify.clone(),
        });

        let store = SessionStore::new(MemoryStorage::new()).with_mirror(queue);
        store
            .set_session("user-7", TokenPair::new("A1", "R1"), LoginProvider::Kakao)
            .await;

        notify.notified().await;
        assert_eq!(seen.lock().unwrap().as_slice(), ["A1".to_owned()]);
    }

    #[tokio::test]
    async fn subscribe_sees_login_and_logout() {
        let store = SessionStore::new(MemoryStorage::new());
        let mut rx = store.subscribe();
        assert!(!rx.borrow().logged_in);

        store
            .set_session("user-7", TokenPair::new("A1", "R1"), LoginProvider::Kakao)
            .await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().logged_in);

        store.clear_session().await;
        rx.changed().await.unwrap();
        assert!(!rx.borrow().logged_in);
    }
}
