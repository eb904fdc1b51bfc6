//! The session store: the one piece of shared mutable state in the client.
//!
//! Every view and controller holds a clone of the same [`SessionStore`]
//! handle. Writes go to durable storage first, then to memory, then out to
//! listeners, so a reload that races a write sees the same value the
//! listeners were told about.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use ideas_store::LocalStorage;
use ideas_types::UserSummary;

/// Storage key for the opaque access token.
pub const TOKEN_KEY: &str = "token";
/// Storage key for the JSON user record that belongs to the token.
pub const USER_KEY: &str = "user";

/// Current authentication state.
///
/// Either both token and user are present or neither is; the constructors
/// are the only way to build one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    token: String,
    user: UserSummary,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(token: impl Into<String>, user: UserSummary) -> Self {
        Self {
            credentials: Some(Credentials {
                token: token.into(),
                user,
            }),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.token.as_str())
    }

    pub fn user(&self) -> Option<&UserSummary> {
        self.credentials.as_ref().map(|c| &c.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }
}

type Listener = Arc<dyn Fn(&Session) + Send + Sync>;

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    storage: Arc<dyn LocalStorage>,
    /// Holds the current value; async consumers subscribe through it.
    current: watch::Sender<Session>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    /// Serializes persist + publish so storage and memory never disagree.
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Open the store, restoring whatever session `storage` holds.
    ///
    /// A stored token is trusted without a round trip to the server; the
    /// first `Unauthenticated` response clears it. A token without a
    /// readable user record (or the reverse) is dropped from storage.
    pub fn open(storage: Arc<dyn LocalStorage>) -> Self {
        let session = restore(storage.as_ref());
        let (current, _) = watch::channel(session);

        Self {
            inner: Arc::new(StoreInner {
                storage,
                current,
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn get(&self) -> Session {
        self.inner.current.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.current.borrow().token().map(str::to_string)
    }

    pub fn user(&self) -> Option<UserSummary> {
        self.inner.current.borrow().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.current.borrow().is_authenticated()
    }

    /// Replace the session: persist, update memory, then notify listeners.
    ///
    /// Storage failures are logged and otherwise ignored.
    /// Listeners must not call `set` themselves.
    pub fn set(&self, session: Session) {
        self.replace_if(session, |_| true);
    }

    pub fn clear(&self) {
        self.set(Session::anonymous());
    }

    /// Clear the session only if it still holds `token`. Returns whether it
    /// did; a session replaced since `token` was issued is left alone.
    pub fn clear_token(&self, token: &str) -> bool {
        self.replace_if(Session::anonymous(), |current| current.token() == Some(token))
    }

    fn replace_if(&self, session: Session, matches: impl FnOnce(&Session) -> bool) -> bool {
        {
            let _guard = self.inner.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let current_matches = matches(&self.inner.current.borrow());
            if !current_matches {
                return false;
            }
            self.persist(&session);
            self.inner.current.send_replace(session.clone());
        }

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        debug!(
            authenticated = session.is_authenticated(),
            listeners = listeners.len(),
            "Session updated"
        );
        for listener in listeners {
            listener(&session);
        }
        true
    }

    /// Call `listener` after every `set`. The listener stays registered until
    /// the returned [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));

        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Async view of the session for consumers running in tasks.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.inner.current.subscribe()
    }

    fn persist(&self, session: &Session) {
        let storage = self.inner.storage.as_ref();

        let result = match session.credentials.as_ref() {
            Some(creds) => serde_json::to_string(&creds.user)
                .map_err(anyhow::Error::from)
                .and_then(|user_json| {
                    storage.set(TOKEN_KEY, &creds.token)?;
                    storage.set(USER_KEY, &user_json)
                }),
            None => storage
                .remove(TOKEN_KEY)
                .and_then(|_| storage.remove(USER_KEY)),
        };

        if let Err(e) = result {
            warn!("Failed to persist session: {:#}", e);
        }
    }
}

/// Handle for a listener registered with [`SessionStore::subscribe`].
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}

fn restore(storage: &dyn LocalStorage) -> Session {
    let token = storage.get(TOKEN_KEY).unwrap_or_else(|e| {
        warn!("Failed to read stored token: {:#}", e);
        None
    });
    let user_json = storage.get(USER_KEY).unwrap_or_else(|e| {
        warn!("Failed to read stored user: {:#}", e);
        None
    });

    let user = user_json.as_deref().and_then(|json| {
        serde_json::from_str::<UserSummary>(json)
            .map_err(|e| warn!("Discarding unreadable stored user: {}", e))
            .ok()
    });

    match (token, user) {
        (Some(token), Some(user)) => {
            info!("Restored session for {}", user.username);
            Session::authenticated(token, user)
        }
        (None, None) if user_json.is_none() => Session::anonymous(),
        _ => {
            warn!("Stored session is incomplete, starting signed out");
            let cleanup = storage
                .remove(TOKEN_KEY)
                .and_then(|_| storage.remove(USER_KEY));
            if let Err(e) = cleanup {
                warn!("Failed to clear incomplete session: {:#}", e);
            }
            Session::anonymous()
        }
    }
}
