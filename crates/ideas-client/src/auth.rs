//! Login, registration and logout.
//!
//! [`SessionController`] is the only writer of authenticated sessions into
//! the [`SessionStore`]. It also owns the policy for credentials the server
//! rejects: any `Unauthenticated` answer to a token-bearing request clears
//! the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use ideas_types::UserSummary;
use ideas_types::api::{LoginRequest, RegisterRequest};

use crate::error::{ApiError, ApiResult};
use crate::gateway::IdeasApi;
use crate::session::{Session, SessionStore};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticating,
    Authenticated,
    LoggingOut,
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    store: SessionStore,
    api: Arc<dyn IdeasApi>,
    state: Mutex<AuthState>,
    /// Set when logout is asked for while a sign-in is in flight.
    logout_requested: AtomicBool,
}

impl SessionController {
    pub fn new(store: SessionStore, api: Arc<dyn IdeasApi>) -> Self {
        let initial = if store.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        };

        let inner = Arc::new(ControllerInner {
            store,
            api,
            state: Mutex::new(initial),
            logout_requested: AtomicBool::new(false),
        });

        let weak: Weak<ControllerInner> = Arc::downgrade(&inner);
        inner.api.set_unauthenticated_hook(Arc::new(move |token: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.expire(Some(token));
            }
        }));

        Self { inner }
    }

    pub fn state(&self) -> AuthState {
        *self.inner.lock_state()
    }

    /// True iff the store holds a user.
    pub fn is_authenticated(&self) -> bool {
        self.inner.store.is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserSummary> {
        self.inner.store.user()
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<UserSummary> {
        let transition = self.inner.begin_authenticating()?;

        if username.is_empty() || password.is_empty() {
            transition.settle(AuthState::Anonymous);
            return Err(ApiError::validation("Please fill in all fields"));
        }

        let req = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let result = self.inner.api.login(&req).await;
        self.inner.finish_authenticating(transition, result)
    }

    pub async fn register(&self, fields: RegisterRequest) -> ApiResult<UserSummary> {
        let transition = self.inner.begin_authenticating()?;

        if let Err(e) = validate_registration(&fields) {
            transition.settle(AuthState::Anonymous);
            return Err(e);
        }

        let result = self.inner.api.register(&fields).await;
        self.inner.finish_authenticating(transition, result)
    }

    /// Sign out. The server is told on a best-effort basis; the local session
    /// is cleared whatever it answers (or if it never answers).
    ///
    /// During a sign-in the request is recorded and the sign-in's session is
    /// discarded when it arrives.
    pub async fn logout(&self) {
        let transition = {
            let mut state = self.inner.lock_state();
            match *state {
                AuthState::LoggingOut => return,
                AuthState::Authenticating => {
                    self.inner.logout_requested.store(true, Ordering::SeqCst);
                    info!("Logout requested while signing in");
                    return;
                }
                AuthState::Anonymous | AuthState::Authenticated => {}
            }
            *state = AuthState::LoggingOut;
            Transition::new(&self.inner, AuthState::Anonymous)
        };

        if self.inner.store.is_authenticated() {
            if let Err(e) = self.inner.api.logout().await {
                warn!("Server logout failed, clearing local session anyway: {}", e);
            }
        }

        self.inner.store.clear();
        transition.settle(AuthState::Anonymous);
        info!("Logged out");
    }

    /// Drop the session because the server no longer accepts its token.
    pub fn expire(&self) {
        self.inner.expire(None);
    }
}

impl ControllerInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_authenticating(&self) -> ApiResult<Transition<'_>> {
        let mut state = self.lock_state();
        match *state {
            AuthState::Anonymous => {
                *state = AuthState::Authenticating;
                self.logout_requested.store(false, Ordering::SeqCst);
                Ok(Transition::new(self, AuthState::Anonymous))
            }
            AuthState::Authenticated => Err(ApiError::validation("Already signed in, log out first")),
            AuthState::Authenticating | AuthState::LoggingOut => {
                Err(ApiError::validation("Another sign-in request is still in progress"))
            }
        }
    }

    fn finish_authenticating(
        &self,
        transition: Transition<'_>,
        result: ApiResult<ideas_types::api::AuthResponse>,
    ) -> ApiResult<UserSummary> {
        match result {
            Ok(resp) => {
                let (token, user) = (resp.access, resp.user);
                self.store.set(Session::authenticated(token.clone(), user.clone()));
                if transition.settle_unless_logout(AuthState::Authenticated) {
                    self.store.clear_token(&token);
                    info!("Discarded session for {}, logout was requested", user.username);
                    return Err(ApiError::unauthenticated("Logged out before sign-in completed"));
                }
                info!("Signed in as {}", user.username);
                Ok(user)
            }
            Err(e) => {
                transition.settle(AuthState::Anonymous);
                Err(e)
            }
        }
    }

    /// `rejected` is the token the server refused. A session holding any
    /// other token was set after that request went out and is kept.
    fn expire(&self, rejected: Option<&str>) {
        {
            let mut state = self.lock_state();
            match *state {
                AuthState::Authenticated | AuthState::Anonymous => {}
                // Logout clears on its own; an in-flight login has no token to expire.
                AuthState::LoggingOut | AuthState::Authenticating => return,
            }
            if let Some(rejected) = rejected {
                if self.store.token().as_deref() != Some(rejected) {
                    debug!("Ignoring rejection of a token that is no longer in use");
                    return;
                }
            }
            *state = AuthState::Anonymous;
        }

        let cleared = match rejected {
            Some(token) => self.store.clear_token(token),
            None if self.store.is_authenticated() => {
                self.store.clear();
                true
            }
            None => false,
        };
        if cleared {
            warn!("Server rejected the session token, signing out");
        }
    }
}

/// An in-progress state change. Dropping it unsettled (the caller's future
/// was cancelled) falls back to `fallback`.
struct Transition<'a> {
    inner: &'a ControllerInner,
    fallback: AuthState,
    settled: bool,
}

impl<'a> Transition<'a> {
    fn new(inner: &'a ControllerInner, fallback: AuthState) -> Self {
        Self {
            inner,
            fallback,
            settled: false,
        }
    }

    fn settle(mut self, state: AuthState) {
        *self.inner.lock_state() = state;
        self.settled = true;
    }

    /// Settle to `state`, or to `Anonymous` if a logout arrived meanwhile.
    /// Returns whether the logout won.
    fn settle_unless_logout(mut self, state: AuthState) -> bool {
        let mut current = self.inner.lock_state();
        let logout = self.inner.logout_requested.swap(false, Ordering::SeqCst);
        *current = if logout { AuthState::Anonymous } else { state };
        self.settled = true;
        logout
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self.fallback == AuthState::Anonymous && self.inner.store.is_authenticated() {
            self.inner.store.clear();
        }
        *self.inner.lock_state() = self.fallback;
    }
}

/// Local checks run before a registration is sent. First failure wins.
pub fn validate_registration(fields: &RegisterRequest) -> ApiResult<()> {
    if fields.username.is_empty()
        || fields.email.is_empty()
        || fields.password.is_empty()
        || fields.password_confirm.is_empty()
    {
        return Err(ApiError::validation("Please fill in all required fields"));
    }
    if fields.password != fields.password_confirm {
        return Err(ApiError::validation("Passwords do not match"));
    }
    if fields.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password must be at least 8 characters long"));
    }
    Ok(())
}
