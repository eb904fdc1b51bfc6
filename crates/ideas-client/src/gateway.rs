//! Transport to the ideas API.
//!
//! Every call reads the token from the [`SessionStore`] at send time and
//! attaches it as a bearer credential. Every failure, including timeouts and
//! undecodable bodies, comes back as an [`ApiError`].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use ideas_types::api::{
    AddCommentRequest, AuthResponse, CreateIdeaRequest, CreatedIdea, IdeaListResponse, LikeResponse,
    LikeStatus, LoginRequest, RegisterRequest,
};
use ideas_types::{Comment, Idea, IdeaId};

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult, ErrorKind, first_field_message};
use crate::session::SessionStore;

/// Called with the token a request carried when the server answered it
/// with `Unauthenticated`.
pub type UnauthenticatedHook = Arc<dyn Fn(&str) + Send + Sync>;

/// The remote operations the client consumes.
#[async_trait]
pub trait IdeasApi: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> ApiResult<AuthResponse>;

    async fn register(&self, req: &RegisterRequest) -> ApiResult<AuthResponse>;

    async fn logout(&self) -> ApiResult<()>;

    async fn list_ideas(&self) -> ApiResult<Vec<Idea>>;

    async fn top_ideas(&self) -> ApiResult<Vec<Idea>>;

    async fn get_idea(&self, id: IdeaId) -> ApiResult<Idea>;

    async fn create_idea(&self, req: &CreateIdeaRequest) -> ApiResult<CreatedIdea>;

    /// Toggle the caller's like. The returned status is the server's new state.
    async fn like_idea(&self, id: IdeaId) -> ApiResult<LikeStatus>;

    async fn add_comment(&self, id: IdeaId, content: &str) -> ApiResult<Comment>;

    /// Install the hook fired on credential rejection. Implementations
    /// without credentials may ignore it.
    fn set_unauthenticated_hook(&self, _hook: UnauthenticatedHook) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Login,
    Register,
    Logout,
    ListIdeas,
    TopIdeas,
    GetIdea,
    CreateIdea,
    LikeIdea,
    AddComment,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Login => "login",
            Op::Register => "register",
            Op::Logout => "logout",
            Op::ListIdeas => "list_ideas",
            Op::TopIdeas => "top_ideas",
            Op::GetIdea => "get_idea",
            Op::CreateIdea => "create_idea",
            Op::LikeIdea => "like_idea",
            Op::AddComment => "add_comment",
        }
    }

    fn fallback(self) -> &'static str {
        match self {
            Op::Login => "Login failed",
            Op::Register => "Registration failed",
            Op::Logout => "Logout failed",
            Op::ListIdeas | Op::TopIdeas => "Failed to load ideas",
            Op::GetIdea => "Failed to load idea",
            Op::CreateIdea => "Failed to submit idea. Please try again.",
            Op::LikeIdea => "Failed to like idea",
            Op::AddComment => "Failed to post comment",
        }
    }

    /// Login and registration answer bad credentials with 401; that is an
    /// input problem, not an expired session.
    fn is_credential_exchange(self) -> bool {
        matches!(self, Op::Login | Op::Register)
    }
}

/// [`IdeasApi`] over HTTP.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    store: SessionStore,
    unauthenticated_hook: RwLock<Option<UnauthenticatedHook>>,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig, store: SessionStore) -> anyhow::Result<Self> {
        Ok(Self::with_client(config.http_client()?, &config.api_url, store))
    }

    pub fn with_client(client: Client, base_url: &str, store: SessionStore) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            unauthenticated_hook: RwLock::new(None),
        }
    }

    /// The builder plus the token attached to it, if any.
    fn request(&self, method: Method, path: &str) -> (RequestBuilder, Option<String>) {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match self.store.token() {
            Some(token) => (builder.bearer_auth(&token), Some(token)),
            None => (builder, None),
        }
    }

    async fn call<T, B>(&self, op: Op, method: Method, path: &str, body: Option<&B>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let resp = self.send(op, method, path, body).await?;
        decode(op, resp).await
    }

    async fn send<B>(&self, op: Op, method: Method, path: &str, body: Option<&B>) -> ApiResult<Response>
    where
        B: Serialize + ?Sized,
    {
        let (mut builder, token) = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!(op = op.name(), path, with_token = token.is_some(), "API request");

        let result = match builder.send().await {
            Ok(resp) if resp.status().is_success() => Ok(resp),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                Err(status_error(op, status, &body))
            }
            Err(e) => Err(transport_error(op, &e)),
        };

        if let Err(e) = &result {
            debug!(op = op.name(), kind = %e.kind, "API request failed: {}", e.message);
            if let Some(token) = token.as_deref() {
                if e.is_unauthenticated() && !op.is_credential_exchange() {
                    self.notify_unauthenticated(token);
                }
            }
        }

        result
    }

    fn notify_unauthenticated(&self, token: &str) {
        let hook = self
            .unauthenticated_hook
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match hook {
            Some(hook) => hook(token),
            None => warn!("Credential rejected but no session hook is installed"),
        }
    }
}

#[async_trait]
impl IdeasApi for HttpGateway {
    async fn login(&self, req: &LoginRequest) -> ApiResult<AuthResponse> {
        self.call(Op::Login, Method::POST, "/api/auth/login/", Some(req)).await
    }

    async fn register(&self, req: &RegisterRequest) -> ApiResult<AuthResponse> {
        self.call(Op::Register, Method::POST, "/api/auth/register/", Some(req)).await
    }

    async fn logout(&self) -> ApiResult<()> {
        self.send::<()>(Op::Logout, Method::POST, "/api/auth/logout/", None)
            .await
            .map(|_| ())
    }

    async fn list_ideas(&self) -> ApiResult<Vec<Idea>> {
        self.call::<IdeaListResponse, ()>(Op::ListIdeas, Method::GET, "/api/ideas/", None)
            .await
            .map(IdeaListResponse::into_ideas)
    }

    async fn top_ideas(&self) -> ApiResult<Vec<Idea>> {
        self.call::<_, ()>(Op::TopIdeas, Method::GET, "/api/top-ideas/", None).await
    }

    async fn get_idea(&self, id: IdeaId) -> ApiResult<Idea> {
        self.call::<_, ()>(Op::GetIdea, Method::GET, &format!("/api/ideas/{id}/"), None).await
    }

    async fn create_idea(&self, req: &CreateIdeaRequest) -> ApiResult<CreatedIdea> {
        self.call(Op::CreateIdea, Method::POST, "/api/ideas/", Some(req)).await
    }

    async fn like_idea(&self, id: IdeaId) -> ApiResult<LikeStatus> {
        self.call::<LikeResponse, ()>(Op::LikeIdea, Method::POST, &format!("/api/ideas/{id}/like/"), None)
            .await
            .map(|resp| resp.status)
    }

    async fn add_comment(&self, id: IdeaId, content: &str) -> ApiResult<Comment> {
        let req = AddCommentRequest {
            content: content.to_string(),
        };
        self.call(Op::AddComment, Method::POST, &format!("/api/ideas/{id}/add_comment/"), Some(&req))
            .await
    }

    fn set_unauthenticated_hook(&self, hook: UnauthenticatedHook) {
        *self
            .unauthenticated_hook
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }
}

async fn decode<T: DeserializeOwned>(op: Op, resp: Response) -> ApiResult<T> {
    let bytes = resp.bytes().await.map_err(|e| transport_error(op, &e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::unknown(format!("{}: unexpected response from server ({})", op.fallback(), e)))
}

fn status_error(op: Op, status: u16, body: &str) -> ApiError {
    let mut err = ApiError::from_status(status, body, op.fallback());

    if op.is_credential_exchange() && err.kind == ErrorKind::Unauthenticated {
        err.kind = ErrorKind::Validation;
    }
    if op == Op::CreateIdea && err.kind == ErrorKind::Validation {
        err.message = first_field_message(body, &["title", "description"])
            .unwrap_or_else(|| op.fallback().to_string());
    }

    err
}

fn transport_error(op: Op, e: &reqwest::Error) -> ApiError {
    if e.is_decode() {
        return ApiError::unknown(format!("{}: {}", op.fallback(), e));
    }
    if e.is_timeout() {
        return ApiError::network(format!("{}: request timed out", op.fallback()));
    }
    ApiError::network(format!("{}: could not reach the server ({})", op.fallback(), e))
}
