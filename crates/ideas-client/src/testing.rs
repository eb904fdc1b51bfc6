//! A scripted [`IdeasApi`] for controller tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Semaphore;

use ideas_types::api::{
    AuthResponse, CreateIdeaRequest, CreatedIdea, LikeStatus, LoginRequest, RegisterRequest,
};
use ideas_types::{Comment, Idea, IdeaId, UserSummary};

use crate::error::{ApiError, ApiResult};
use crate::gateway::{IdeasApi, UnauthenticatedHook};

#[derive(Default)]
pub struct ScriptedApi {
    state: Mutex<Script>,
    /// When set, every call waits for a permit before answering.
    gate: Mutex<Option<Arc<Semaphore>>>,
    hook: Mutex<Option<UnauthenticatedHook>>,
}

#[derive(Default)]
struct Script {
    auth: VecDeque<ApiResult<AuthResponse>>,
    likes: VecDeque<ApiResult<LikeStatus>>,
    comments: VecDeque<ApiResult<Comment>>,
    created: VecDeque<ApiResult<CreatedIdea>>,
    logout_error: Option<ApiError>,
    ideas: Vec<Idea>,
    top: Vec<Idea>,
    list_error: Option<ApiError>,
    top_error: Option<ApiError>,
    calls: HashMap<&'static str, usize>,
    in_flight: HashMap<&'static str, usize>,
    max_in_flight: HashMap<&'static str, usize>,
    last_create: Option<CreateIdeaRequest>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_auth(&self, reply: ApiResult<AuthResponse>) {
        self.script().auth.push_back(reply);
    }

    pub fn push_like(&self, reply: ApiResult<LikeStatus>) {
        self.script().likes.push_back(reply);
    }

    pub fn push_comment(&self, reply: ApiResult<Comment>) {
        self.script().comments.push_back(reply);
    }

    pub fn push_created(&self, reply: ApiResult<CreatedIdea>) {
        self.script().created.push_back(reply);
    }

    pub fn fail_logout(&self, err: ApiError) {
        self.script().logout_error = Some(err);
    }

    pub fn set_ideas(&self, ideas: Vec<Idea>) {
        self.script().ideas = ideas;
    }

    pub fn set_top(&self, top: Vec<Idea>) {
        self.script().top = top;
    }

    pub fn fail_list(&self, err: ApiError) {
        self.script().list_error = Some(err);
    }

    pub fn fail_top(&self, err: ApiError) {
        self.script().top_error = Some(err);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.script().calls.get(op).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self, op: &str) -> usize {
        self.script().max_in_flight.get(op).copied().unwrap_or(0)
    }

    pub fn last_create(&self) -> Option<CreateIdeaRequest> {
        self.script().last_create.clone()
    }

    /// Make calls block until [`release`](Self::release) hands out permits.
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(calls);
        }
    }

    /// Yield until at least `n` calls are waiting on the gate or the server.
    pub async fn wait_for_in_flight(&self, n: usize) {
        for _ in 0..10_000 {
            if self.script().in_flight.values().sum::<usize>() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("never saw {n} calls in flight");
    }

    /// Behave like the HTTP gateway after the server rejected `token`.
    pub fn fire_unauthenticated(&self, token: &str) {
        let hook = self.hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(token);
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.state.lock().unwrap()
    }

    async fn enter(&self, op: &'static str) -> InFlight<'_> {
        {
            let mut script = self.script();
            *script.calls.entry(op).or_default() += 1;
            let now = {
                let current = script.in_flight.entry(op).or_default();
                *current += 1;
                *current
            };
            let max = script.max_in_flight.entry(op).or_default();
            *max = (*max).max(now);
        }
        let guard = InFlight { api: self, op };

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        guard
    }
}

struct InFlight<'a> {
    api: &'a ScriptedApi,
    op: &'static str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(current) = self.api.script().in_flight.get_mut(self.op) {
            *current -= 1;
        }
    }
}

fn unscripted(op: &str) -> ApiError {
    ApiError::unknown(format!("no scripted reply for {op}"))
}

#[async_trait]
impl IdeasApi for ScriptedApi {
    async fn login(&self, _req: &LoginRequest) -> ApiResult<AuthResponse> {
        let _call = self.enter("login").await;
        let reply = self.script().auth.pop_front();
        reply.unwrap_or_else(|| Err(unscripted("login")))
    }

    async fn register(&self, _req: &RegisterRequest) -> ApiResult<AuthResponse> {
        let _call = self.enter("register").await;
        let reply = self.script().auth.pop_front();
        reply.unwrap_or_else(|| Err(unscripted("register")))
    }

    async fn logout(&self) -> ApiResult<()> {
        let _call = self.enter("logout").await;
        let err = self.script().logout_error.take();
        err.map_or(Ok(()), Err)
    }

    async fn list_ideas(&self) -> ApiResult<Vec<Idea>> {
        let _call = self.enter("list_ideas").await;
        let reply = {
            let script = self.script();
            match &script.list_error {
                Some(err) => Err(err.clone()),
                None => Ok(script.ideas.clone()),
            }
        };
        reply
    }

    async fn top_ideas(&self) -> ApiResult<Vec<Idea>> {
        let _call = self.enter("top_ideas").await;
        let reply = {
            let script = self.script();
            match &script.top_error {
                Some(err) => Err(err.clone()),
                None => Ok(script.top.clone()),
            }
        };
        reply
    }

    async fn get_idea(&self, id: IdeaId) -> ApiResult<Idea> {
        let _call = self.enter("get_idea").await;
        let found = self.script().ideas.iter().find(|idea| idea.id == id).cloned();
        found.ok_or_else(|| ApiError::not_found("Failed to load idea: not found"))
    }

    async fn create_idea(&self, req: &CreateIdeaRequest) -> ApiResult<CreatedIdea> {
        let _call = self.enter("create_idea").await;
        let reply = {
            let mut script = self.script();
            script.last_create = Some(req.clone());
            script.created.pop_front()
        };
        reply.unwrap_or_else(|| Err(unscripted("create_idea")))
    }

    async fn like_idea(&self, _id: IdeaId) -> ApiResult<LikeStatus> {
        let _call = self.enter("like_idea").await;
        let reply = self.script().likes.pop_front();
        reply.unwrap_or_else(|| Err(unscripted("like_idea")))
    }

    async fn add_comment(&self, _id: IdeaId, _content: &str) -> ApiResult<Comment> {
        let _call = self.enter("add_comment").await;
        let reply = self.script().comments.pop_front();
        reply.unwrap_or_else(|| Err(unscripted("add_comment")))
    }

    fn set_unauthenticated_hook(&self, hook: UnauthenticatedHook) {
        *self.hook.lock().unwrap() = Some(hook);
    }
}

pub fn auth_response(token: &str, user_id: u64, username: &str) -> AuthResponse {
    AuthResponse {
        access: token.to_string(),
        user: UserSummary::new(user_id, username),
        refresh: None,
    }
}

/// An idea created `id` hours after a fixed epoch, so larger ids are newer.
pub fn idea(id: IdeaId, likes_count: u32, is_liked: bool) -> Idea {
    Idea {
        id,
        title: format!("Idea number {id}"),
        description: "A description long enough to pass every local check we run.".into(),
        pitcher: UserSummary::new(100, "pitcher"),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(id as i64),
        likes_count,
        is_liked,
        comments: Vec::new(),
    }
}

pub fn comment(id: u64, content: &str) -> Comment {
    Comment {
        id,
        commenter: UserSummary::new(1, "priya"),
        content: content.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap(),
    }
}
