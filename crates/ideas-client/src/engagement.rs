//! Likes and comments on ideas open in a view.
//!
//! A view calls [`EngagementController::track`] with the idea it shows and
//! reads the local copy back with [`EngagementController::snapshot`]. Likes
//! are applied optimistically and then reconciled with the server's answer;
//! comments are inserted only once the server has created them.
//!
//! Each idea has one intent slot per action kind. A slot is `Idle` or
//! `Pending`; while a like is pending further likes for that idea are
//! ignored, while a comment is pending further comments are refused. Slots
//! belong to the controller rather than to the view, so closing and
//! reopening a view cannot start a second concurrent like.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use ideas_types::api::LikeStatus;
use ideas_types::{Comment, Idea, IdeaId};

use crate::error::{ApiError, EngagementError};
use crate::gateway::IdeasApi;
use crate::session::SessionStore;

/// The two optimistically mutated fields of an idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeSnapshot {
    pub likes_count: u32,
    pub is_liked: bool,
}

impl LikeSnapshot {
    pub fn of(idea: &Idea) -> Self {
        Self {
            likes_count: idea.likes_count,
            is_liked: idea.is_liked,
        }
    }

    /// Local guess at the result of toggling.
    pub fn toggled(self) -> Self {
        if self.is_liked {
            Self {
                likes_count: self.likes_count.saturating_sub(1),
                is_liked: false,
            }
        } else {
            Self {
                likes_count: self.likes_count.saturating_add(1),
                is_liked: true,
            }
        }
    }

    /// State after the server reported `status` for a toggle that started
    /// from `self`.
    pub fn settled(self, status: LikeStatus) -> Self {
        let is_liked = status.is_liked();
        let likes_count = if is_liked {
            self.likes_count.saturating_add(1)
        } else {
            self.likes_count.saturating_sub(1)
        };
        Self { likes_count, is_liked }
    }

    fn apply_to(self, idea: &mut Idea) {
        idea.likes_count = self.likes_count;
        idea.is_liked = self.is_liked;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeIntent {
    #[default]
    Idle,
    /// `prior` is the state before the optimistic flip.
    Pending { prior: LikeSnapshot, generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentIntent {
    #[default]
    Idle,
    Pending { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    /// The server answered; the local copy now matches it.
    Committed(LikeSnapshot),
    /// A like for this idea was already in flight.
    Ignored,
    /// The server answered after the view went away.
    Discarded(LikeSnapshot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    /// Prepended to the local comment list.
    Committed(Comment),
    /// Created on the server after the view went away.
    Discarded(Comment),
}

#[derive(Clone)]
pub struct EngagementController {
    inner: Arc<EngagementInner>,
}

struct EngagementInner {
    store: SessionStore,
    api: Arc<dyn IdeasApi>,
    state: Mutex<EngagementState>,
}

#[derive(Default)]
struct EngagementState {
    tracked: HashMap<IdeaId, TrackedIdea>,
    intents: HashMap<IdeaId, IntentSlots>,
    next_generation: u64,
}

struct TrackedIdea {
    idea: Idea,
    generation: u64,
    /// Unsent comment text for this idea.
    draft: String,
}

#[derive(Default)]
struct IntentSlots {
    like: LikeIntent,
    comment: CommentIntent,
}

impl IntentSlots {
    fn is_idle(&self) -> bool {
        self.like == LikeIntent::Idle && self.comment == CommentIntent::Idle
    }
}

impl EngagementState {
    /// The tracked idea, but only if it is still the copy an action started on.
    fn tracked_at(&mut self, id: IdeaId, generation: u64) -> Option<&mut TrackedIdea> {
        self.tracked.get_mut(&id).filter(|t| t.generation == generation)
    }

    fn clear_like(&mut self, id: IdeaId) {
        if let Some(slots) = self.intents.get_mut(&id) {
            slots.like = LikeIntent::Idle;
            if slots.is_idle() {
                self.intents.remove(&id);
            }
        }
    }

    fn clear_comment(&mut self, id: IdeaId) {
        if let Some(slots) = self.intents.get_mut(&id) {
            slots.comment = CommentIntent::Idle;
            if slots.is_idle() {
                self.intents.remove(&id);
            }
        }
    }
}

impl EngagementController {
    pub fn new(store: SessionStore, api: Arc<dyn IdeasApi>) -> Self {
        Self {
            inner: Arc::new(EngagementInner {
                store,
                api,
                state: Mutex::new(EngagementState::default()),
            }),
        }
    }

    /// Start (or refresh) the local copy of `idea`.
    ///
    /// Refreshing replaces the copy with the server's and makes results of
    /// actions started on the old copy stale. The comment draft is kept.
    pub fn track(&self, idea: Idea) {
        let mut state = self.inner.lock_state();
        state.next_generation += 1;
        let generation = state.next_generation;

        let id = idea.id;
        let draft = state
            .tracked
            .remove(&id)
            .map(|t| t.draft)
            .unwrap_or_default();
        state.tracked.insert(
            id,
            TrackedIdea {
                idea,
                generation,
                draft,
            },
        );
        debug!(idea = id, generation, "Tracking idea");
    }

    /// Forget the local copy. Results still in flight for it are discarded.
    pub fn untrack(&self, id: IdeaId) {
        if self.inner.lock_state().tracked.remove(&id).is_some() {
            debug!(idea = id, "Stopped tracking idea");
        }
    }

    pub fn snapshot(&self, id: IdeaId) -> Option<Idea> {
        self.inner.lock_state().tracked.get(&id).map(|t| t.idea.clone())
    }

    pub fn likes(&self, id: IdeaId) -> Option<LikeSnapshot> {
        self.inner
            .lock_state()
            .tracked
            .get(&id)
            .map(|t| LikeSnapshot::of(&t.idea))
    }

    pub fn like_intent(&self, id: IdeaId) -> LikeIntent {
        self.inner
            .lock_state()
            .intents
            .get(&id)
            .map(|s| s.like)
            .unwrap_or_default()
    }

    pub fn comment_intent(&self, id: IdeaId) -> CommentIntent {
        self.inner
            .lock_state()
            .intents
            .get(&id)
            .map(|s| s.comment)
            .unwrap_or_default()
    }

    pub fn draft(&self, id: IdeaId) -> Option<String> {
        self.inner.lock_state().tracked.get(&id).map(|t| t.draft.clone())
    }

    pub fn set_draft(&self, id: IdeaId, text: impl Into<String>) {
        if let Some(tracked) = self.inner.lock_state().tracked.get_mut(&id) {
            tracked.draft = text.into();
        }
    }

    /// Like or unlike `id`.
    ///
    /// The local copy flips immediately. When the server answers, its status
    /// decides the final state; when the request fails, the copy is restored
    /// to what it was before the flip and the error is returned.
    pub async fn toggle_like(&self, id: IdeaId) -> Result<LikeOutcome, EngagementError> {
        if !self.inner.store.is_authenticated() {
            return Err(EngagementError::Rejected(ApiError::unauthenticated(
                "Please login to like ideas",
            )));
        }

        let pending = {
            let mut guard = self.inner.lock_state();
            let state = &mut *guard;

            let tracked = state.tracked.get_mut(&id).ok_or(EngagementError::Untracked(id))?;
            let slots = state.intents.entry(id).or_default();
            if let LikeIntent::Pending { .. } = slots.like {
                debug!(idea = id, "Like already in flight, ignoring");
                return Ok(LikeOutcome::Ignored);
            }

            let prior = LikeSnapshot::of(&tracked.idea);
            prior.toggled().apply_to(&mut tracked.idea);
            slots.like = LikeIntent::Pending {
                prior,
                generation: tracked.generation,
            };
            debug!(idea = id, ?prior, "Like applied optimistically");

            PendingLike {
                inner: &self.inner,
                id,
                prior,
                generation: tracked.generation,
                done: false,
            }
        };

        let result = self.inner.api.like_idea(id).await;
        pending.resolve(result)
    }

    /// Post a comment on `id`.
    ///
    /// `content` is kept as the idea's draft until the server confirms the
    /// comment, so a failed post can be retried from the same text.
    pub async fn post_comment(&self, id: IdeaId, content: &str) -> Result<CommentOutcome, EngagementError> {
        if !self.inner.store.is_authenticated() {
            return Err(EngagementError::Rejected(ApiError::unauthenticated(
                "Please login to comment on this idea",
            )));
        }
        if content.trim().is_empty() {
            return Err(EngagementError::Rejected(ApiError::validation(
                "Comment cannot be empty",
            )));
        }

        let pending = {
            let mut guard = self.inner.lock_state();
            let state = &mut *guard;

            let tracked = state.tracked.get_mut(&id).ok_or(EngagementError::Untracked(id))?;
            let slots = state.intents.entry(id).or_default();
            if let CommentIntent::Pending { .. } = slots.comment {
                return Err(EngagementError::CommentInFlight(id));
            }

            tracked.draft = content.to_string();
            slots.comment = CommentIntent::Pending {
                generation: tracked.generation,
            };

            PendingComment {
                inner: &self.inner,
                id,
                generation: tracked.generation,
                done: false,
            }
        };

        let result = self.inner.api.add_comment(id, content).await;
        pending.resolve(result)
    }
}

impl EngagementInner {
    fn lock_state(&self) -> MutexGuard<'_, EngagementState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A like between its optimistic flip and the server's answer.
///
/// Resolving clears the intent; dropping it unresolved (the caller's
/// future was cancelled) clears the intent and rolls the flip back.
struct PendingLike<'a> {
    inner: &'a EngagementInner,
    id: IdeaId,
    prior: LikeSnapshot,
    generation: u64,
    done: bool,
}

impl PendingLike<'_> {
    fn resolve(mut self, result: Result<LikeStatus, ApiError>) -> Result<LikeOutcome, EngagementError> {
        self.done = true;
        let mut state = self.inner.lock_state();
        state.clear_like(self.id);

        match result {
            Ok(status) => {
                let settled = self.prior.settled(status);
                match state.tracked_at(self.id, self.generation) {
                    Some(tracked) => {
                        let guess = LikeSnapshot::of(&tracked.idea);
                        if guess != settled {
                            debug!(idea = self.id, ?guess, ?settled, "Server disagreed with optimistic like");
                        }
                        settled.apply_to(&mut tracked.idea);
                        Ok(LikeOutcome::Committed(settled))
                    }
                    None => Ok(LikeOutcome::Discarded(settled)),
                }
            }
            Err(e) => {
                if let Some(tracked) = state.tracked_at(self.id, self.generation) {
                    self.prior.apply_to(&mut tracked.idea);
                }
                warn!(
                    idea = self.id,
                    kind = %e.kind,
                    retryable = e.is_retryable(),
                    "Like failed, rolled back: {}",
                    e.message
                );
                Err(EngagementError::Failed(e))
            }
        }
    }
}

impl Drop for PendingLike<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut state = self.inner.lock_state();
        state.clear_like(self.id);
        if let Some(tracked) = state.tracked_at(self.id, self.generation) {
            self.prior.apply_to(&mut tracked.idea);
        }
    }
}

struct PendingComment<'a> {
    inner: &'a EngagementInner,
    id: IdeaId,
    generation: u64,
    done: bool,
}

impl PendingComment<'_> {
    fn resolve(mut self, result: Result<Comment, ApiError>) -> Result<CommentOutcome, EngagementError> {
        self.done = true;
        let mut state = self.inner.lock_state();
        state.clear_comment(self.id);

        match result {
            Ok(comment) => match state.tracked_at(self.id, self.generation) {
                Some(tracked) => {
                    tracked.idea.comments.insert(0, comment.clone());
                    tracked.draft.clear();
                    Ok(CommentOutcome::Committed(comment))
                }
                None => Ok(CommentOutcome::Discarded(comment)),
            },
            Err(e) => {
                warn!(
                    idea = self.id,
                    kind = %e.kind,
                    retryable = e.is_retryable(),
                    "Comment failed, draft kept: {}",
                    e.message
                );
                Err(EngagementError::Failed(e))
            }
        }
    }
}

impl Drop for PendingComment<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.inner.lock_state().clear_comment(self.id);
        }
    }
}
