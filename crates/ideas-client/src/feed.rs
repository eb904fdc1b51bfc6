//! The home feed, the idea detail view and idea submission.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{debug, info};

use ideas_types::api::CreateIdeaRequest;
use ideas_types::{Idea, IdeaId};

use crate::engagement::EngagementController;
use crate::error::{ApiError, ApiResult};
use crate::gateway::IdeasApi;
use crate::session::SessionStore;

/// How many ideas the "top ideas" strip shows; the rest of the all-ideas
/// list is shown below it.
pub const TOP_IDEAS_SHOWN: usize = 5;
pub const MIN_TITLE_CHARS: usize = 10;
pub const MAX_TITLE_CHARS: usize = 200;
pub const MIN_DESCRIPTION_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdeaOrder {
    /// Most liked first, newest first among equals.
    Popular,
    Newest,
}

pub fn sort_ideas(ideas: &mut [Idea], order: IdeaOrder) {
    match order {
        IdeaOrder::Popular => ideas.sort_by_key(|i| (Reverse(i.likes_count), Reverse(i.created_at))),
        IdeaOrder::Newest => ideas.sort_by_key(|i| Reverse(i.created_at)),
    }
}

/// Both halves of the home page. Each loads on its own and may fail on its own.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub top: ApiResult<Vec<Idea>>,
    pub all: ApiResult<Vec<Idea>>,
}

impl FeedSnapshot {
    /// The all-ideas list minus the entries the top strip already covers.
    pub fn more_ideas(&self) -> &[Idea] {
        match &self.all {
            Ok(ideas) => ideas.get(TOP_IDEAS_SHOWN..).unwrap_or(&[]),
            Err(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdeaDraft {
    pub title: String,
    pub description: String,
}

impl IdeaDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Trimmed fields, or the first local check that fails.
    pub fn validate(&self) -> ApiResult<CreateIdeaRequest> {
        let title = self.title.trim();
        let description = self.description.trim();

        if title.is_empty() || description.is_empty() {
            return Err(ApiError::validation("Please fill in all fields"));
        }
        let title_chars = title.chars().count();
        if title_chars < MIN_TITLE_CHARS {
            return Err(ApiError::validation("Title must be at least 10 characters long"));
        }
        if title_chars > MAX_TITLE_CHARS {
            return Err(ApiError::validation("Title must be at most 200 characters long"));
        }
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            return Err(ApiError::validation("Description must be at least 50 characters long"));
        }

        Ok(CreateIdeaRequest {
            title: title.to_string(),
            description: description.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct Feed {
    store: SessionStore,
    api: Arc<dyn IdeasApi>,
    engagement: EngagementController,
}

impl Feed {
    pub fn new(store: SessionStore, api: Arc<dyn IdeasApi>, engagement: EngagementController) -> Self {
        Self { store, api, engagement }
    }

    /// Fetch top ideas and all ideas concurrently.
    pub async fn load(&self) -> FeedSnapshot {
        let (top, all) = tokio::join!(self.api.top_ideas(), self.api.list_ideas());
        debug!(
            top = top.as_ref().map(Vec::len).ok(),
            all = all.as_ref().map(Vec::len).ok(),
            "Feed loaded"
        );
        FeedSnapshot { top, all }
    }

    /// Fetch one idea with its comments and start tracking it for likes and
    /// comments. Call [`EngagementController::untrack`] when the view closes.
    pub async fn open_idea(&self, id: IdeaId) -> ApiResult<Idea> {
        let idea = self.api.get_idea(id).await?;
        self.engagement.track(idea.clone());
        Ok(idea)
    }

    pub async fn submit_idea(&self, draft: &IdeaDraft) -> ApiResult<IdeaId> {
        if !self.store.is_authenticated() {
            return Err(ApiError::unauthenticated("You need to be logged in to submit ideas"));
        }
        let req = draft.validate()?;

        let created = self.api.create_idea(&req).await?;
        info!(idea = created.id, title = %created.title, "Idea submitted");
        Ok(created.id)
    }
}
