//! Client core for the ideas board: session handling, the HTTP gateway, and
//! the optimistic like/comment controller that views drive.

pub mod auth;
pub mod config;
pub mod engagement;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod session;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use ideas_store::{Database, LocalStorage};

pub use auth::{AuthState, SessionController};
pub use config::ClientConfig;
pub use engagement::{EngagementController, LikeOutcome, LikeSnapshot};
pub use error::{ApiError, ApiResult, EngagementError, ErrorKind};
pub use feed::{Feed, FeedSnapshot, IdeaDraft, IdeaOrder};
pub use gateway::{HttpGateway, IdeasApi};
pub use session::{Session, SessionStore};

/// Everything a front end needs, wired to one shared session.
#[derive(Clone)]
pub struct IdeasClient {
    pub store: SessionStore,
    pub session: SessionController,
    pub engagement: EngagementController,
    pub feed: Feed,
}

impl IdeasClient {
    /// Open local storage at `config.storage_path`, restore any saved
    /// session, and talk HTTP to `config.api_url`.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let storage: Arc<dyn LocalStorage> = Arc::new(Database::open(&config.storage_path)?);
        let store = SessionStore::open(storage);
        let api = Arc::new(HttpGateway::new(config, store.clone())?);

        info!(api_url = %config.api_url, signed_in = store.is_authenticated(), "Client ready");
        Ok(Self::assemble(store, api))
    }

    /// Wire controllers around an existing store and gateway.
    pub fn assemble(store: SessionStore, api: Arc<dyn IdeasApi>) -> Self {
        let session = SessionController::new(store.clone(), api.clone());
        let engagement = EngagementController::new(store.clone(), api.clone());
        let feed = Feed::new(store.clone(), api, engagement.clone());

        Self {
            store,
            session,
            engagement,
            feed,
        }
    }
}
