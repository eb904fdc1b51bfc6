use serde::{Deserialize, Serialize};

use crate::models::{Idea, IdeaId, UserSummary};

// -- Auth --

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub password_confirm: String,
}

/// Returned by both login and registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access: String,
    pub user: UserSummary,
    /// Issued by the server but never used by the client.
    #[serde(default)]
    pub refresh: Option<String>,
}

// -- Ideas --

/// `GET /api/ideas/` answers with a bare array, or with a page object when
/// server-side pagination is switched on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IdeaListResponse {
    Page { results: Vec<Idea> },
    Plain(Vec<Idea>),
}

impl IdeaListResponse {
    pub fn into_ideas(self) -> Vec<Idea> {
        match self {
            Self::Page { results } => results,
            Self::Plain(ideas) => ideas,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateIdeaRequest {
    pub title: String,
    pub description: String,
}

/// The server echoes the whole record; the client only needs the id and
/// the title as stored.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIdea {
    pub id: IdeaId,
    #[serde(default)]
    pub title: String,
}

// -- Likes --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeStatus {
    Liked,
    Unliked,
}

impl LikeStatus {
    pub fn is_liked(self) -> bool {
        matches!(self, Self::Liked)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikeResponse {
    pub status: LikeStatus,
}

// -- Comments --

#[derive(Debug, Clone, Serialize)]
pub struct AddCommentRequest {
    pub content: String,
}
