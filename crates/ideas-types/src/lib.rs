//! Wire and domain types shared by the ideas client crates.
//!
//! `models` holds the records the server owns (ideas, comments, users);
//! `api` holds request/response envelopes for each remote operation.

pub mod api;
pub mod models;

pub use models::{Comment, CommentId, Idea, IdeaId, UserId, UserSummary};
