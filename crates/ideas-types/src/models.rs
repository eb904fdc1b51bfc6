use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type IdeaId = u64;
pub type CommentId = u64;

/// Minimal identity attached to a session and embedded in ideas/comments.
///
/// The server also sends email and names; they are optional here because
/// nothing in the client depends on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl UserSummary {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: None,
            first_name: None,
            last_name: None,
        }
    }
}

/// An idea as served by `/api/ideas/{id}/`.
///
/// `likes_count` and `is_liked` are the only fields the client mutates
/// locally; everything else is a read-only cache of the server record.
/// `is_liked` is relative to the session the record was fetched with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: IdeaId,
    pub title: String,
    pub description: String,
    pub pitcher: UserSummary,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub is_liked: bool,
    /// Most recent first.
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Characters shown on an idea card before the description is cut.
pub const PREVIEW_CHARS: usize = 150;

impl Idea {
    /// Description cut to `max_chars` characters, with `...` appended when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        if self.description.chars().count() <= max_chars {
            return self.description.clone();
        }
        let mut cut: String = self.description.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub commenter: UserSummary,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDEA_JSON: &str = r#"{
        "id": 7,
        "title": "Solar powered kettles",
        "description": "Kettles that boil water with nothing but sunlight.",
        "pitcher": {"id": 3, "username": "ravi", "email": "", "first_name": "Ravi", "last_name": "K"},
        "created_at": "2024-03-01T10:15:30.123456Z",
        "updated_at": "2024-03-01T10:15:30.123456Z",
        "likes_count": 4,
        "is_liked": true,
        "comments": [
            {
                "id": 11,
                "content": "Love it",
                "commenter": {"id": 5, "username": "mira"},
                "created_at": "2024-03-02T08:00:00Z"
            }
        ]
    }"#;

    #[test]
    fn parses_server_idea() {
        let idea: Idea = serde_json::from_str(IDEA_JSON).unwrap();
        assert_eq!(idea.id, 7);
        assert_eq!(idea.pitcher.username, "ravi");
        assert_eq!(idea.pitcher.first_name.as_deref(), Some("Ravi"));
        assert_eq!(idea.likes_count, 4);
        assert!(idea.is_liked);
        assert_eq!(idea.comments.len(), 1);
        assert_eq!(idea.comments[0].commenter.id, 5);
    }

    #[test]
    fn missing_engagement_fields_default() {
        let json = r#"{
            "id": 1,
            "title": "Shared bikes",
            "description": "d",
            "pitcher": {"id": 1, "username": "a"},
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let idea: Idea = serde_json::from_str(json).unwrap();
        assert_eq!(idea.likes_count, 0);
        assert!(!idea.is_liked);
        assert!(idea.comments.is_empty());
    }

    #[test]
    fn preview_truncates_long_descriptions() {
        let mut idea: Idea = serde_json::from_str(IDEA_JSON).unwrap();
        assert_eq!(idea.preview(PREVIEW_CHARS), idea.description);

        idea.description = "é".repeat(200);
        let preview = idea.preview(PREVIEW_CHARS);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }
}
