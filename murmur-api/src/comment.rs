use std::{collections::BTreeMap, fmt};

use uuid::Uuid;

use crate::{Error, Role, Time, UserId};

const TEMPORARY_PREFIX: &str = "local-";

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct CommentId(pub String);

impl CommentId {
    pub fn new(id: impl Into<String>) -> CommentId {
        CommentId(id.into())
    }

    /// Id for a comment that has not been acknowledged by the service yet
    pub fn temporary() -> CommentId {
        CommentId(format!("{TEMPORARY_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_PREFIX)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the article or session a comment thread hangs off
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> ContentId {
        ContentId(id.into())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    IdeasLab,
    GuideSession,
    ScholarSession,
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Like,
    Love,
    Insightful,
    Question,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub author_id: UserId,
    pub author_role: Role,
    pub body: String,
    pub parent_id: Option<CommentId>,
    pub created_at: Time,
    pub edited_at: Option<Time>,

    /// Nesting level, 0 for top-level comments. Recomputed by stores from the
    /// parent chain, so the value on the wire is only a hint.
    #[serde(default)]
    pub depth: usize,

    /// Tombstone marker: deleted comments stay around to keep the thread shape
    #[serde(default)]
    pub deleted: bool,

    /// Set on local optimistic entries until the service answers
    #[serde(default)]
    pub pending: bool,

    /// Guide annotations, hidden from everyone but guides
    #[serde(default)]
    pub moderator_only: bool,

    #[serde(default)]
    pub reactions: BTreeMap<Reaction, u32>,
}

impl Comment {
    /// Timestamp used for last-writer-wins reconciliation
    pub fn version(&self) -> Time {
        self.edited_at.unwrap_or(self.created_at)
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn reaction_count(&self) -> u32 {
        self.reactions.values().sum()
    }
}

/// Request body for a comment creation
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub parent_id: Option<CommentId>,
    pub body: String,
    #[serde(default)]
    pub moderator_only: bool,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.content_id.0)?;
        if let Some(p) = &self.parent_id {
            crate::validate_string(&p.0)?;
        }
        crate::validate_body(&self.body)
    }
}
