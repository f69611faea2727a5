use std::collections::BTreeMap;

use chrono::TimeZone;

use crate::api::{Comment, CommentId, ContentId, ContentType, Role, Time, UserId};

pub fn at(secs: i64) -> Time {
    chrono::Utc
        .timestamp_opt(1_700_000_000 + secs, 0)
        .unwrap()
}

pub fn comment(id: &str, content: &str, parent: Option<&str>, secs: i64) -> Comment {
    Comment {
        id: CommentId::new(id),
        content_id: ContentId::new(content),
        content_type: ContentType::IdeasLab,
        author_id: UserId::new("alice"),
        author_role: Role::Scholar,
        body: format!("body of {id}"),
        parent_id: parent.map(CommentId::new),
        created_at: at(secs),
        edited_at: None,
        depth: 0,
        deleted: false,
        pending: false,
        moderator_only: false,
        reactions: BTreeMap::new(),
    }
}

pub fn ids(comments: &[Comment]) -> Vec<&str> {
    comments.iter().map(|c| &c.id.0 as &str).collect()
}
