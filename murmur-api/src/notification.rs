use crate::{CommentId, ContentId, Time};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    NewComment,
    NewReply,
    Reaction,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub content_id: ContentId,
    pub comment_id: CommentId,
    pub timestamp: Time,
    pub seen: bool,
}
