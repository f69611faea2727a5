use async_trait::async_trait;

use crate::{Comment, CommentId, ContentId, Cursor, Error, NewComment, Page, Reaction};

/// Remote comment service, as seen by an authenticated client.
///
/// Implementations carry the identity of the caller themselves (eg. a bearer
/// token), so none of the operations take a user.
#[async_trait]
pub trait CommentService: Send + Sync {
    async fn fetch_page(
        &self,
        content: &ContentId,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<Page, Error>;

    /// Returns the comment as stored by the service, with its permanent id
    async fn submit_comment(&self, comment: NewComment) -> Result<Comment, Error>;

    async fn edit_comment(&self, id: &CommentId, body: String) -> Result<Comment, Error>;

    /// Returns the resulting tombstone
    async fn delete_comment(&self, id: &CommentId) -> Result<Comment, Error>;

    async fn react(&self, id: &CommentId, reaction: Reaction) -> Result<Comment, Error>;
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FetchComments {
    pub content_id: ContentId,
    pub cursor: Option<Cursor>,
    pub page_size: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EditComment {
    pub id: CommentId,
    pub body: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeleteComment {
    pub id: CommentId,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct React {
    pub id: CommentId,
    pub reaction: Reaction,
}
