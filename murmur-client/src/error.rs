use crate::api::{self, CommentId, ContentId};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Cursor does not belong to content {0}")]
    InvalidCursor(ContentId),

    #[error("Fetching comments of {content} failed (retryable: {retryable})")]
    FetchFailed {
        content: ContentId,
        retryable: bool,
        #[source]
        source: api::Error,
    },

    #[error("Submission rejected or lost, local change rolled back")]
    SubmissionFailed {
        #[source]
        source: api::Error,
    },

    #[error("Reply at depth {depth} would exceed the maximum depth of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Comment {0} already belongs to another content")]
    ContentMismatch(CommentId),

    #[error("Parent {0} belongs to another content")]
    InvalidParent(CommentId),

    #[error("Comment {0} is not confirmed by the service yet")]
    Unconfirmed(CommentId),

    #[error("Invalid comment body")]
    InvalidBody(#[source] api::Error),

    #[error("Response for {0} arrived after being cancelled or superseded")]
    Stale(ContentId),
}

impl Error {
    pub(crate) fn not_found_comment(id: &CommentId) -> Error {
        Error::NotFound(format!("comment {id}"))
    }

    /// Whether triggering the same operation again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::FetchFailed { retryable, .. } => *retryable,
            Error::SubmissionFailed { source } => source.is_transient(),
            _ => false,
        }
    }
}
