use crate::{Comment, ContentId};

/// Opaque pagination position, bound to a single content id
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Cursor {
    pub content_id: ContentId,
    pub token: String,

    /// Strictly increases along a content's pages
    pub seq: u64,
}

impl Cursor {
    pub fn belongs_to(&self, content: &ContentId) -> bool {
        self.content_id == *content
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page {
    pub comments: Vec<Comment>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

impl Page {
    pub fn empty() -> Page {
        Page {
            comments: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}
