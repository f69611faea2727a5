use chrono::Utc;

pub use uuid::Uuid;
pub type Time = chrono::DateTime<Utc>;

mod comment;
pub use comment::{Comment, CommentId, ContentId, ContentType, NewComment, Reaction};

mod error;
pub use error::Error;

mod notification;
pub use notification::{Notification, NotificationKind};

mod page;
pub use page::{Cursor, Page};

mod service;
pub use service::{CommentService, DeleteComment, EditComment, FetchComments, React};

mod user;
pub use user::{AuthToken, Role, UserId};

// Strings going through the wire are stored as-is by the comment service, which
// refuses null bytes.
pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}

pub fn validate_body(s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.trim().is_empty() {
        return Err(Error::EmptyBody);
    }
    Ok(())
}
