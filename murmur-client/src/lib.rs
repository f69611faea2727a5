mod config;
pub use config::{Config, Order};

mod coordinator;
pub use coordinator::{OptimisticCoordinator, Submission, SubmissionState};

mod error;
pub use error::Error;

mod fetcher;
pub use fetcher::PaginationFetcher;

mod http;
pub use http::HttpService;

mod notify;
pub use notify::NotificationDispatcher;

mod session;
pub use session::Session;

mod store;
pub use store::{CommentStats, CommentStore, Origin, StoreEvent, StoreEventKind};

mod visibility;
pub use visibility::{
    visible_thread, Policy, RoleExt, Viewer, VisibleComment, REMOVED_PLACEHOLDER,
};

#[cfg(test)]
mod testutil;

pub mod api {
    pub use murmur_api::*;
}

pub mod prelude {
    pub use crate::RoleExt;
}
