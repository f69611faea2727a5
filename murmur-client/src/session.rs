use std::sync::Arc;

use crate::{
    api::{CommentService, ContentId, Page},
    visible_thread, CommentStats, CommentStore, Config, Error, NotificationDispatcher,
    OptimisticCoordinator, PaginationFetcher, Viewer, VisibleComment,
};

/// Everything one signed-in (or anonymous) user needs, constructed once and
/// shared with whoever renders comments
pub struct Session<S: ?Sized> {
    pub config: Config,
    pub viewer: Viewer,
    pub store: Arc<CommentStore>,
    pub fetcher: Arc<PaginationFetcher<S>>,
    pub coordinator: Arc<OptimisticCoordinator<S>>,
    pub notifications: Arc<NotificationDispatcher>,
}

impl<S: CommentService + ?Sized + 'static> Session<S> {
    pub fn new(service: Arc<S>, viewer: Viewer, config: Config) -> Session<S> {
        let store = Arc::new(CommentStore::new(config.order));
        Session {
            fetcher: Arc::new(PaginationFetcher::new(
                service.clone(),
                store.clone(),
                config.clone(),
            )),
            coordinator: Arc::new(OptimisticCoordinator::new(
                service,
                store.clone(),
                viewer.clone(),
                &config,
            )),
            notifications: Arc::new(NotificationDispatcher::new(
                viewer.id.clone(),
                config.notification_retention(),
            )),
            store,
            viewer,
            config,
        }
    }

    /// Feeds store changes to the notification dispatcher, until the store
    /// is dropped
    pub fn start_notifications(&self) -> tokio::task::JoinHandle<()> {
        let events = self.store.subscribe();
        let dispatcher = self.notifications.clone();
        tokio::spawn(async move { dispatcher.run(events).await })
    }

    pub fn spawn_auto_refresh(&self, content: ContentId) -> tokio::task::JoinHandle<()> {
        let fetcher = self.fetcher.clone();
        tokio::spawn(async move { fetcher.auto_refresh(&content).await })
    }

    /// Makes `content` the displayed one and loads its first page
    pub async fn open(&self, content: &ContentId) -> Result<Page, Error> {
        self.fetcher.set_active(content.clone());
        self.fetcher.fetch_next(content).await
    }

    pub fn visible_thread(&self, content: &ContentId) -> Vec<VisibleComment> {
        visible_thread(&self.store, content, self.viewer.role, self.config.max_depth)
    }

    pub fn stats(&self, content: &ContentId) -> CommentStats {
        self.store.stats(content)
    }
}
