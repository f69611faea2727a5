use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    api::{self, CommentService, ContentId, Cursor, Page},
    CommentStore, Config, Error, Origin,
};

#[derive(Default)]
struct ContentState {
    // Bumped whenever the content stops being active, cancelling in-flight fetches
    generation: u64,
    next_seq: u64,

    // Sequence number of the latest merged response, per requested cursor
    // token. Only kept while an older request may still come back.
    merged: HashMap<Option<String>, u64>,
    in_flight: BTreeSet<u64>,

    // Furthest known position
    cursor: Option<Cursor>,
    has_more: Option<bool>,
}

#[derive(Default)]
struct FetchState {
    active: Option<ContentId>,
    contents: HashMap<ContentId, ContentState>,
}

/// Marks a request as in flight until dropped. Merge records that no request
/// still in flight predates are dropped along with it.
struct InFlight<'a> {
    state: &'a Mutex<FetchState>,
    content: &'a ContentId,
    seq: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(s) = self.state.lock().contents.get_mut(self.content) {
            s.in_flight.remove(&self.seq);
            match s.in_flight.iter().next().copied() {
                None => s.merged.clear(),
                Some(oldest) => s.merged.retain(|_, merged| *merged > oldest),
            }
        }
    }
}

/// Pages comments in from the comment service and merges them into the store
pub struct PaginationFetcher<S: ?Sized> {
    service: Arc<S>,
    store: Arc<CommentStore>,
    config: Config,
    timeout: Duration,
    state: Mutex<FetchState>,
}

impl<S: CommentService + ?Sized> PaginationFetcher<S> {
    pub fn new(service: Arc<S>, store: Arc<CommentStore>, config: Config) -> PaginationFetcher<S> {
        PaginationFetcher {
            service,
            store,
            timeout: config.request_timeout(),
            config,
            state: Mutex::new(FetchState::default()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> PaginationFetcher<S> {
        self.timeout = timeout;
        self
    }

    pub fn active(&self) -> Option<ContentId> {
        self.state.lock().active.clone()
    }

    /// Makes `content` the displayed content. Switching away from a content
    /// forgets its cursor and discards the responses still in flight for it.
    pub fn set_active(&self, content: ContentId) {
        let mut state = self.state.lock();
        if state.active.as_ref() == Some(&content) {
            return;
        }
        if let Some(previous) = state.active.take() {
            tracing::debug!(%previous, next = %content, "switching active content");
            let prev = state.contents.entry(previous).or_default();
            prev.generation += 1;
            prev.merged.clear();
            prev.cursor = None;
            prev.has_more = None;
        }
        state.active = Some(content);
    }

    pub fn cursor(&self, content: &ContentId) -> Option<Cursor> {
        self.state
            .lock()
            .contents
            .get(content)
            .and_then(|s| s.cursor.clone())
    }

    /// `None` until a page of this content has been fetched
    pub fn has_more(&self, content: &ContentId) -> Option<bool> {
        self.state.lock().contents.get(content).and_then(|s| s.has_more)
    }

    /// Fetches one page and merges it into the store before returning it
    pub async fn fetch_page(
        &self,
        content: &ContentId,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<Page, Error> {
        if let Some(c) = cursor {
            if !c.belongs_to(content) {
                return Err(Error::InvalidCursor(content.clone()));
            }
        }
        let page_size = page_size.clamp(1, self.config.max_page_size.max(1));
        let (generation, seq) = {
            let mut state = self.state.lock();
            let s = state.contents.entry(content.clone()).or_default();
            s.next_seq += 1;
            s.in_flight.insert(s.next_seq);
            (s.generation, s.next_seq)
        };
        let _in_flight = InFlight {
            state: &self.state,
            content,
            seq,
        };

        let mut page = self
            .fetch_with_retries(content, cursor, page_size, generation)
            .await?;

        let mut state = self.state.lock();
        let s = state.contents.entry(content.clone()).or_default();
        if s.generation != generation {
            tracing::debug!(%content, seq, "discarding response for a content no longer displayed");
            return Err(Error::Stale(content.clone()));
        }
        let key = cursor.map(|c| c.token.clone());
        if s.merged.get(&key).map_or(false, |merged| *merged > seq) {
            tracing::debug!(%content, seq, "discarding response superseded by a newer one");
            return Err(Error::Stale(content.clone()));
        }
        s.merged.insert(key, seq);

        // Parents first, so that replies find them already in place
        page.comments.sort_by_key(|c| c.created_at);
        for c in page.comments.iter() {
            if c.content_id != *content {
                tracing::warn!(%content, comment = %c.id, other = %c.content_id, "service returned a comment of another content");
                continue;
            }
            if let Err(err) = self.store.upsert(c.clone(), Origin::Remote) {
                tracing::warn!(%content, comment = %c.id, %err, "could not merge fetched comment");
            }
        }

        let requested_seq = cursor.map_or(0, |c| c.seq);
        let tracked_seq = s.cursor.as_ref().map_or(0, |c| c.seq);
        match &page.next_cursor {
            Some(next) if next.belongs_to(content) && next.seq > tracked_seq => {
                s.cursor = Some(next.clone());
                s.has_more = Some(page.has_more);
            }
            _ if requested_seq >= tracked_seq => {
                s.has_more = Some(page.has_more && page.next_cursor.is_some());
            }
            _ => (),
        }
        tracing::debug!(%content, seq, fetched = page.comments.len(), has_more = page.has_more, "merged comment page");
        Ok(page)
    }

    /// Continues from the furthest known position of `content`
    pub async fn fetch_next(&self, content: &ContentId) -> Result<Page, Error> {
        let (cursor, has_more) = {
            let state = self.state.lock();
            match state.contents.get(content) {
                None => (None, None),
                Some(s) => (s.cursor.clone(), s.has_more),
            }
        };
        if has_more == Some(false) {
            return Ok(api::Page::empty());
        }
        self.fetch_page(content, cursor.as_ref(), self.config.page_size)
            .await
    }

    /// Re-fetches the first page, to pick up new comments
    pub async fn refresh(&self, content: &ContentId) -> Result<Page, Error> {
        self.fetch_page(content, None, self.config.page_size).await
    }

    /// Refreshes `content` periodically, for as long as it stays active
    pub async fn auto_refresh(&self, content: &ContentId) {
        let interval = self.config.refresh_interval();
        loop {
            tokio::time::sleep(interval).await;
            if self.active().as_ref() != Some(content) {
                break;
            }
            match self.refresh(content).await {
                Ok(_) => (),
                Err(Error::Stale(_)) => break,
                Err(err) => tracing::warn!(%content, %err, "auto-refresh failed"),
            }
        }
        tracing::debug!(%content, "auto-refresh stopped");
    }

    async fn fetch_with_retries(
        &self,
        content: &ContentId,
        cursor: Option<&Cursor>,
        page_size: usize,
        generation: u64,
    ) -> Result<Page, Error> {
        let mut attempt = 0;
        loop {
            let res = match tokio::time::timeout(
                self.timeout,
                self.service.fetch_page(content, cursor, page_size),
            )
            .await
            {
                Ok(res) => res,
                Err(_) => Err(api::Error::Unavailable(format!(
                    "request timed out after {:?}",
                    self.timeout
                ))),
            };
            let err = match res {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };
            if !err.is_transient() {
                return Err(match err {
                    api::Error::InvalidCursor => Error::InvalidCursor(content.clone()),
                    api::Error::NotFound(what) => Error::NotFound(what),
                    api::Error::PermissionDenied => Error::PermissionDenied,
                    source => Error::FetchFailed {
                        content: content.clone(),
                        retryable: false,
                        source,
                    },
                });
            }
            if attempt >= self.config.retry_limit {
                tracing::error!(%content, attempts = attempt + 1, %err, "giving up fetching comments");
                return Err(Error::FetchFailed {
                    content: content.clone(),
                    retryable: true,
                    source: err,
                });
            }
            let delay = self.config.retry_backoff(attempt);
            tracing::warn!(%content, attempt, ?delay, %err, "transient failure fetching comments, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;

            let cancelled = self
                .state
                .lock()
                .contents
                .get(content)
                .map_or(false, |s| s.generation != generation);
            if cancelled {
                return Err(Error::Stale(content.clone()));
            }
        }
    }
}
