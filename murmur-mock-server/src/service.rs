use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use murmur_api::{
    AuthToken, Comment, CommentId, CommentService, ContentId, Cursor, Error, NewComment, Page,
    Reaction,
};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::SharedServer;

struct Control {
    calls: AtomicUsize,
    waiting: AtomicUsize,
    pause: watch::Sender<bool>,
    paused: watch::Receiver<bool>,
    failures: Mutex<VecDeque<Error>>,
}

struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Waiting<'a> {
        counter.fetch_add(1, Ordering::SeqCst);
        Waiting(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `CommentService` calling a shared `MockServer` directly, as one user.
///
/// Clones share their call counter, pause switch and injected failures.
#[derive(Clone)]
pub struct MockService {
    server: SharedServer,
    token: Option<AuthToken>,
    control: Arc<Control>,
}

impl MockService {
    pub fn new(server: SharedServer, token: Option<AuthToken>) -> MockService {
        let (pause, paused) = watch::channel(false);
        MockService {
            server,
            token,
            control: Arc::new(Control {
                calls: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                pause,
                paused,
                failures: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn server(&self) -> &SharedServer {
        &self.server
    }

    /// Number of requests received so far, including failed ones
    pub fn calls(&self) -> usize {
        self.control.calls.load(Ordering::SeqCst)
    }

    /// Number of requests currently held by `pause`
    pub fn waiting(&self) -> usize {
        self.control.waiting.load(Ordering::SeqCst)
    }

    /// Holds every request until `resume` is called
    pub fn pause(&self) {
        // the control keeps a receiver alive, so sending cannot fail
        let _ = self.control.pause.send(true);
    }

    pub fn resume(&self) {
        let _ = self.control.pause.send(false);
    }

    /// Makes the next `n` requests fail with `err`
    pub fn fail_next(&self, n: usize, err: Error) {
        self.control
            .failures
            .lock()
            .extend(std::iter::repeat(err).take(n));
    }

    async fn gate(&self) -> Result<(), Error> {
        self.control.calls.fetch_add(1, Ordering::SeqCst);
        let mut paused = self.control.paused.clone();
        let is_paused = *paused.borrow_and_update();
        if is_paused {
            let _waiting = Waiting::enter(&self.control.waiting);
            loop {
                let is_paused = *paused.borrow_and_update();
                if !is_paused || paused.changed().await.is_err() {
                    break;
                }
            }
        }
        let failure = self.control.failures.lock().pop_front();
        match failure {
            Some(err) => {
                tracing::debug!(%err, "injecting failure");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CommentService for MockService {
    async fn fetch_page(
        &self,
        content: &ContentId,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<Page, Error> {
        self.gate().await?;
        self.server
            .lock()
            .fetch_page(self.token, content, cursor, page_size)
    }

    async fn submit_comment(&self, comment: NewComment) -> Result<Comment, Error> {
        self.gate().await?;
        self.server.lock().submit(self.token, comment)
    }

    async fn edit_comment(&self, id: &CommentId, body: String) -> Result<Comment, Error> {
        self.gate().await?;
        self.server.lock().edit(self.token, id, body)
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<Comment, Error> {
        self.gate().await?;
        self.server.lock().delete(self.token, id)
    }

    async fn react(&self, id: &CommentId, reaction: Reaction) -> Result<Comment, Error> {
        self.gate().await?;
        self.server.lock().react(self.token, id, reaction)
    }
}
