use std::collections::{HashMap, HashSet};

use chrono::Utc;
use futures::{channel::mpsc, StreamExt};
use parking_lot::Mutex;

use crate::{
    api::{CommentId, ContentId, Notification, NotificationKind, Time, UserId},
    Origin, StoreEvent, StoreEventKind,
};

#[derive(Default)]
struct State {
    notifications: HashMap<(CommentId, NotificationKind), Notification>,

    // Participation of the viewer
    authored: HashSet<CommentId>,
    contents: HashSet<ContentId>,
}

/// Turns store events into notifications for the viewer, independently of the
/// content currently displayed
pub struct NotificationDispatcher {
    viewer: UserId,
    retention: chrono::Duration,
    state: Mutex<State>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Notification>>>,
}

impl NotificationDispatcher {
    pub fn new(viewer: UserId, retention: chrono::Duration) -> NotificationDispatcher {
        NotificationDispatcher {
            viewer,
            retention,
            state: Mutex::new(State::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Marks a content as owned by the viewer: any new comment on it notifies
    pub fn watch_content(&self, content: ContentId) {
        self.state.lock().contents.insert(content);
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Notification> {
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Consumes store events until the store goes away
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<StoreEvent>) {
        while let Some(e) = events.next().await {
            self.handle(&e);
        }
        tracing::debug!(viewer = %self.viewer.0, "store event stream closed, notification dispatcher stopping");
    }

    pub fn handle(&self, e: &StoreEvent) -> Option<Notification> {
        self.handle_at(e, Utc::now())
    }

    pub fn handle_at(&self, e: &StoreEvent, now: Time) -> Option<Notification> {
        let c = &e.comment;
        let mut state = self.state.lock();
        if c.author_id == self.viewer && !c.id.is_temporary() {
            state.authored.insert(c.id.clone());
            state.contents.insert(c.content_id.clone());
        }
        if e.origin == Origin::Local || c.pending || c.deleted {
            return None;
        }

        let kind = match (&e.kind, &e.previous) {
            (StoreEventKind::Upserted | StoreEventKind::Restored, None) => {
                if c.author_id == self.viewer || c.created_at < now - self.retention {
                    return None;
                }
                match &c.parent_id {
                    Some(p) if state.authored.contains(p) => NotificationKind::NewReply,
                    _ if state.contents.contains(&c.content_id) => NotificationKind::NewComment,
                    _ => return None,
                }
            }
            (StoreEventKind::Upserted | StoreEventKind::Restored, Some(prev)) => {
                if c.author_id != self.viewer || c.reaction_count() <= prev.reaction_count() {
                    return None;
                }
                NotificationKind::Reaction
            }
            _ => return None,
        };

        let notification = state
            .notifications
            .entry((c.id.clone(), kind))
            .and_modify(|n| n.timestamp = now)
            .or_insert_with(|| Notification {
                kind,
                content_id: c.content_id.clone(),
                comment_id: c.id.clone(),
                timestamp: now,
                seen: false,
            })
            .clone();
        drop(state);

        tracing::debug!(?kind, comment = %notification.comment_id, "notifying viewer");
        self.subscribers
            .lock()
            .retain(|s| s.unbounded_send(notification.clone()).is_ok());
        Some(notification)
    }

    /// All current notifications, most recent first
    pub fn notifications(&self) -> Vec<Notification> {
        let mut res = self
            .state
            .lock()
            .notifications
            .values()
            .cloned()
            .collect::<Vec<_>>();
        res.sort_unstable_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.comment_id.cmp(&b.comment_id))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        res
    }

    pub fn unseen_count(&self) -> usize {
        self.state
            .lock()
            .notifications
            .values()
            .filter(|n| !n.seen)
            .count()
    }

    /// Returns whether such a notification existed
    pub fn mark_seen(&self, comment: &CommentId, kind: NotificationKind) -> bool {
        match self
            .state
            .lock()
            .notifications
            .get_mut(&(comment.clone(), kind))
        {
            Some(n) => {
                n.seen = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_seen(&self) {
        for n in self.state.lock().notifications.values_mut() {
            n.seen = true;
        }
    }

    pub fn clear(&self) {
        self.state.lock().notifications.clear();
    }

    /// Drops notifications older than the retention window, returning how many
    pub fn gc(&self) -> usize {
        self.gc_at(Utc::now())
    }

    pub fn gc_at(&self, now: Time) -> usize {
        let limit = now - self.retention;
        let mut state = self.state.lock();
        let before = state.notifications.len();
        state.notifications.retain(|_, n| n.timestamp >= limit);
        let dropped = before - state.notifications.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired notifications");
        }
        dropped
    }
}
