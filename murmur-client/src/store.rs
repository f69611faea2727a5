use std::{
    cmp::Reverse,
    collections::{hash_map, HashMap, HashSet},
};

use chrono::Utc;
use futures::channel::mpsc;
use parking_lot::Mutex;

use crate::{
    api::{Comment, CommentId, ContentId, Time},
    Error, Order,
};

/// Who caused a store mutation: the local user through the coordinator, or
/// data coming back from the comment service
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreEventKind {
    Upserted,
    Removed,
    Confirmed { temp_id: CommentId },
    Discarded,
    Restored,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoreEvent {
    pub kind: StoreEventKind,
    pub origin: Origin,
    pub comment: Comment,
    pub previous: Option<Comment>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct CommentStats {
    pub total: usize,
    pub top_level: usize,
    pub replies: usize,
    pub removed: usize,
    pub pending: usize,
}

#[derive(Clone, Debug)]
struct Entry {
    comment: Comment,

    // Position keys, set on first insertion and carried over on confirmation
    sort_time: Time,
    arrival: u64,
}

#[derive(Default)]
struct Inner {
    contents: HashMap<ContentId, HashMap<CommentId, Entry>>,
    index: HashMap<CommentId, ContentId>,
    arrivals: u64,
}

impl Inner {
    fn next_arrival(&mut self) -> u64 {
        self.arrivals += 1;
        self.arrivals
    }

    fn entry(&self, id: &CommentId) -> Option<&Entry> {
        self.contents.get(self.index.get(id)?)?.get(id)
    }

    fn entry_mut(&mut self, id: &CommentId) -> Option<&mut Entry> {
        let content = self.index.get(id)?;
        self.contents.get_mut(content)?.get_mut(id)
    }

    fn check_placement(&self, comment: &Comment) -> Result<(), Error> {
        if let Some(known) = self.index.get(&comment.id) {
            if *known != comment.content_id {
                return Err(Error::ContentMismatch(comment.id.clone()));
            }
        }
        if let Some(parent) = &comment.parent_id {
            if let Some(parent_content) = self.index.get(parent) {
                if *parent_content != comment.content_id {
                    return Err(Error::InvalidParent(parent.clone()));
                }
            }
        }
        Ok(())
    }
}

/// The tombstone replacing `c`. Its version is strictly newer, so that it wins
/// over any copy of the comment the service may still send.
pub(crate) fn tombstone(c: &Comment) -> Comment {
    let mut res = c.clone();
    res.deleted = true;
    res.body.clear();
    res.edited_at = Some(Utc::now().max(c.version() + chrono::Duration::milliseconds(1)));
    res
}

/// In-memory comment forests, one per content id.
///
/// All mutations go through `upsert`, `remove`, `confirm`, `discard` and
/// `restore`, which may be called from concurrently running tasks. Every
/// successful mutation is published to the subscribers, in mutation order.
/// Stored comments always have `depth == 0`; depths are filled in on reads.
pub struct CommentStore {
    order: Order,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl Default for CommentStore {
    fn default() -> CommentStore {
        CommentStore::new(Order::NewestFirst)
    }
}

impl CommentStore {
    pub fn new(order: Order) -> CommentStore {
        CommentStore {
            order,
            inner: Mutex::new(Inner::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    // Called with the inner lock held, so that events go out in mutation order
    fn publish(&self, e: StoreEvent) {
        tracing::trace!(kind = ?e.kind, origin = ?e.origin, comment = %e.comment.id, "store changed");
        self.subscribers
            .lock()
            .retain(|s| s.unbounded_send(e.clone()).is_ok());
    }

    /// Inserts or updates a comment. Returns `Ok(false)` if the store already
    /// had this version or a more recent one.
    pub fn upsert(&self, mut comment: Comment, origin: Origin) -> Result<bool, Error> {
        comment.depth = 0;
        let mut guard = self.inner.lock();
        guard.check_placement(&comment)?;
        let arrival = guard.next_arrival();
        let inner = &mut *guard;
        let entries = inner
            .contents
            .entry(comment.content_id.clone())
            .or_insert_with(HashMap::new);
        let previous = match entries.entry(comment.id.clone()) {
            hash_map::Entry::Occupied(mut o) => {
                let entry = o.get_mut();
                if comment.version() < entry.comment.version() || comment == entry.comment {
                    return Ok(false);
                }
                Some(std::mem::replace(&mut entry.comment, comment.clone()))
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(Entry {
                    sort_time: comment.created_at,
                    arrival,
                    comment: comment.clone(),
                });
                inner
                    .index
                    .insert(comment.id.clone(), comment.content_id.clone());
                None
            }
        };
        self.publish(StoreEvent {
            kind: StoreEventKind::Upserted,
            origin,
            comment,
            previous,
        });
        Ok(true)
    }

    /// Turns a comment into a tombstone, returning its value before removal
    pub fn remove(&self, id: &CommentId, origin: Origin) -> Result<Comment, Error> {
        let mut guard = self.inner.lock();
        let entry = guard
            .entry_mut(id)
            .ok_or_else(|| Error::not_found_comment(id))?;
        let previous = entry.comment.clone();
        if previous.deleted {
            return Ok(previous);
        }
        entry.comment = tombstone(&previous);
        let comment = entry.comment.clone();
        self.publish(StoreEvent {
            kind: StoreEventKind::Removed,
            origin,
            comment,
            previous: Some(previous.clone()),
        });
        Ok(previous)
    }

    /// Replaces a pending entry by its acknowledged version, keeping its place
    pub fn confirm(&self, temp_id: &CommentId, mut confirmed: Comment) -> Result<Comment, Error> {
        confirmed.depth = 0;
        confirmed.pending = false;
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let content = inner
            .index
            .get(temp_id)
            .cloned()
            .ok_or_else(|| Error::not_found_comment(temp_id))?;
        if content != confirmed.content_id {
            return Err(Error::ContentMismatch(confirmed.id));
        }
        inner.check_placement(&confirmed)?;
        let entries = inner
            .contents
            .get_mut(&content)
            .ok_or_else(|| Error::not_found_comment(temp_id))?;
        let temp = entries
            .remove(temp_id)
            .ok_or_else(|| Error::not_found_comment(temp_id))?;
        inner.index.remove(temp_id);
        match entries.entry(confirmed.id.clone()) {
            hash_map::Entry::Occupied(mut o) => {
                // a page fetched meanwhile already brought the permanent comment
                tracing::debug!(%temp_id, id = %confirmed.id, "confirmed comment was already fetched");
                let entry = o.get_mut();
                if confirmed.version() >= entry.comment.version() {
                    entry.comment = confirmed.clone();
                }
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(Entry {
                    comment: confirmed.clone(),
                    sort_time: temp.sort_time,
                    arrival: temp.arrival,
                });
            }
        }
        inner.index.insert(confirmed.id.clone(), content);
        self.publish(StoreEvent {
            kind: StoreEventKind::Confirmed {
                temp_id: temp_id.clone(),
            },
            origin: Origin::Local,
            comment: confirmed.clone(),
            previous: Some(temp.comment),
        });
        Ok(confirmed)
    }

    /// Physically drops a pending entry that the service never acknowledged
    pub fn discard(&self, temp_id: &CommentId) -> Result<Comment, Error> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let content = inner
            .index
            .get(temp_id)
            .cloned()
            .ok_or_else(|| Error::not_found_comment(temp_id))?;
        let entries = inner
            .contents
            .get_mut(&content)
            .ok_or_else(|| Error::not_found_comment(temp_id))?;
        match entries.get(temp_id) {
            Some(e) if e.comment.pending => (),
            Some(_) => {
                tracing::warn!(%temp_id, "refusing to discard a confirmed comment");
                return Err(Error::PermissionDenied);
            }
            None => return Err(Error::not_found_comment(temp_id)),
        }
        let removed = entries
            .remove(temp_id)
            .ok_or_else(|| Error::not_found_comment(temp_id))?
            .comment;
        inner.index.remove(temp_id);
        self.publish(StoreEvent {
            kind: StoreEventKind::Discarded,
            origin: Origin::Local,
            comment: removed.clone(),
            previous: None,
        });
        Ok(removed)
    }

    /// Writes a comment regardless of versions: used for rollbacks and for
    /// values the service just returned for a local action
    pub fn restore(&self, comment: Comment, origin: Origin) -> Result<(), Error> {
        let mut guard = self.inner.lock();
        self.restore_locked(&mut guard, comment, origin)
    }

    /// Like `restore`, but only if the store still holds `expected` for this
    /// id. Returns whether the write happened.
    pub fn restore_if(
        &self,
        expected: &Comment,
        comment: Comment,
        origin: Origin,
    ) -> Result<bool, Error> {
        let mut guard = self.inner.lock();
        let holds_expected = guard.entry(&expected.id).map_or(false, |e| {
            e.comment == Comment {
                depth: 0,
                ..expected.clone()
            }
        });
        if !holds_expected {
            return Ok(false);
        }
        self.restore_locked(&mut guard, comment, origin)?;
        Ok(true)
    }

    fn restore_locked(
        &self,
        inner: &mut Inner,
        mut comment: Comment,
        origin: Origin,
    ) -> Result<(), Error> {
        comment.depth = 0;
        inner.check_placement(&comment)?;
        let arrival = inner.next_arrival();
        let entries = inner
            .contents
            .entry(comment.content_id.clone())
            .or_insert_with(HashMap::new);
        let previous = match entries.entry(comment.id.clone()) {
            hash_map::Entry::Occupied(mut o) => {
                Some(std::mem::replace(&mut o.get_mut().comment, comment.clone()))
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(Entry {
                    sort_time: comment.created_at,
                    arrival,
                    comment: comment.clone(),
                });
                inner
                    .index
                    .insert(comment.id.clone(), comment.content_id.clone());
                None
            }
        };
        self.publish(StoreEvent {
            kind: StoreEventKind::Restored,
            origin,
            comment,
            previous,
        });
        Ok(())
    }

    /// Returns the comments of a content in display order: top-level comments
    /// following the store's order, each followed by its replies, oldest first
    pub fn get(&self, content: &ContentId) -> Vec<Comment> {
        let guard = self.inner.lock();
        match guard.contents.get(content) {
            None => Vec::new(),
            Some(entries) => self.ordered(content, entries),
        }
    }

    /// Returns the ancestors of a comment (root first), the comment itself and
    /// all its descendants
    pub fn get_thread(&self, id: &CommentId) -> Result<Vec<Comment>, Error> {
        let guard = self.inner.lock();
        let content = guard
            .index
            .get(id)
            .ok_or_else(|| Error::not_found_comment(id))?;
        let entries = guard
            .contents
            .get(content)
            .ok_or_else(|| Error::not_found_comment(id))?;
        let ordered = self.ordered(content, entries);
        let pos = ordered
            .iter()
            .position(|c| c.id == *id)
            .ok_or_else(|| Error::not_found_comment(id))?;

        let mut ancestors = HashSet::new();
        let mut cur = entries.get(id).and_then(|e| e.comment.parent_id.as_ref());
        while let Some(p) = cur {
            if !ancestors.insert(p) {
                break;
            }
            cur = entries.get(p).and_then(|e| e.comment.parent_id.as_ref());
        }

        let depth = ordered[pos].depth;
        let end = ordered[pos + 1..]
            .iter()
            .position(|c| c.depth <= depth)
            .map_or(ordered.len(), |i| pos + 1 + i);
        let mut res = ordered[..pos]
            .iter()
            .filter(|c| ancestors.contains(&c.id))
            .cloned()
            .collect::<Vec<_>>();
        res.extend_from_slice(&ordered[pos..end]);
        Ok(res)
    }

    pub fn comment(&self, id: &CommentId) -> Option<Comment> {
        let guard = self.inner.lock();
        let entries = guard.contents.get(guard.index.get(id)?)?;
        let mut res = entries.get(id)?.comment.clone();
        res.depth = depth_of(entries, id);
        Some(res)
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.inner.lock().index.contains_key(id)
    }

    pub fn len(&self, content: &ContentId) -> usize {
        self.inner
            .lock()
            .contents
            .get(content)
            .map_or(0, |entries| entries.len())
    }

    pub fn contents(&self) -> Vec<ContentId> {
        self.inner.lock().contents.keys().cloned().collect()
    }

    pub fn stats(&self, content: &ContentId) -> CommentStats {
        let guard = self.inner.lock();
        let mut stats = CommentStats::default();
        for e in guard.contents.get(content).into_iter().flat_map(|e| e.values()) {
            stats.total += 1;
            match e.comment.is_reply() {
                false => stats.top_level += 1,
                true => stats.replies += 1,
            }
            if e.comment.deleted {
                stats.removed += 1;
            }
            if e.comment.pending {
                stats.pending += 1;
            }
        }
        stats
    }

    fn ordered(&self, content: &ContentId, entries: &HashMap<CommentId, Entry>) -> Vec<Comment> {
        let mut roots = Vec::new();
        let mut children: HashMap<&CommentId, Vec<&Entry>> = HashMap::new();
        for e in entries.values() {
            match &e.comment.parent_id {
                Some(p) if entries.contains_key(p) => children.entry(p).or_default().push(e),
                Some(p) => {
                    tracing::debug!(comment = %e.comment.id, parent = %p, "parent not loaded, showing reply at top level");
                    roots.push(e);
                }
                None => roots.push(e),
            }
        }
        match self.order {
            Order::NewestFirst => roots.sort_unstable_by_key(|e| Reverse((e.sort_time, e.arrival))),
            Order::OldestFirst => roots.sort_unstable_by_key(|e| (e.sort_time, e.arrival)),
        }
        for replies in children.values_mut() {
            replies.sort_unstable_by_key(|e| (e.sort_time, e.arrival));
        }

        let mut res = Vec::with_capacity(entries.len());
        let mut stack = roots.into_iter().rev().map(|e| (e, 0)).collect::<Vec<_>>();
        while let Some((e, depth)) = stack.pop() {
            let mut c = e.comment.clone();
            c.depth = depth;
            res.push(c);
            if let Some(replies) = children.get(&e.comment.id) {
                stack.extend(replies.iter().rev().map(|r| (*r, depth + 1)));
            }
        }
        if res.len() < entries.len() {
            tracing::warn!(
                %content,
                skipped = entries.len() - res.len(),
                "comments caught in a parent cycle were skipped"
            );
        }
        res
    }
}

fn depth_of(entries: &HashMap<CommentId, Entry>, id: &CommentId) -> usize {
    let mut depth = 0;
    let mut cur = entries.get(id).and_then(|e| e.comment.parent_id.as_ref());
    while let Some(p) = cur {
        match entries.get(p) {
            None => break,
            Some(e) => {
                depth += 1;
                if depth > entries.len() {
                    // parent cycle
                    break;
                }
                cur = e.comment.parent_id.as_ref();
            }
        }
    }
    depth
}
