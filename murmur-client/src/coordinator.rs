use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    api::{self, Comment, CommentId, CommentService, NewComment, Reaction},
    store, CommentStore, Config, Error, Origin, RoleExt, Viewer,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmissionState {
    Pending,
    Confirmed(CommentId),
    Failed(String),
}

/// A comment already shown in the store under `temp_id`, not yet sent
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Submission {
    pub temp_id: CommentId,
    pub request: NewComment,
}

/// Applies the viewer's actions to the store right away, then reconciles them
/// with the comment service. Nothing is retried automatically.
pub struct OptimisticCoordinator<S: ?Sized> {
    service: Arc<S>,
    store: Arc<CommentStore>,
    viewer: Viewer,
    max_depth: usize,
    timeout: Duration,
    submissions: Mutex<HashMap<CommentId, SubmissionState>>,
}

impl<S: CommentService + ?Sized> OptimisticCoordinator<S> {
    pub fn new(
        service: Arc<S>,
        store: Arc<CommentStore>,
        viewer: Viewer,
        config: &Config,
    ) -> OptimisticCoordinator<S> {
        OptimisticCoordinator {
            service,
            store,
            viewer,
            max_depth: config.max_depth,
            timeout: config.request_timeout(),
            submissions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> OptimisticCoordinator<S> {
        self.timeout = timeout;
        self
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn state(&self, temp_id: &CommentId) -> Option<SubmissionState> {
        self.submissions.lock().get(temp_id).cloned()
    }

    /// Stops tracking a submission, returning its last state
    pub fn forget(&self, temp_id: &CommentId) -> Option<SubmissionState> {
        self.submissions.lock().remove(temp_id)
    }

    pub fn pending(&self) -> Vec<CommentId> {
        self.submissions
            .lock()
            .iter()
            .filter(|(_, s)| **s == SubmissionState::Pending)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Validates a new comment and inserts it into the store as pending
    pub fn prepare_submit(&self, request: NewComment) -> Result<Submission, Error> {
        if !self.viewer.can_reply()
            || (request.moderator_only && !self.viewer.role.policy().can_moderate)
        {
            return Err(Error::PermissionDenied);
        }
        request.validate().map_err(Error::InvalidBody)?;

        if let Some(parent_id) = &request.parent_id {
            if parent_id.is_temporary() {
                return Err(Error::Unconfirmed(parent_id.clone()));
            }
            let parent = self
                .store
                .comment(parent_id)
                .ok_or_else(|| Error::not_found_comment(parent_id))?;
            if parent.content_id != request.content_id {
                return Err(Error::InvalidParent(parent_id.clone()));
            }
            if parent.pending {
                return Err(Error::Unconfirmed(parent_id.clone()));
            }
            let depth = parent.depth + 1;
            if depth > self.max_depth {
                return Err(Error::DepthExceeded {
                    depth,
                    max: self.max_depth,
                });
            }
        }

        let temp_id = CommentId::temporary();
        self.store.upsert(
            Comment {
                id: temp_id.clone(),
                content_id: request.content_id.clone(),
                content_type: request.content_type,
                author_id: self.viewer.id.clone(),
                author_role: self.viewer.role,
                body: request.body.clone(),
                parent_id: request.parent_id.clone(),
                created_at: Utc::now(),
                edited_at: None,
                depth: 0,
                deleted: false,
                pending: true,
                moderator_only: request.moderator_only,
                reactions: Default::default(),
            },
            Origin::Local,
        )?;
        self.submissions
            .lock()
            .insert(temp_id.clone(), SubmissionState::Pending);
        tracing::debug!(%temp_id, content = %request.content_id, "comment pending");
        Ok(Submission { temp_id, request })
    }

    /// Sends a prepared submission, then confirms or discards its pending entry
    pub async fn finish_submit(&self, submission: Submission) -> Result<Comment, Error> {
        let Submission { temp_id, request } = submission;
        let res = self.call(self.service.submit_comment(request)).await;
        let (state, res) = match res {
            Ok(c) => match self.store.confirm(&temp_id, c) {
                Ok(c) => (SubmissionState::Confirmed(c.id.clone()), Ok(c)),
                Err(err) => {
                    tracing::warn!(%temp_id, %err, "could not confirm submitted comment, rolling back");
                    self.discard(&temp_id);
                    let source = api::Error::Unknown(format!("unusable acknowledgement: {err}"));
                    (
                        SubmissionState::Failed(source.to_string()),
                        Err(Error::SubmissionFailed { source }),
                    )
                }
            },
            Err(source) => {
                tracing::warn!(%temp_id, err = %source, "comment submission failed, rolling back");
                self.discard(&temp_id);
                (
                    SubmissionState::Failed(source.to_string()),
                    Err(Error::SubmissionFailed { source }),
                )
            }
        };
        self.submissions.lock().insert(temp_id, state);
        res
    }

    pub async fn submit(&self, request: NewComment) -> Result<Comment, Error> {
        let submission = self.prepare_submit(request)?;
        self.finish_submit(submission).await
    }

    pub async fn edit(&self, id: &CommentId, body: String) -> Result<Comment, Error> {
        let prior = self.confirmed(id)?;
        if !self.viewer.can_edit(&prior) {
            return Err(Error::PermissionDenied);
        }
        api::validate_body(&body).map_err(Error::InvalidBody)?;

        let mut edited = prior.clone();
        edited.body = body.clone();
        edited.edited_at = Some(Utc::now().max(prior.version() + chrono::Duration::milliseconds(1)));
        self.store.restore(edited.clone(), Origin::Local)?;
        let res = self.call(self.service.edit_comment(id, body)).await;
        self.reconcile(prior, edited, res)
    }

    pub async fn delete(&self, id: &CommentId) -> Result<Comment, Error> {
        let prior = self.confirmed(id)?;
        if !self.viewer.can_delete(&prior) {
            return Err(Error::PermissionDenied);
        }
        let removed = store::tombstone(&prior);
        self.store.restore(removed.clone(), Origin::Local)?;
        let res = self.call(self.service.delete_comment(id)).await;
        self.reconcile(prior, removed, res)
    }

    pub async fn react(&self, id: &CommentId, reaction: Reaction) -> Result<Comment, Error> {
        let prior = self.confirmed(id)?;
        if !self.viewer.can_react(&prior) {
            return Err(Error::PermissionDenied);
        }
        let mut reacted = prior.clone();
        *reacted.reactions.entry(reaction).or_insert(0) += 1;
        self.store.restore(reacted.clone(), Origin::Local)?;
        let res = self.call(self.service.react(id, reaction)).await;
        self.reconcile(prior, reacted, res)
    }

    fn confirmed(&self, id: &CommentId) -> Result<Comment, Error> {
        if id.is_temporary() {
            return Err(Error::Unconfirmed(id.clone()));
        }
        let c = self
            .store
            .comment(id)
            .ok_or_else(|| Error::not_found_comment(id))?;
        match c.pending {
            true => Err(Error::Unconfirmed(id.clone())),
            false => Ok(c),
        }
    }

    fn discard(&self, temp_id: &CommentId) {
        if let Err(err) = self.store.discard(temp_id) {
            tracing::warn!(%temp_id, %err, "pending comment vanished before rollback");
        }
    }

    /// Settles an optimistic write. Another change of the same comment may
    /// have landed while the request was in flight: the store is only
    /// overwritten while it still holds `optimistic`.
    fn reconcile(
        &self,
        prior: Comment,
        optimistic: Comment,
        res: Result<Comment, api::Error>,
    ) -> Result<Comment, Error> {
        match res {
            Ok(c) => {
                if !self.store.restore_if(&optimistic, c.clone(), Origin::Local)? {
                    self.store.upsert(c.clone(), Origin::Local)?;
                }
                Ok(c)
            }
            Err(source) => {
                if self.store.restore_if(&optimistic, prior.clone(), Origin::Local)? {
                    tracing::warn!(comment = %prior.id, err = %source, "rolled back rejected change");
                } else {
                    tracing::warn!(
                        comment = %prior.id,
                        err = %source,
                        "change rejected, keeping the newer value written meanwhile"
                    );
                }
                Err(Error::SubmissionFailed { source })
            }
        }
    }

    async fn call<T>(&self, f: impl Future<Output = Result<T, api::Error>>) -> Result<T, api::Error> {
        match tokio::time::timeout(self.timeout, f).await {
            Ok(res) => res,
            Err(_) => Err(api::Error::Unavailable(format!(
                "request timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
