use crate::{
    api::{Comment, ContentId, Role, UserId},
    CommentStore,
};

pub const REMOVED_PLACEHOLDER: &str = "comment removed";

/// The user looking at comments
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Viewer {
    pub id: UserId,
    pub role: Role,
}

impl Viewer {
    pub fn new(id: UserId, role: Role) -> Viewer {
        Viewer { id, role }
    }

    pub fn anonymous() -> Viewer {
        Viewer {
            id: UserId::new(""),
            role: Role::Anonymous,
        }
    }

    pub fn can_reply(&self) -> bool {
        self.role.policy().can_reply
    }

    pub fn can_edit(&self, c: &Comment) -> bool {
        self.role.is_authenticated() && c.author_id == self.id && !c.deleted && !c.pending
    }

    pub fn can_delete(&self, c: &Comment) -> bool {
        self.role.is_authenticated()
            && !c.deleted
            && !c.pending
            && (c.author_id == self.id || self.role.policy().can_moderate)
    }

    pub fn can_react(&self, c: &Comment) -> bool {
        self.role.is_authenticated() && !c.deleted && !c.pending
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Policy {
    /// Whether guide annotations (and their replies) are shown
    pub show_moderator_only: bool,

    /// Whether replies deeper than the maximum depth are collapsed
    pub depth_limited: bool,

    pub can_moderate: bool,
    pub can_reply: bool,
}

pub trait RoleExt {
    fn policy(&self) -> Policy;
}

impl RoleExt for Role {
    fn policy(&self) -> Policy {
        match self {
            Role::Scholar => Policy {
                show_moderator_only: false,
                depth_limited: false,
                can_moderate: false,
                can_reply: true,
            },
            Role::Guide => Policy {
                show_moderator_only: true,
                depth_limited: false,
                can_moderate: true,
                can_reply: true,
            },
            Role::Anonymous => Policy {
                show_moderator_only: false,
                depth_limited: true,
                can_moderate: false,
                can_reply: false,
            },
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VisibleComment {
    pub comment: Comment,

    /// Tombstone rendered in place of a deleted comment
    pub placeholder: bool,

    /// Number of replies collapsed under this comment
    pub hidden_replies: usize,
}

/// Derives what `role` gets to see of a content's comments, in display order
pub fn visible_thread(
    store: &CommentStore,
    content: &ContentId,
    role: Role,
    max_depth: usize,
) -> Vec<VisibleComment> {
    let policy = role.policy();
    let mut res: Vec<VisibleComment> = Vec::new();
    // Depth of a hidden comment whose whole subtree is being skipped
    let mut skipping_below: Option<usize> = None;
    // Index in res of the latest comment shown at the depth limit
    let mut collapse_into: Option<usize> = None;

    for mut c in store.get(content) {
        if let Some(d) = skipping_below {
            if c.depth > d {
                continue;
            }
            skipping_below = None;
        }
        if c.moderator_only && !policy.show_moderator_only {
            skipping_below = Some(c.depth);
            continue;
        }
        if policy.depth_limited && c.depth > max_depth {
            match collapse_into {
                Some(i) => res[i].hidden_replies += 1,
                None => tracing::warn!(comment = %c.id, "reply beyond depth limit without a visible ancestor"),
            }
            continue;
        }

        let placeholder = c.deleted;
        if placeholder {
            c.body = String::from(REMOVED_PLACEHOLDER);
        }
        if c.depth == max_depth {
            collapse_into = Some(res.len());
        }
        res.push(VisibleComment {
            comment: c,
            placeholder,
            hidden_replies: 0,
        });
    }
    res
}
