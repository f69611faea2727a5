use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use murmur_api::{
    AuthToken, Comment, CommentId, ContentId, Cursor, Error, NewComment, Page, Reaction, Role,
    Time, UserId, Uuid,
};
use parking_lot::Mutex;

mod http;
pub use http::{router, HttpError, MaybeAuth};

mod service;
pub use service::MockService;

pub type SharedServer = Arc<Mutex<MockServer>>;

/// In-memory comment service, enforcing the same rules as the real one
pub struct MockServer {
    max_depth: usize,
    users: HashMap<AuthToken, (UserId, Role)>,
    comments: HashMap<CommentId, Comment>,
    next_id: u64,
    clock: Option<Time>,
}

fn not_found(id: &CommentId) -> Error {
    Error::NotFound(format!("comment {id}"))
}

impl MockServer {
    pub fn new(max_depth: usize) -> MockServer {
        MockServer {
            max_depth,
            users: HashMap::new(),
            comments: HashMap::new(),
            next_id: 1,
            clock: None,
        }
    }

    pub fn shared(max_depth: usize) -> SharedServer {
        Arc::new(Mutex::new(MockServer::new(max_depth)))
    }

    pub fn add_user(&mut self, id: UserId, role: Role) -> AuthToken {
        let token = AuthToken(Uuid::new_v4());
        self.users.insert(token, (id, role));
        token
    }

    /// Inserts comments as-is, bypassing every check
    pub fn seed(&mut self, comments: impl IntoIterator<Item = Comment>) {
        for mut c in comments {
            c.depth = 0;
            c.pending = false;
            self.comments.insert(c.id.clone(), c);
        }
    }

    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.get(id)
    }

    pub fn num_comments(&self) -> usize {
        self.comments.len()
    }

    // Strictly increasing, so that comments submitted in a row keep their order
    fn now(&mut self) -> Time {
        let now = match self.clock {
            None => Utc::now(),
            Some(last) => Utc::now().max(last + chrono::Duration::milliseconds(1)),
        };
        self.clock = Some(now);
        now
    }

    fn resolve(&self, token: Option<AuthToken>) -> Result<(UserId, Role), Error> {
        match token {
            None => Ok((UserId::new(""), Role::Anonymous)),
            Some(token) => self
                .users
                .get(&token)
                .cloned()
                .ok_or(Error::PermissionDenied),
        }
    }

    fn resolve_authenticated(&self, token: Option<AuthToken>) -> Result<(UserId, Role), Error> {
        let (user, role) = self.resolve(token)?;
        match role.is_authenticated() {
            true => Ok((user, role)),
            false => Err(Error::PermissionDenied),
        }
    }

    fn depth(&self, id: &CommentId) -> usize {
        let mut depth = 0;
        let mut cur = self.comments.get(id).and_then(|c| c.parent_id.as_ref());
        while let Some(p) = cur.and_then(|p| self.comments.get(p)) {
            depth += 1;
            if depth > self.comments.len() {
                // parent cycle
                break;
            }
            cur = p.parent_id.as_ref();
        }
        depth
    }

    pub fn fetch_page(
        &self,
        token: Option<AuthToken>,
        content: &ContentId,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<Page, Error> {
        let (_, role) = self.resolve(token)?;
        let offset = match cursor {
            None => 0,
            Some(c) if c.belongs_to(content) && c.token == format!("k{}", c.seq) => c.seq as usize,
            Some(_) => return Err(Error::InvalidCursor),
        };
        let mut comments = self
            .comments
            .values()
            .filter(|c| c.content_id == *content)
            .filter(|c| role == Role::Guide || !c.moderator_only)
            .collect::<Vec<_>>();
        comments.sort_unstable_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let end = comments.len().min(offset + page_size.max(1));
        let page = comments
            .get(offset..end)
            .unwrap_or(&[])
            .iter()
            .map(|c| {
                let mut c = (*c).clone();
                c.depth = self.depth(&c.id);
                c
            })
            .collect::<Vec<_>>();
        let has_more = end < comments.len();
        Ok(Page {
            comments: page,
            next_cursor: has_more.then(|| Cursor {
                content_id: content.clone(),
                token: format!("k{end}"),
                seq: end as u64,
            }),
            has_more,
        })
    }

    pub fn submit(&mut self, token: Option<AuthToken>, c: NewComment) -> Result<Comment, Error> {
        let (author, role) = self.resolve_authenticated(token)?;
        c.validate()?;
        if c.moderator_only && role != Role::Guide {
            return Err(Error::PermissionDenied);
        }
        let mut depth = 0;
        if let Some(parent) = &c.parent_id {
            match self.comments.get(parent) {
                Some(p) if p.content_id == c.content_id => (),
                _ => return Err(not_found(parent)),
            }
            depth = self.depth(parent) + 1;
            if depth > self.max_depth {
                return Err(Error::DepthExceeded {
                    max: self.max_depth,
                });
            }
        }

        let id = CommentId::new(format!("p{}", self.next_id));
        self.next_id += 1;
        let comment = Comment {
            id: id.clone(),
            content_id: c.content_id,
            content_type: c.content_type,
            author_id: author,
            author_role: role,
            body: c.body,
            parent_id: c.parent_id,
            created_at: self.now(),
            edited_at: None,
            depth: 0,
            deleted: false,
            pending: false,
            moderator_only: c.moderator_only,
            reactions: Default::default(),
        };
        self.comments.insert(id, comment.clone());
        Ok(Comment { depth, ..comment })
    }

    pub fn edit(
        &mut self,
        token: Option<AuthToken>,
        id: &CommentId,
        body: String,
    ) -> Result<Comment, Error> {
        let (user, _) = self.resolve_authenticated(token)?;
        murmur_api::validate_body(&body)?;
        let now = self.now();
        let c = self.comments.get_mut(id).ok_or_else(|| not_found(id))?;
        if c.author_id != user || c.deleted {
            return Err(Error::PermissionDenied);
        }
        c.body = body;
        c.edited_at = Some(now);
        let res = c.clone();
        Ok(Comment {
            depth: self.depth(id),
            ..res
        })
    }

    pub fn delete(&mut self, token: Option<AuthToken>, id: &CommentId) -> Result<Comment, Error> {
        let (user, role) = self.resolve_authenticated(token)?;
        let now = self.now();
        let c = self.comments.get_mut(id).ok_or_else(|| not_found(id))?;
        if c.author_id != user && role != Role::Guide {
            return Err(Error::PermissionDenied);
        }
        if !c.deleted {
            c.deleted = true;
            c.body.clear();
            c.edited_at = Some(now);
        }
        let res = c.clone();
        Ok(Comment {
            depth: self.depth(id),
            ..res
        })
    }

    pub fn react(
        &mut self,
        token: Option<AuthToken>,
        id: &CommentId,
        reaction: Reaction,
    ) -> Result<Comment, Error> {
        self.resolve_authenticated(token)?;
        let c = self
            .comments
            .get_mut(id)
            .filter(|c| !c.deleted)
            .ok_or_else(|| not_found(id))?;
        *c.reactions.entry(reaction).or_insert(0) += 1;
        let res = c.clone();
        Ok(Comment {
            depth: self.depth(id),
            ..res
        })
    }
}
