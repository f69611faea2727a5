use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request},
    routing::post,
    Json, Router,
};
use murmur_api::{
    AuthToken, Comment, DeleteComment, EditComment, Error, FetchComments, NewComment, Page, React,
    Uuid,
};

use crate::SharedServer;

/// Wire error, rendered with the status code and JSON body clients parse
#[derive(Debug)]
pub struct HttpError(pub Error);

impl From<Error> for HttpError {
    fn from(err: Error) -> HttpError {
        HttpError(err)
    }
}

impl axum::response::IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        tracing::info!("returning error to client: {}", self.0);
        (self.0.status_code(), self.0.contents()).into_response()
    }
}

/// Bearer token of the caller, if any. A malformed authorization header is
/// refused rather than treated as anonymous.
pub struct MaybeAuth(pub Option<AuthToken>);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for MaybeAuth {
    type Rejection = HttpError;

    async fn from_request_parts(
        req: &mut request::Parts,
        _state: &S,
    ) -> Result<MaybeAuth, HttpError> {
        let denied = || HttpError(Error::PermissionDenied);
        let auth = match req.headers.get(header::AUTHORIZATION) {
            None => return Ok(MaybeAuth(None)),
            Some(auth) => auth.to_str().map_err(|_| denied())?,
        };
        let mut auth = auth.split(' ');
        if !auth
            .next()
            .ok_or_else(denied)?
            .eq_ignore_ascii_case("bearer")
        {
            return Err(denied());
        }
        let token = auth.next().ok_or_else(denied)?;
        if auth.next().is_some() {
            return Err(denied());
        }
        let token = Uuid::try_parse(token).map_err(|_| denied())?;
        Ok(MaybeAuth(Some(AuthToken(token))))
    }
}

pub fn router(server: SharedServer) -> Router {
    Router::new()
        .route("/api/fetch-comments", post(fetch_comments))
        .route("/api/submit-comment", post(submit_comment))
        .route("/api/edit-comment", post(edit_comment))
        .route("/api/delete-comment", post(delete_comment))
        .route("/api/react", post(react))
        .with_state(server)
}

async fn fetch_comments(
    MaybeAuth(token): MaybeAuth,
    State(server): State<SharedServer>,
    Json(req): Json<FetchComments>,
) -> Result<Json<Page>, HttpError> {
    Ok(Json(server.lock().fetch_page(
        token,
        &req.content_id,
        req.cursor.as_ref(),
        req.page_size,
    )?))
}

async fn submit_comment(
    MaybeAuth(token): MaybeAuth,
    State(server): State<SharedServer>,
    Json(req): Json<NewComment>,
) -> Result<Json<Comment>, HttpError> {
    Ok(Json(server.lock().submit(token, req)?))
}

async fn edit_comment(
    MaybeAuth(token): MaybeAuth,
    State(server): State<SharedServer>,
    Json(req): Json<EditComment>,
) -> Result<Json<Comment>, HttpError> {
    Ok(Json(server.lock().edit(token, &req.id, req.body)?))
}

async fn delete_comment(
    MaybeAuth(token): MaybeAuth,
    State(server): State<SharedServer>,
    Json(req): Json<DeleteComment>,
) -> Result<Json<Comment>, HttpError> {
    Ok(Json(server.lock().delete(token, &req.id)?))
}

async fn react(
    MaybeAuth(token): MaybeAuth,
    State(server): State<SharedServer>,
    Json(req): Json<React>,
) -> Result<Json<Comment>, HttpError> {
    Ok(Json(server.lock().react(token, &req.id, req.reaction)?))
}
