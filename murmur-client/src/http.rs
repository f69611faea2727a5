use async_trait::async_trait;

use crate::api::{
    self, AuthToken, Comment, CommentId, CommentService, ContentId, Cursor, NewComment, Page,
    Reaction,
};

/// `CommentService` reached through its JSON over HTTP interface
#[derive(Clone, Debug)]
pub struct HttpService {
    client: reqwest::Client,
    host: String,
    token: Option<AuthToken>,
}

fn transport_error(err: reqwest::Error) -> api::Error {
    api::Error::Unavailable(format!("transport error: {err}"))
}

impl HttpService {
    pub fn new(host: String, token: Option<AuthToken>) -> HttpService {
        HttpService::with_client(reqwest::Client::new(), host, token)
    }

    pub fn with_client(
        client: reqwest::Client,
        host: String,
        token: Option<AuthToken>,
    ) -> HttpService {
        HttpService {
            client,
            host: String::from(host.trim_end_matches('/')),
            token,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, api::Error>
    where
        B: serde::Serialize,
        R: for<'de> serde::Deserialize<'de>,
    {
        let mut req = self
            .client
            .post(format!("{}/api/{}", self.host, endpoint))
            .json(body);
        if let Some(token) = self.token {
            req = req.bearer_auth(token.0);
        }
        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let contents = resp.bytes().await.map_err(transport_error)?;
            return Err(api::Error::parse(&contents).unwrap_or_else(|err| {
                tracing::warn!(endpoint, %status, ?err, "unparseable error response");
                match status.is_server_error() {
                    true => api::Error::Unavailable(format!("service answered {status}")),
                    false => api::Error::Unknown(format!("service answered {status}")),
                }
            }));
        }
        resp.json()
            .await
            .map_err(|err| api::Error::Unknown(format!("parsing response to {endpoint}: {err}")))
    }
}

#[async_trait]
impl CommentService for HttpService {
    async fn fetch_page(
        &self,
        content: &ContentId,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<Page, api::Error> {
        self.post(
            "fetch-comments",
            &api::FetchComments {
                content_id: content.clone(),
                cursor: cursor.cloned(),
                page_size,
            },
        )
        .await
    }

    async fn submit_comment(&self, comment: NewComment) -> Result<Comment, api::Error> {
        self.post("submit-comment", &comment).await
    }

    async fn edit_comment(&self, id: &CommentId, body: String) -> Result<Comment, api::Error> {
        self.post(
            "edit-comment",
            &api::EditComment {
                id: id.clone(),
                body,
            },
        )
        .await
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<Comment, api::Error> {
        self.post("delete-comment", &api::DeleteComment { id: id.clone() })
            .await
    }

    async fn react(&self, id: &CommentId, reaction: Reaction) -> Result<Comment, api::Error> {
        self.post(
            "react",
            &api::React {
                id: id.clone(),
                reaction,
            },
        )
        .await
    }
}
