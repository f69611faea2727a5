use anyhow::anyhow;
use serde_json::json;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cursor does not belong to the requested content")]
    InvalidCursor,

    #[error("Reply would nest deeper than the maximum depth of {max}")]
    DepthExceeded { max: usize },

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Comment body is empty")]
    EmptyBody,

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidCursor => StatusCode::BAD_REQUEST,
            Error::DepthExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::EmptyBody => StatusCode::BAD_REQUEST,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether retrying the very same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Unknown(_) | Error::Unavailable(_))
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NotFound(what) => json!({
                "message": "not found",
                "type": "not-found",
                "what": what,
            }),
            Error::InvalidCursor => json!({
                "message": "cursor does not belong to the requested content",
                "type": "invalid-cursor",
            }),
            Error::DepthExceeded { max } => json!({
                "message": "reply nests too deep",
                "type": "depth-exceeded",
                "max": max,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::EmptyBody => json!({
                "message": "comment body is empty",
                "type": "empty-body",
            }),
            Error::Unavailable(msg) => json!({
                "message": msg,
                "type": "unavailable",
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| anyhow!("parsing error contents: {e}"))?;
        let message = || {
            String::from(
                data.get("message")
                    .and_then(|msg| msg.as_str())
                    .unwrap_or(""),
            )
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(message()),
                "permission-denied" => Error::PermissionDenied,
                "not-found" => Error::NotFound(String::from(
                    data.get("what")
                        .and_then(|w| w.as_str())
                        .ok_or_else(|| anyhow!("error is a not-found without a target"))?,
                )),
                "invalid-cursor" => Error::InvalidCursor,
                "depth-exceeded" => Error::DepthExceeded {
                    max: data
                        .get("max")
                        .and_then(|m| m.as_u64())
                        .ok_or_else(|| anyhow!("error is a depth-exceeded without a max"))?
                        as usize,
                },
                "null-byte" => Error::NullByteInString(String::from(
                    data.get("string").and_then(|s| s.as_str()).ok_or_else(|| {
                        anyhow!("error is a null-byte-in-string without a string")
                    })?,
                )),
                "empty-body" => Error::EmptyBody,
                "unavailable" => Error::Unavailable(message()),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
