use thiserror::Error;

/// Errors returned by object-store, discovery and exec calls.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object (or endpoint) does not exist. An expected outcome for `get`.
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The write was based on a stale resourceVersion.
    #[error("conflict writing {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("api server returned {status} for {target}: {message}")]
    Api {
        status: u16,
        target: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("exec in pod {pod} failed: {message}")]
    Exec { pod: String, message: String },
}

impl StoreError {
    /// Map a non-success HTTP status to an error for `target`.
    pub fn from_status(status: u16, target: &str, message: String) -> Self {
        match status {
            404 => StoreError::NotFound(target.to_string()),
            401 => StoreError::Unauthorized(message),
            403 => StoreError::Forbidden(message),
            409 if message.contains("AlreadyExists") => {
                StoreError::AlreadyExists(target.to_string())
            }
            409 => StoreError::Conflict(target.to_string()),
            _ => StoreError::Api {
                status,
                target: target.to_string(),
                message,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// NotFound, Unauthorized or Forbidden: the endpoint is absent or hidden from us.
    pub fn is_absent_or_denied(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::Unauthorized(_) | StoreError::Forbidden(_)
        )
    }
}
