use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request (HTTP {status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("Controller error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Protocol error: {0}")]
    Protocol(#[from] unifi_protect_data::Error),

    #[error("Stream closed unexpectedly: {0}")]
    Stream(String),

    #[error("Operation invalid for current state: {0}")]
    State(&'static str),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(error))
    }
}

impl Error {
    /// Maps a non-2xx response status to the error taxonomy.
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Error::Auth(message),
            403 => Error::Permission(message),
            404 => Error::NotFound(message),
            400..=499 => Error::BadRequest { status, message },
            _ => Error::Api { status, message },
        }
    }

    /// Whether a retry after re-authentication could succeed.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Whether the failure is transient enough to retry an idempotent
    /// request.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(err) => err.is_timeout() || err.is_connect(),
            Error::Api { status, .. } => *status >= 500,
            Error::Stream(_) => true,
            _ => false,
        }
    }
}
