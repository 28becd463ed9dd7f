/// Shared error type used across all agentchain crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The generation service failed. `status` is the upstream HTTP status
    /// when one was received; timeouts and transport failures carry `None`.
    #[error("upstream service error{}: {detail}", fmt_status(.status))]
    Upstream { status: Option<u16>, detail: String },

    #[error("persistence: {0}")]
    Persistence(String),

    /// A terminal commit could not be written; the execution is stranded
    /// in `processing` and needs operator attention.
    #[error("integrity fault on execution {execution_id}: {message}")]
    Integrity { execution_id: i64, message: String },

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),
}

impl Error {
    /// Build an [`Error::NotFound`] naming the missing entity.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{kind} {id}"))
    }

    /// True for errors the caller caused (bad id, bad input, policy).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Forbidden(_) | Error::Validation(_) | Error::Conflict(_)
        )
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
