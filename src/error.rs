use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{service}: credentials rejected ({detail})")]
    Unauthorized { service: &'static str, detail: String },

    #[error("{service}: rate limited ({detail})")]
    RateLimited { service: &'static str, detail: String },

    #[error("{service}: unavailable ({detail})")]
    Unavailable { service: &'static str, detail: String },

    #[error("{service}: request rejected ({detail})")]
    Rejected { service: &'static str, detail: String },

    #[error("{service}: malformed response ({detail})")]
    Malformed { service: &'static str, detail: String },

    #[error("{service}: {source}")]
    Io {
        service: &'static str,
        #[source]
        source: std::io::Error,
    },
}

const BODY_SNIPPET_CHARS: usize = 400;

impl CollaboratorError {
    pub fn from_status(service: &'static str, status: StatusCode, body: &str) -> Self {
        let detail = format!(
            "HTTP {}: {}",
            status.as_u16(),
            body.chars().take(BODY_SNIPPET_CHARS).collect::<String>()
        );
        match status.as_u16() {
            // Google APIs report quota exhaustion as 403.
            403 if body.contains("quotaExceeded") || body.contains("rateLimitExceeded") => {
                Self::RateLimited { service, detail }
            }
            401 | 403 => Self::Unauthorized { service, detail },
            429 => Self::RateLimited { service, detail },
            408 | 500..=599 => Self::Unavailable { service, detail },
            _ => Self::Rejected { service, detail },
        }
    }

    pub fn transport(service: &'static str, err: &reqwest::Error) -> Self {
        Self::Unavailable {
            service,
            detail: err.to_string(),
        }
    }

    pub fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            service,
            detail: detail.into(),
        }
    }

    pub fn rejected(service: &'static str, detail: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            detail: detail.into(),
        }
    }

    pub fn io(service: &'static str, source: std::io::Error) -> Self {
        Self::Io { service, source }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("no visual source available (generative, stock and placeholder all failed)")]
    NoVisualSource,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("invalid credentials: {0}")]
    Unauthorized(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error(transparent)]
    FatalAsset(#[from] AssetError),

    #[error("{0:#}")]
    Transient(#[from] anyhow::Error),
}

impl From<CollaboratorError> for CycleError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Unauthorized { .. } => Self::Unauthorized(err.to_string()),
            CollaboratorError::RateLimited { .. } => Self::RateLimited(err.to_string()),
            other => Self::Transient(anyhow::Error::new(other)),
        }
    }
}

impl CycleError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::RateLimited(_) => "rate_limited",
            Self::FatalAsset(_) => "fatal_asset",
            Self::Transient(_) => "failed",
        }
    }
}
