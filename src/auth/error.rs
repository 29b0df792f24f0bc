use thiserror::Error;

/// Errors produced by the session and its collaborators.
///
/// Every variant carries owned strings so a single result can be cloned out
/// to all callers waiting on the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Refresh token is empty")]
    MissingRefreshToken,
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("Token exchange failed{}: {message}", status_suffix(.status))]
    TokenExchangeFailure {
        status: Option<u16>,
        message: String,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Identity token decode error: {0}")]
    Decode(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Session changed while the operation was in flight")]
    Superseded,
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" with status {code}"))
        .unwrap_or_default()
}

impl AuthError {
    /// Stable machine-readable name, used in [`crate::session::ErrorInfo`].
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingRefreshToken => "missing_refresh_token",
            Self::AuthorizationDenied(_) => "authorization_denied",
            Self::TokenExchangeFailure { .. } => "token_exchange_failure",
            Self::Storage(_) => "storage_failure",
            Self::Decode(_) => "decode_failure",
            Self::Network(_) => "network",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Configuration(_) => "configuration",
            Self::Superseded => "superseded",
        }
    }

    /// Whether the session should be considered ended by this error.
    ///
    /// Only [`AuthError::Superseded`] is exempt: the session moved on without
    /// this operation, nothing about it ended.
    pub fn ends_session(&self) -> bool {
        !matches!(self, Self::Superseded)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidResponse(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Storage(error.to_string())
    }
}
