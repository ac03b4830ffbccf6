//! Daemon-level error type. Each variant maps to an HTTP status and a
//! machine-readable code so RPC handlers can return it directly.

use axum::http::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum DelugeError {
    #[error("Username required")]
    AuthenticationRequired { username: String },

    #[error("Password does not match")]
    BadLogin { username: String },

    #[error("Auth level too low: {required} > {current}")]
    NotAuthorized { current: u8, required: u8 },

    #[error("Deluge daemon already running with this config directory!")]
    DaemonRunning,

    #[error("{0} is not a valid path")]
    InvalidPath(String),

    #[error("Config key '{0}' not found")]
    UnknownConfigKey(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("RPC failed: {0}")]
    Rpc(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl DelugeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired { .. } | Self::BadLogin { .. } => StatusCode::UNAUTHORIZED,
            Self::NotAuthorized { .. } => StatusCode::FORBIDDEN,
            Self::DaemonRunning => StatusCode::CONFLICT,
            Self::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Self::UnknownConfigKey(_) => StatusCode::NOT_FOUND,
            Self::Connection(_) => StatusCode::BAD_GATEWAY,
            Self::Rpc(_) | Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        });
        match self {
            Self::AuthenticationRequired { username } | Self::BadLogin { username } => {
                body["username"] = serde_json::json!(username);
            }
            Self::NotAuthorized { current, required } => {
                body["current"] = serde_json::json!(current);
                body["required"] = serde_json::json!(required);
            }
            Self::UnknownConfigKey(key) => {
                body["key"] = serde_json::json!(key);
            }
            _ => {}
        }
        body
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired { .. } => "AUTHENTICATION_REQUIRED",
            Self::BadLogin { .. } => "BAD_LOGIN",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::DaemonRunning => "DAEMON_RUNNING",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::UnknownConfigKey(_) => "UNKNOWN_CONFIG_KEY",
            Self::Connection(_) => "CONNECTION_FAILED",
            Self::Rpc(_) => "RPC_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Errors the UI answers with a credentials prompt instead of a retry.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired { .. } | Self::BadLogin { .. }
        )
    }
}

impl axum::response::IntoResponse for DelugeError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err = DelugeError::BadLogin { username: "alice".into() };
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        let body = err.to_json();
        assert_eq!(body["error_code"], "BAD_LOGIN");
        assert_eq!(body["username"], "alice");
        assert!(err.is_auth_error());

        let err = DelugeError::NotAuthorized { current: 1, required: 10 };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(!err.is_auth_error());
        assert_eq!(err.to_string(), "Auth level too low: 10 > 1");
    }
}
