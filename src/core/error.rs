use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriveError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown data platform {token:?}: supported platforms are {}", .supported.join(", "))]
    UnknownPlatform {
        token: String,
        supported: Vec<&'static str>,
    },

    #[error("invalid parameters for {platform}: {reason}; the url path must be in the form {shape}")]
    InvalidParameters {
        platform: &'static str,
        shape: &'static str,
        reason: String,
    },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("read failure: {0}")]
    ReadFailure(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DriveError>;

impl DriveError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    pub fn invalid_parameters(
        platform: &'static str,
        shape: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameters {
            platform,
            shape,
            reason: reason.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn read_failure(msg: impl Into<String>) -> Self {
        Self::ReadFailure(msg.into())
    }

    /// Stable short code, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::UnknownPlatform { .. } => "unknown_platform",
            Self::InvalidParameters { .. } => "invalid_parameters",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::NotFound(_) => "not_found",
            Self::ReadFailure(_) => "read_failure",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DriveError;

    #[test]
    fn unknown_platform_lists_supported_tokens() {
        let err = DriveError::UnknownPlatform {
            token: "unknown".to_string(),
            supported: vec!["columnar", "document", "relational"],
        };
        assert_eq!(
            err.to_string(),
            "unknown data platform \"unknown\": supported platforms are columnar, document, relational"
        );
    }

    #[test]
    fn invalid_parameters_names_path_shape() {
        let err = DriveError::invalid_parameters(
            "columnar",
            "/columnar/<project>/<dataset>/<view>",
            "expected 3 parameters, got 1",
        );
        let text = err.to_string();
        assert!(text.contains("/columnar/<project>/<dataset>/<view>"));
        assert!(text.contains("expected 3 parameters, got 1"));
        assert_eq!(err.code(), "invalid_parameters");
    }
}
