use std::fmt;

/// Failure reported by an external collaborator (identity or project service).
///
/// These never reach clients verbatim: the gateway logs them and answers
/// with the matching handshake rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

impl ServiceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: "UNAVAILABLE".to_string(),
            message: message.into(),
        }
    }

    pub fn unexpected_response(message: impl Into<String>) -> Self {
        Self {
            code: "UNEXPECTED_RESPONSE".to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!(?err, "project service request failed");
        Self::unavailable("Project service unreachable")
    }
}
