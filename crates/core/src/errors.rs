use thiserror::Error;

/// Failure classes surfaced across the HTTP boundary. Messages carried here are
/// for logs; callers render `user_message` to end users.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), correlation_id: "unassigned".to_owned() }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            correlation_id: "unassigned".to_owned(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), correlation_id: "unassigned".to_owned() }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        match &mut self {
            Self::BadRequest { correlation_id: id, .. }
            | Self::ServiceUnavailable { correlation_id: id, .. }
            | Self::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        self
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::InterfaceError;

    #[test]
    fn correlation_id_is_attached_to_every_class() {
        for error in [
            InterfaceError::bad_request("malformed fetch reply"),
            InterfaceError::service_unavailable("pool timed out"),
            InterfaceError::internal("context serialization failed"),
        ] {
            let tagged = error.with_correlation_id("req-1");
            assert_eq!(tagged.correlation_id(), "req-1");
        }
    }

    #[test]
    fn bad_request_has_user_safe_message() {
        let interface =
            InterfaceError::bad_request("query rejected: DROP").with_correlation_id("req-2");

        assert!(interface.is_client_error());
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
        assert!(!interface.user_message().contains("DROP"));
    }

    #[test]
    fn service_unavailable_is_not_a_client_error() {
        let interface = InterfaceError::service_unavailable("database lock timeout");

        assert!(!interface.is_client_error());
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn internal_error_hides_details() {
        let interface = InterfaceError::internal("invalid agent map");
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
