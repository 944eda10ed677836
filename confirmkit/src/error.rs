//! Error taxonomy for payment confirmation.
//!
//! Every failure surfaced to callers is an [`SdkError`]: a stable numeric
//! code, a domain tag, a human-readable description and the server
//! correlation id when one was available. The set of [`ErrorKind`]s is
//! closed; HTTP failures that carry a server explanation pass the literal
//! status code through as [`ErrorKind::HttpStatus`].

use std::fmt;

const UNKNOWN_DESCRIPTION: &str =
    "An unknown error occurred. Contact developer.paypal.com/support.";
const DATA_PARSING_DESCRIPTION: &str =
    "An error occurred parsing HTTP response data. Contact developer.paypal.com/support.";
const UNKNOWN_HOST_DESCRIPTION: &str =
    "An error occurred due to an invalid HTTP response. Contact developer.paypal.com/support.";
const NO_RESPONSE_DATA_DESCRIPTION: &str =
    "An error occurred due to missing HTTP response data. Contact developer.paypal.com/support.";
const INVALID_REQUEST_DESCRIPTION: &str =
    "An error occurred constructing an HTTP request. Contact developer.paypal.com/support.";
const SERVER_RESPONSE_DESCRIPTION: &str =
    "A server error occurred. Contact developer.paypal.com/support.";

/// Kind of failure, with a stable numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The failure could not be classified.
    Unknown,
    /// A response body could not be decoded.
    DataParsing,
    /// The API host could not be resolved.
    UnknownHost,
    /// An error response arrived without a body.
    NoResponseData,
    /// An outbound request could not be constructed, or a returning
    /// challenge could not be correlated.
    InvalidRequest,
    /// The server failed with a 5xx status.
    ServerResponse,
    /// The server rejected the request; carries the literal HTTP status.
    HttpStatus(u16),
}

impl ErrorKind {
    /// Returns the stable numeric code for this kind.
    ///
    /// Fixed kinds map to `0..=5`; [`ErrorKind::HttpStatus`] returns the
    /// HTTP status itself.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::DataParsing => 1,
            Self::UnknownHost => 2,
            Self::NoResponseData => 3,
            Self::InvalidRequest => 4,
            Self::ServerResponse => 5,
            Self::HttpStatus(status) => status,
        }
    }

    /// Returns a short machine-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::DataParsing => "data_parsing",
            Self::UnknownHost => "unknown_host",
            Self::NoResponseData => "no_response_data",
            Self::InvalidRequest => "invalid_request",
            Self::ServerResponse => "server_response",
            Self::HttpStatus(_) => "http_status",
        }
    }
}

/// Component that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorDomain {
    /// Request building, transport and response parsing.
    #[default]
    Core,
    /// Card confirmation and card vaulting.
    Card,
    /// Hosted PayPal checkout and PayPal vaulting.
    Checkout,
    /// Launching or correlating an external challenge.
    Challenge,
}

impl ErrorDomain {
    /// Returns the domain tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Card => "card",
            Self::Checkout => "checkout",
            Self::Challenge => "challenge",
        }
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure reported to callers.
///
/// Two errors are equal when all of their fields are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkError {
    /// Failure kind.
    pub kind: ErrorKind,
    /// Component that produced the error.
    pub domain: ErrorDomain,
    /// Human-readable description.
    pub description: String,
    /// Value of the `Paypal-Debug-Id` response header, when a response was
    /// received.
    pub correlation_id: Option<String>,
}

impl SdkError {
    /// Creates an error of the given kind in the [`ErrorDomain::Core`] domain.
    pub fn new(
        kind: ErrorKind,
        description: impl Into<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            kind,
            domain: ErrorDomain::Core,
            description: description.into(),
            correlation_id,
        }
    }

    /// An unclassified failure.
    #[must_use]
    pub fn unknown(correlation_id: Option<String>) -> Self {
        Self::new(ErrorKind::Unknown, UNKNOWN_DESCRIPTION, correlation_id)
    }

    /// A response body that could not be decoded.
    #[must_use]
    pub fn data_parsing(correlation_id: Option<String>) -> Self {
        Self::new(ErrorKind::DataParsing, DATA_PARSING_DESCRIPTION, correlation_id)
    }

    /// The API host could not be resolved.
    #[must_use]
    pub fn unknown_host(correlation_id: Option<String>) -> Self {
        Self::new(ErrorKind::UnknownHost, UNKNOWN_HOST_DESCRIPTION, correlation_id)
    }

    /// An error response without a body.
    #[must_use]
    pub fn no_response_data(correlation_id: Option<String>) -> Self {
        Self::new(
            ErrorKind::NoResponseData,
            NO_RESPONSE_DATA_DESCRIPTION,
            correlation_id,
        )
    }

    /// A request that could not be constructed.
    #[must_use]
    pub fn invalid_request(correlation_id: Option<String>) -> Self {
        Self::new(
            ErrorKind::InvalidRequest,
            INVALID_REQUEST_DESCRIPTION,
            correlation_id,
        )
    }

    /// A 5xx server failure.
    #[must_use]
    pub fn server_response(correlation_id: Option<String>) -> Self {
        Self::new(
            ErrorKind::ServerResponse,
            SERVER_RESPONSE_DESCRIPTION,
            correlation_id,
        )
    }

    /// A rejected request, carrying the literal HTTP status and the server's
    /// explanation.
    pub fn http_status(
        status: u16,
        description: impl Into<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self::new(ErrorKind::HttpStatus(status), description, correlation_id)
    }

    /// Replaces the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Re-tags the error with another domain.
    #[must_use]
    pub const fn with_domain(mut self, domain: ErrorDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Returns the stable numeric code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.kind.code()
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.domain, self.code(), self.description)?;
        if let Some(id) = &self.correlation_id {
            write!(f, " (correlation id: {id})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SdkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_codes() {
        assert_eq!(SdkError::unknown(None).code(), 0);
        assert_eq!(SdkError::data_parsing(None).code(), 1);
        assert_eq!(SdkError::unknown_host(None).code(), 2);
        assert_eq!(SdkError::no_response_data(None).code(), 3);
        assert_eq!(SdkError::invalid_request(None).code(), 4);
        assert_eq!(SdkError::server_response(None).code(), 5);
    }

    #[test]
    fn test_http_status_passthrough() {
        let err = SdkError::http_status(404, "not found", Some("abc123".into()));
        assert_eq!(err.code(), 404);
        assert_eq!(err.kind.as_str(), "http_status");
        assert_eq!(err.correlation_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_equality_is_by_value() {
        let a = SdkError::data_parsing(Some("id-1".into()));
        assert_eq!(a, SdkError::data_parsing(Some("id-1".into())));
        assert_ne!(a, SdkError::data_parsing(Some("id-2".into())));
        assert_ne!(a, SdkError::data_parsing(None));
        assert_ne!(
            a.clone(),
            a.with_domain(ErrorDomain::Card),
        );
    }

    #[test]
    fn test_display_includes_correlation_id() {
        let err = SdkError::server_response(Some("dbg".into())).with_domain(ErrorDomain::Card);
        let text = err.to_string();
        assert!(text.starts_with("[card:5] A server error occurred."));
        assert!(text.ends_with("(correlation id: dbg)"));
    }
}
