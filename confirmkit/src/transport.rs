//! The transport seam.
//!
//! A [`Transport`] executes a [`WireRequest`] and returns the raw
//! status/headers/body triple. It never interprets content: 4xx and 5xx
//! responses are ordinary [`RawResponse`]s, and only failures to obtain a
//! response at all are [`TransportError`]s.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::error::SdkError;
use crate::request::WireRequest;

/// A pinned, boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes wire requests.
///
/// Implementations must be safe to share between concurrent confirmations;
/// a single connection pool may serve every in-flight request.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the raw response.
    fn send<'a>(
        &'a self,
        request: &'a WireRequest,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send<'a>(
        &'a self,
        request: &'a WireRequest,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send<'a>(
        &'a self,
        request: &'a WireRequest,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>> {
        (**self).send(request)
    }
}

/// Uninterpreted HTTP response.
///
/// Header lookup is case-insensitive.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Decoded UTF-8 body; `None` when the response had no body.
    pub body: Option<String>,
}

impl RawResponse {
    /// Creates a response with no headers and no body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Failure to obtain a response.
///
/// Kept separate from HTTP status codes so that a transport failure can
/// never be mistaken for a server answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The host name could not be resolved.
    #[error("unknown host: {0}")]
    UnknownHost(String),
    /// No response arrived within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// The connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),
    /// Any other failure.
    #[error("transport failure: {0}")]
    Undetermined(String),
}

impl From<TransportError> for SdkError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::UnknownHost(_) => Self::unknown_host(None),
            TransportError::Timeout
            | TransportError::Connection(_)
            | TransportError::Body(_)
            | TransportError::Undetermined(_) => Self::unknown(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = RawResponse::new(StatusCode::OK).with_header(
            HeaderName::from_static("paypal-debug-id"),
            HeaderValue::from_static("abc123"),
        );
        assert_eq!(response.header("Paypal-Debug-Id"), Some("abc123"));
        assert_eq!(response.header("PAYPAL-DEBUG-ID"), Some("abc123"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn test_transport_errors_carry_no_correlation_id() {
        let host: SdkError = TransportError::UnknownHost("api.invalid".into()).into();
        assert_eq!(host.kind, ErrorKind::UnknownHost);
        assert_eq!(host.correlation_id, None);

        let timeout: SdkError = TransportError::Timeout.into();
        assert_eq!(timeout.kind, ErrorKind::Unknown);
    }
}
