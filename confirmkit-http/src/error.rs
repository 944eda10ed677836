//! Errors raised while building a transport.

/// A transport could not be constructed.
#[derive(Debug, thiserror::Error)]
pub enum TransportBuildError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP client could not be built.
    #[cfg(feature = "client")]
    #[error("HTTP client error: {context}: {source}")]
    Client {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}
