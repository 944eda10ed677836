//! A [`Transport`] that executes wire requests with `reqwest`.
//!
//! [`ReqwestTransport`] resolves REST paths against an API base URL and
//! sends GraphQL operations to a separate GraphQL URL, which lives on the
//! web host for the hosted environments. It never interprets
//! responses: every status code comes back as a [`RawResponse`], and only
//! failures to obtain a response are reported as [`TransportError`]s.
//!
//! ## Error classification
//!
//! - request timeout: [`TransportError::Timeout`]
//! - DNS resolution failure: [`TransportError::UnknownHost`]
//! - other connect failures: [`TransportError::Connection`]
//! - body read failures: [`TransportError::Body`]
//! - anything else: [`TransportError::Undetermined`]

use std::error::Error as StdError;
use std::time::Duration;

use confirmkit::config::Environment;
use confirmkit::constants::GRAPHQL_PATH;
use confirmkit::request::{Endpoint, WireRequest};
use confirmkit::transport::{BoxFuture, RawResponse, Transport, TransportError};
use http::HeaderMap;
use reqwest::Client;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::error::TransportBuildError;

/// HTTP transport for the payments API.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    /// Base URL REST paths are resolved against (e.g. `https://api-m.paypal.com/`)
    base_url: Url,
    /// Full URL for GraphQL operations
    graphql_url: Url,
    /// Shared reqwest HTTP client
    client: Client,
    /// Headers sent with every request; per-request headers take precedence
    headers: HeaderMap,
    /// Optional request timeout
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Constructs a transport from an API base URL.
    ///
    /// GraphQL operations go to `<base>/graphql` until
    /// [`Self::with_graphql_url`] says otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError`] if the GraphQL URL cannot be derived
    /// or the HTTP client cannot be built.
    pub fn try_new(base_url: Url) -> Result<Self, TransportBuildError> {
        let graphql_url = graphql_endpoint(&base_url)?;
        let client = Client::builder()
            .gzip(true)
            .build()
            .map_err(|e| TransportBuildError::Client {
                context: "Failed to build HTTP client",
                source: e,
            })?;
        Ok(Self {
            base_url,
            graphql_url,
            client,
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Constructs a transport for `environment`: REST calls go to its API
    /// host and GraphQL operations to its web host.
    ///
    /// # Errors
    ///
    /// Same as [`Self::try_new`].
    pub fn for_environment(environment: Environment) -> Result<Self, TransportBuildError> {
        let graphql_url = graphql_endpoint(&environment.web_base())?;
        Ok(Self::try_from(environment.api_url())?.with_graphql_url(graphql_url))
    }

    /// Returns the base URL used by this transport.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the GraphQL URL.
    pub const fn graphql_url(&self) -> &Url {
        &self.graphql_url
    }

    /// Returns the headers sent with every request.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Attaches headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends GraphQL operations to `graphql_url` (the full endpoint, not a
    /// base).
    #[must_use]
    pub fn with_graphql_url(mut self, graphql_url: Url) -> Self {
        self.graphql_url = graphql_url;
        self
    }

    /// Replaces the underlying HTTP client, e.g. to share a connection pool.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Resolves the full URL a request is sent to.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Undetermined`] if a REST path cannot be
    /// joined onto the base URL.
    pub fn endpoint_url(&self, request: &WireRequest) -> Result<Url, TransportError> {
        match request.endpoint {
            Endpoint::Rest => self.base_url.join(&request.path).map_err(|e| {
                let path = &request.path;
                TransportError::Undetermined(format!("invalid request path {path:?}: {e}"))
            }),
            Endpoint::GraphQl => Ok(self.graphql_url.clone()),
        }
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "confirmkit.http.send",
            skip_all,
            err,
            fields(method = %request.method, path = %request.path, timeout = ?self.timeout)
        )
    )]
    async fn execute(&self, request: &WireRequest) -> Result<RawResponse, TransportError> {
        let url = self.endpoint_url(request)?;

        let mut headers = self.headers.clone();
        headers.extend(request.headers.clone());

        let mut req = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let response = req.send().await.map_err(|e| classify(&e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(status = status.as_u16(), body_len = text.len(), "Response received");

        Ok(RawResponse {
            status,
            headers,
            body: (!text.is_empty()).then_some(text),
        })
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a WireRequest,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>> {
        Box::pin(self.execute(request))
    }
}

/// Converts a string URL into a `ReqwestTransport`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for ReqwestTransport {
    type Error = TransportBuildError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| TransportBuildError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Converts a String URL into a `ReqwestTransport`.
impl TryFrom<String> for ReqwestTransport {
    type Error = TransportBuildError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Resolves `./graphql` against `base`.
///
/// # Errors
///
/// Returns [`TransportBuildError::UrlParse`] if the join fails.
pub fn graphql_endpoint(base: &Url) -> Result<Url, TransportBuildError> {
    base.join(GRAPHQL_PATH)
        .map_err(|e| TransportBuildError::UrlParse {
            context: "Failed to construct ./graphql URL",
            source: e,
        })
}

fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    if err.is_connect() {
        if is_dns_failure(err) {
            let host = err
                .url()
                .and_then(Url::host_str)
                .unwrap_or_default()
                .to_owned();
            return TransportError::UnknownHost(host);
        }
        return TransportError::Connection(error_chain(err));
    }
    if err.is_body() || err.is_decode() {
        return TransportError::Body(error_chain(err));
    }
    TransportError::Undetermined(error_chain(err))
}

/// Resolver failures surface only as messages somewhere in the source chain.
fn is_dns_failure(err: &(dyn StdError + 'static)) -> bool {
    const MARKERS: [&str; 4] = [
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "no such host",
    ];
    let mut current = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_ascii_lowercase();
        if MARKERS.iter().any(|marker| message.contains(marker)) {
            return true;
        }
        current = e.source();
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}
