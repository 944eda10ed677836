//! Challenge destinations and the launcher seam.
//!
//! When a confirmation needs payer action, the client builds a
//! [`ChallengeDestination`]: the external page to open, the URL scheme the
//! page returns to and opaque [`ChallengeMetadata`] that travels with the
//! redirect and comes back unchanged. Opening the page is left to a
//! [`ChallengeLauncher`] supplied by the host application.
//!
//! Building a destination has no side effects.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::constants::{
    CHECKOUT_PATH, CHECKOUT_RETURN_PATH, ORDER_ID_KEY, SETUP_TOKEN_ID_KEY, VAULT_APPROVAL_PATH,
};
use crate::error::{ErrorDomain, SdkError};

/// What the payer is asked to do on the external surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Approve an order on the hosted PayPal checkout.
    Checkout,
    /// Approve a billing agreement for a PayPal vault setup token.
    Vault,
    /// Complete a 3-D Secure card challenge.
    ThreeDSecure,
}

impl ChallengeKind {
    /// Returns the snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Vault => "vault",
            Self::ThreeDSecure => "three_d_secure",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of server id a challenge is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// An order id, stored under `order_id`.
    Order,
    /// A vault setup-token id, stored under `setup_token_id`.
    SetupToken,
}

impl ReferenceKind {
    /// Metadata key holding the reference id.
    #[must_use]
    pub const fn metadata_key(self) -> &'static str {
        match self {
            Self::Order => ORDER_ID_KEY,
            Self::SetupToken => SETUP_TOKEN_ID_KEY,
        }
    }
}

/// Opaque JSON object carried through the external redirect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeMetadata(Map<String, Value>);

impl ChallengeMetadata {
    /// Metadata holding a single reference id.
    pub fn new(reference: ReferenceKind, reference_id: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(
            reference.metadata_key().to_owned(),
            Value::String(reference_id.into()),
        );
        Self(map)
    }

    /// Wraps an arbitrary JSON object.
    #[must_use]
    pub const fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns a string value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns the underlying object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Everything needed to hand the payer to an external surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDestination {
    /// Page to open.
    pub uri: Url,
    /// Scheme of the deep link that returns control to the app.
    pub return_scheme: String,
    /// What the payer is asked to do.
    pub kind: ChallengeKind,
    /// Kind of id the challenge is keyed by.
    pub reference: ReferenceKind,
    /// The order or setup-token id.
    pub reference_id: String,
    /// Opaque metadata returned with the redirect.
    pub metadata: ChallengeMetadata,
}

/// Funding source pre-selected on the hosted checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundingSource {
    /// PayPal balance or linked accounts.
    #[default]
    #[serde(rename = "paypal")]
    PayPal,
    /// PayPal Credit.
    Credit,
    /// Pay Later offers.
    #[serde(rename = "paylater")]
    PayLater,
}

impl FundingSource {
    /// Returns the query-parameter value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PayPal => "paypal",
            Self::Credit => "credit",
            Self::PayLater => "paylater",
        }
    }
}

/// Request to start a hosted PayPal checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Server-assigned order id.
    pub order_id: String,
    /// Funding source to pre-select.
    pub funding_source: Option<FundingSource>,
}

impl CheckoutRequest {
    /// Checkout with the default funding source.
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            funding_source: None,
        }
    }

    /// Pre-selects a funding source.
    #[must_use]
    pub const fn with_funding_source(mut self, funding_source: FundingSource) -> Self {
        self.funding_source = Some(funding_source);
        self
    }
}

/// Request to approve a PayPal vault setup token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayPalVaultRequest {
    /// Server-assigned setup-token id.
    pub setup_token_id: String,
}

impl PayPalVaultRequest {
    /// Creates a vault request.
    pub fn new(setup_token_id: impl Into<String>) -> Self {
        Self {
            setup_token_id: setup_token_id.into(),
        }
    }
}

/// Failure reported by a [`ChallengeLauncher`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    /// The device has nothing that can open the page.
    #[error("no browser is available to open the challenge")]
    NoBrowser,
    /// The launcher refused or failed for another reason.
    #[error("{0}")]
    Failed(String),
}

impl From<LaunchError> for SdkError {
    fn from(err: LaunchError) -> Self {
        Self::unknown(None)
            .with_description(format!("Unable to launch challenge: {err}"))
            .with_domain(ErrorDomain::Challenge)
    }
}

/// Opens a [`ChallengeDestination`] on an external surface.
///
/// Implemented by the host application: a browser tab on mobile, the system
/// browser on desktop, or simply printing the URL in a terminal.
pub trait ChallengeLauncher: Send + Sync {
    /// Hands the payer to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] if the surface could not be opened.
    fn launch(&self, destination: &ChallengeDestination) -> Result<(), LaunchError>;
}

impl<T: ChallengeLauncher + ?Sized> ChallengeLauncher for std::sync::Arc<T> {
    fn launch(&self, destination: &ChallengeDestination) -> Result<(), LaunchError> {
        (**self).launch(destination)
    }
}

/// Builds the hosted checkout destination for an order.
///
/// The URI is `<web base>/checkoutnow?token=<order>&redirect_uri=<return url>&native_xo=1`,
/// where the return URL is `<scheme>://x-callback-url/paypal-sdk/paypal-checkout`.
/// `fundingSource` is appended when one is given.
///
/// # Errors
///
/// Returns an invalid-request error if the order id is blank or the return
/// scheme is not a valid URL scheme.
pub fn checkout_destination(
    web_base: &Url,
    return_scheme: &str,
    request: &CheckoutRequest,
) -> Result<ChallengeDestination, SdkError> {
    let order_id = non_blank(&request.order_id, ORDER_ID_KEY, ErrorDomain::Checkout)?;
    validate_scheme(return_scheme, ErrorDomain::Checkout)?;

    let mut uri = join(web_base, CHECKOUT_PATH, ErrorDomain::Checkout)?;
    {
        let mut query = uri.query_pairs_mut();
        query
            .append_pair("token", order_id)
            .append_pair(
                "redirect_uri",
                &format!("{return_scheme}://{CHECKOUT_RETURN_PATH}"),
            )
            .append_pair("native_xo", "1");
        if let Some(funding) = request.funding_source {
            query.append_pair("fundingSource", funding.as_str());
        }
    }

    Ok(ChallengeDestination {
        uri,
        return_scheme: return_scheme.to_owned(),
        kind: ChallengeKind::Checkout,
        reference: ReferenceKind::Order,
        reference_id: order_id.to_owned(),
        metadata: ChallengeMetadata::new(ReferenceKind::Order, order_id),
    })
}

/// Builds the billing-agreement approval destination for a setup token.
///
/// # Errors
///
/// Returns an invalid-request error if the setup-token id is blank or the
/// return scheme is not a valid URL scheme.
pub fn vault_destination(
    web_base: &Url,
    return_scheme: &str,
    request: &PayPalVaultRequest,
) -> Result<ChallengeDestination, SdkError> {
    let token = non_blank(&request.setup_token_id, SETUP_TOKEN_ID_KEY, ErrorDomain::Checkout)?;
    validate_scheme(return_scheme, ErrorDomain::Checkout)?;

    let mut uri = join(web_base, VAULT_APPROVAL_PATH, ErrorDomain::Checkout)?;
    uri.query_pairs_mut()
        .append_pair("approval_session_id", token);

    Ok(ChallengeDestination {
        uri,
        return_scheme: return_scheme.to_owned(),
        kind: ChallengeKind::Vault,
        reference: ReferenceKind::SetupToken,
        reference_id: token.to_owned(),
        metadata: ChallengeMetadata::new(ReferenceKind::SetupToken, token),
    })
}

/// Wraps a server-provided 3-D Secure challenge link.
///
/// # Errors
///
/// Returns an invalid-request error if the link is not an absolute URL, the
/// reference id is blank or the return scheme is not a valid URL scheme.
pub fn three_d_secure_destination(
    challenge_uri: &str,
    return_scheme: &str,
    reference: ReferenceKind,
    reference_id: &str,
) -> Result<ChallengeDestination, SdkError> {
    let reference_id = non_blank(reference_id, reference.metadata_key(), ErrorDomain::Card)?;
    validate_scheme(return_scheme, ErrorDomain::Card)?;
    let uri = Url::parse(challenge_uri).map_err(|e| {
        SdkError::invalid_request(None)
            .with_description(format!("Invalid challenge link {challenge_uri:?}: {e}"))
            .with_domain(ErrorDomain::Card)
    })?;

    Ok(ChallengeDestination {
        uri,
        return_scheme: return_scheme.to_owned(),
        kind: ChallengeKind::ThreeDSecure,
        reference,
        reference_id: reference_id.to_owned(),
        metadata: ChallengeMetadata::new(reference, reference_id),
    })
}

fn join(base: &Url, path: &str, domain: ErrorDomain) -> Result<Url, SdkError> {
    base.join(path).map_err(|e| {
        SdkError::invalid_request(None)
            .with_description(format!("Failed to construct ./{path} URL: {e}"))
            .with_domain(domain)
    })
}

fn non_blank<'a>(value: &'a str, field: &str, domain: ErrorDomain) -> Result<&'a str, SdkError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(SdkError::invalid_request(None)
            .with_description(format!("Missing {field}"))
            .with_domain(domain))
    } else {
        Ok(trimmed)
    }
}

/// RFC 3986 scheme: a letter followed by letters, digits, `+`, `-` or `.`.
fn validate_scheme(scheme: &str, domain: ErrorDomain) -> Result<(), SdkError> {
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SdkError::invalid_request(None)
            .with_description(format!("Invalid return URL scheme {scheme:?}"))
            .with_domain(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn web() -> Url {
        Url::parse("https://www.sandbox.paypal.com/").unwrap()
    }

    #[test]
    fn test_checkout_destination() {
        let destination = checkout_destination(
            &web(),
            "com.example.app",
            &CheckoutRequest::new("ORDER-1"),
        )
        .unwrap();

        assert_eq!(
            destination.uri.as_str(),
            "https://www.sandbox.paypal.com/checkoutnow?token=ORDER-1\
             &redirect_uri=com.example.app%3A%2F%2Fx-callback-url%2Fpaypal-sdk%2Fpaypal-checkout\
             &native_xo=1"
        );
        assert_eq!(destination.kind, ChallengeKind::Checkout);
        assert_eq!(destination.return_scheme, "com.example.app");
        assert_eq!(destination.metadata.get("order_id"), Some("ORDER-1"));
    }

    #[test]
    fn test_checkout_funding_source() {
        let request = CheckoutRequest::new("ORDER-1").with_funding_source(FundingSource::PayLater);
        let destination = checkout_destination(&web(), "com.example.app", &request).unwrap();
        let funding = destination
            .uri
            .query_pairs()
            .find(|(k, _)| k == "fundingSource")
            .map(|(_, v)| v.into_owned());
        assert_eq!(funding.as_deref(), Some("paylater"));
    }

    #[test]
    fn test_vault_destination() {
        let destination = vault_destination(
            &web(),
            "com.example.app",
            &PayPalVaultRequest::new("TOKEN-1"),
        )
        .unwrap();
        assert_eq!(
            destination.uri.as_str(),
            "https://www.sandbox.paypal.com/agreements/approve?approval_session_id=TOKEN-1"
        );
        assert_eq!(destination.reference, ReferenceKind::SetupToken);
        assert_eq!(destination.metadata.get("setup_token_id"), Some("TOKEN-1"));
        assert_eq!(destination.metadata.get("order_id"), None);
    }

    #[test]
    fn test_three_d_secure_destination_keeps_link() {
        let link = "https://www.sandbox.paypal.com/webapps/helios?action=verify&flow=3ds&cart_id=O-2";
        let destination =
            three_d_secure_destination(link, "com.example.app", ReferenceKind::Order, "O-2")
                .unwrap();
        assert_eq!(destination.uri.as_str(), link);
        assert_eq!(destination.kind, ChallengeKind::ThreeDSecure);
        assert_eq!(destination.metadata.get("order_id"), Some("O-2"));
    }

    #[test]
    fn test_invalid_inputs() {
        let err = checkout_destination(&web(), "com.example.app", &CheckoutRequest::new("  "))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(err.description.contains("order_id"));

        for scheme in ["", "1app", "my app"] {
            assert!(
                checkout_destination(&web(), scheme, &CheckoutRequest::new("O")).is_err(),
                "{scheme:?}"
            );
        }

        assert!(
            three_d_secure_destination("not a url", "app", ReferenceKind::Order, "O").is_err()
        );
    }

    #[test]
    fn test_launch_error_maps_to_challenge_domain() {
        let err: SdkError = LaunchError::NoBrowser.into();
        assert_eq!(err.domain, ErrorDomain::Challenge);
        assert!(err.description.contains("no browser"));
    }
}
