//! Typed decoding of raw responses.
//!
//! Every parser here is total: malformed input never panics and never
//! escapes as a decoding error. Bodies that cannot be decoded become
//! [`ErrorKind::DataParsing`](crate::ErrorKind::DataParsing) errors carrying
//! the correlation id from the `Paypal-Debug-Id` header.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::constants::DEBUG_ID_HEADER;
use crate::error::SdkError;
use crate::transport::RawResponse;

/// Status of an order or of a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Order created, no payment source yet.
    Created,
    /// Order saved for later capture.
    Saved,
    /// Payer approved the order.
    Approved,
    /// Order voided.
    Voided,
    /// Payment captured.
    Completed,
    /// Payer must complete an external authentication step.
    PayerActionRequired,
}

impl OrderStatus {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Saved => "SAVED",
            Self::Approved => "APPROVED",
            Self::Voided => "VOIDED",
            Self::Completed => "COMPLETED",
            Self::PayerActionRequired => "PAYER_ACTION_REQUIRED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for a status value outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status {0:?}")]
pub struct UnknownOrderStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "SAVED" => Ok(Self::Saved),
            "APPROVED" => Ok(Self::Approved),
            "VOIDED" => Ok(Self::Voided),
            "COMPLETED" => Ok(Self::Completed),
            "PAYER_ACTION_REQUIRED" => Ok(Self::PayerActionRequired),
            other => Err(UnknownOrderStatus(other.to_owned())),
        }
    }
}

/// An order as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderInfo {
    /// Order id.
    pub reference_id: String,
    /// Order status.
    pub status: OrderStatus,
    /// Last four digits of the card, when a card is attached.
    pub last4: Option<String>,
    /// Card brand, e.g. `VISA`.
    pub brand: Option<String>,
    /// Card type, e.g. `CREDIT`.
    pub card_type: Option<String>,
}

/// Outcome of one confirm-payment-source attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// The card was accepted without further payer action.
    Confirmed(OrderInfo),
    /// The payer must authenticate at `challenge_uri`.
    ChallengeRequired {
        /// Order id the challenge belongs to.
        reference_id: String,
        /// External authentication page.
        challenge_uri: String,
    },
    /// The attempt failed.
    Failed {
        /// Classified failure.
        error: SdkError,
    },
}

/// Outcome of attaching a card to a vault setup token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultResult {
    /// The setup token was updated.
    Updated {
        /// Setup-token id.
        setup_token_id: String,
        /// Server status of the setup token.
        status: String,
    },
    /// The payer must authenticate at `challenge_uri`.
    ChallengeRequired {
        /// Setup-token id the challenge belongs to.
        setup_token_id: String,
        /// External authentication page.
        challenge_uri: String,
    },
    /// The update failed.
    Failed {
        /// Classified failure.
        error: SdkError,
    },
}

/// Why a successful response could not be decoded.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseFailure {
    #[error("response has no body")]
    MissingBody,
    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownStatus(#[from] UnknownOrderStatus),
    #[error("response has neither data nor errors")]
    EmptyGraphQl,
}

/// Returns the `Paypal-Debug-Id` header value.
#[must_use]
pub fn correlation_id(response: &RawResponse) -> Option<String> {
    response.header(DEBUG_ID_HEADER).map(str::to_owned)
}

/// Classifies a non-2xx response.
///
/// Returns `None` for any status in `200..=299`. Otherwise: a blank body
/// yields [`SdkError::no_response_data`], a 5xx yields
/// [`SdkError::server_response`], and a 4xx passes its status through with
/// the server's `message` and `details` folded into the description. A body
/// that is not a recognised error document is kept verbatim as the
/// description.
#[must_use]
pub fn parse_error(response: &RawResponse) -> Option<SdkError> {
    if response.status.is_success() {
        return None;
    }
    let correlation_id = correlation_id(response);

    let Some(body) = response
        .body
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
    else {
        return Some(SdkError::no_response_data(correlation_id));
    };
    if response.status.is_server_error() {
        return Some(SdkError::server_response(correlation_id));
    }

    let status = response.status.as_u16();
    let description = serde_json::from_str::<ErrorBody>(body)
        .map_or_else(|_| body.to_owned(), |error| error.describe());
    Some(SdkError::http_status(status, description, correlation_id))
}

/// Decodes a confirm-payment-source response.
#[must_use]
pub fn parse_confirm_payment_source(response: &RawResponse) -> ConfirmationResult {
    if let Some(error) = parse_error(response) {
        return ConfirmationResult::Failed { error };
    }
    match decode::<OrderBody>(response).and_then(OrderBody::into_confirmation) {
        Ok(result) => result,
        Err(failure) => ConfirmationResult::Failed {
            error: parse_failure(response, &failure),
        },
    }
}

/// Decodes a get-order response.
///
/// # Errors
///
/// Returns the classified error for non-2xx responses, or a data-parsing
/// error when the body cannot be decoded.
pub fn parse_order(response: &RawResponse) -> Result<OrderInfo, SdkError> {
    if let Some(error) = parse_error(response) {
        return Err(error);
    }
    decode::<OrderBody>(response)
        .and_then(OrderBody::into_order_info)
        .map_err(|failure| parse_failure(response, &failure))
}

/// Decodes an `UpdateVaultSetupToken` GraphQL response.
#[must_use]
pub fn parse_update_setup_token(response: &RawResponse) -> VaultResult {
    if let Some(error) = parse_error(response) {
        return VaultResult::Failed { error };
    }
    let body = match decode::<GraphQlResponse<UpdateSetupTokenData>>(response) {
        Ok(body) => body,
        Err(failure) => {
            return VaultResult::Failed {
                error: parse_failure(response, &failure),
            };
        }
    };

    let Some(token) = body.data.and_then(|d| d.update_vault_setup_token) else {
        let error = body.errors.into_iter().next().map_or_else(
            || parse_failure(response, &ParseFailure::EmptyGraphQl),
            |e| SdkError::server_response(correlation_id(response)).with_description(e.message),
        );
        return VaultResult::Failed { error };
    };

    let approve = token
        .links
        .iter()
        .find(|link| link.rel == "approve")
        .map(|link| link.href.clone());
    match approve {
        Some(challenge_uri) if token.status == "PAYER_ACTION_REQUIRED" => {
            VaultResult::ChallengeRequired {
                setup_token_id: token.id,
                challenge_uri,
            }
        }
        _ => VaultResult::Updated {
            setup_token_id: token.id,
            status: token.status,
        },
    }
}

fn decode<T: for<'de> Deserialize<'de>>(response: &RawResponse) -> Result<T, ParseFailure> {
    let body = response.body.as_deref().ok_or(ParseFailure::MissingBody)?;
    Ok(serde_json::from_str(body)?)
}

fn parse_failure(response: &RawResponse, failure: &ParseFailure) -> SdkError {
    let correlation_id = correlation_id(response);
    #[cfg(feature = "telemetry")]
    tracing::warn!(
        error = %failure,
        correlation_id = correlation_id.as_deref().unwrap_or_default(),
        "Failed to decode response body"
    );
    #[cfg(not(feature = "telemetry"))]
    let _ = failure;
    SdkError::data_parsing(correlation_id)
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    issue: String,
    #[serde(default)]
    description: Option<String>,
}

impl ErrorBody {
    fn describe(&self) -> String {
        if self.details.is_empty() {
            return self.message.clone();
        }
        let details = self
            .details
            .iter()
            .map(|d| match &d.description {
                Some(description) => format!("{}: {description}", d.issue),
                None => d.issue.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} -> [{details}]", self.message)
    }
}

#[derive(Deserialize)]
struct LinkBody {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct OrderBody {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<LinkBody>,
    #[serde(default)]
    payment_source: Option<PaymentSourceBody>,
}

#[derive(Deserialize)]
struct PaymentSourceBody {
    #[serde(default)]
    card: Option<CardSummaryBody>,
}

#[derive(Deserialize)]
struct CardSummaryBody {
    #[serde(default)]
    last_digits: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default, rename = "type")]
    card_type: Option<String>,
}

impl OrderBody {
    fn into_confirmation(self) -> Result<ConfirmationResult, ParseFailure> {
        let payer_action = self
            .links
            .iter()
            .find(|link| link.rel == "payer-action")
            .map(|link| link.href.clone());
        match payer_action {
            Some(challenge_uri) => {
                // Unknown statuses are rejected even alongside a payer-action link.
                self.status.parse::<OrderStatus>()?;
                Ok(ConfirmationResult::ChallengeRequired {
                    reference_id: self.id,
                    challenge_uri,
                })
            }
            None => self.into_order_info().map(ConfirmationResult::Confirmed),
        }
    }

    fn into_order_info(self) -> Result<OrderInfo, ParseFailure> {
        let status = self.status.parse()?;
        let card = self.payment_source.and_then(|source| source.card);
        let (last4, brand, card_type) = card.map_or((None, None, None), |card| {
            (card.last_digits, card.brand, card.card_type)
        });
        Ok(OrderInfo {
            reference_id: self.id,
            status,
            last4,
            brand,
            card_type,
        })
    }
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSetupTokenData {
    #[serde(default)]
    update_vault_setup_token: Option<SetupTokenBody>,
}

#[derive(Deserialize)]
struct SetupTokenBody {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<LinkBody>,
}
