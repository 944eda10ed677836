//! Correlation of returning deep links with the challenge that started them.
//!
//! A [`ResultCorrelator`] holds at most one [`PendingChallenge`]. Starting a
//! challenge replaces whatever was pending (last writer wins), and the
//! replaced challenge's callback is ignored as stale when it arrives.
//! Completing a challenge clears the slot in the same critical section that
//! reads it, so each challenge yields at most one [`RedirectOutcome`].
//!
//! ```text
//! Idle --begin--> Pending --complete--> (outcome delivered) --> Idle
//!                    |
//!                    +--begin--> Pending (old challenge now stale)
//! ```
//!
//! The pending challenge can be exported with
//! [`PendingChallenge::to_instance_state`] and restored later, so a
//! challenge survives the host process being killed while the payer is on
//! the external page.

use std::sync::{Mutex, MutexGuard, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::challenge::{ChallengeDestination, ChallengeKind, ChallengeMetadata, ReferenceKind};
use crate::constants::{APPROVAL_SESSION_ID_PARAM, OP_TYPE_PARAM, PAYER_ID_PARAM};
use crate::error::{ErrorDomain, SdkError};
use crate::timestamp::UnixTimestamp;

/// A challenge handed to an external surface and not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChallenge {
    /// The order or setup-token id.
    pub reference_id: String,
    /// What the payer was asked to do.
    pub kind: ChallengeKind,
    /// Kind of id the challenge is keyed by.
    pub reference: ReferenceKind,
    /// Scheme of the deep link expected back.
    pub return_scheme: String,
    /// Metadata sent with the redirect.
    pub metadata: ChallengeMetadata,
    /// When the challenge was started.
    pub created_at: UnixTimestamp,
}

impl PendingChallenge {
    /// Creates a pending challenge for `destination`, stamped with the
    /// current time.
    #[must_use]
    pub fn for_destination(destination: &ChallengeDestination) -> Self {
        Self {
            reference_id: destination.reference_id.clone(),
            kind: destination.kind,
            reference: destination.reference,
            return_scheme: destination.return_scheme.clone(),
            metadata: destination.metadata.clone(),
            created_at: UnixTimestamp::now(),
        }
    }

    /// Encodes the challenge as base64 JSON.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the metadata cannot be encoded.
    pub fn to_instance_state(&self) -> Result<String, SdkError> {
        let json = serde_json::to_vec(self).map_err(|e| instance_state_error(&e))?;
        Ok(b64.encode(json))
    }

    /// Decodes a challenge produced by [`Self::to_instance_state`].
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if `state` is not valid base64 JSON
    /// describing a pending challenge.
    pub fn from_instance_state(state: &str) -> Result<Self, SdkError> {
        let json = b64
            .decode(state.trim())
            .map_err(|e| instance_state_error(&e))?;
        serde_json::from_slice(&json).map_err(|e| instance_state_error(&e))
    }
}

fn instance_state_error(err: &dyn std::error::Error) -> SdkError {
    SdkError::invalid_request(None)
        .with_description(format!("Invalid challenge instance state: {err}"))
        .with_domain(ErrorDomain::Challenge)
}

/// Control returning to the app after an external challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RedirectEvent {
    /// The deep link the app was opened with; `None` when the app simply
    /// resumed.
    pub deep_link: Option<String>,
    /// Metadata returned with the redirect.
    pub metadata: Option<ChallengeMetadata>,
}

impl RedirectEvent {
    /// The app was opened by a deep link carrying `metadata`.
    pub fn deep_link(deep_link: impl Into<String>, metadata: ChallengeMetadata) -> Self {
        Self {
            deep_link: Some(deep_link.into()),
            metadata: Some(metadata),
        }
    }

    /// The app resumed without a deep link; the payer left the challenge.
    #[must_use]
    pub const fn resumed() -> Self {
        Self {
            deep_link: None,
            metadata: None,
        }
    }
}

/// A challenge the payer completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSuccess {
    /// The order or setup-token id.
    pub reference_id: String,
    /// What the payer did.
    pub kind: ChallengeKind,
    /// Payer id returned by a checkout approval, or by a 3-D Secure return
    /// that carries one.
    pub payer_id: Option<String>,
    /// Approval session id returned by a vault approval.
    pub approval_session_id: Option<String>,
    /// The deep link that completed the challenge.
    pub deep_link: Url,
}

/// Terminal result of one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// The payer completed the challenge.
    Success(ChallengeSuccess),
    /// The payer abandoned or explicitly cancelled the challenge.
    Canceled {
        /// The order or setup-token id.
        reference_id: String,
        /// What the payer was asked to do.
        kind: ChallengeKind,
    },
    /// The redirect could not be correlated.
    Failure {
        /// The order or setup-token id.
        reference_id: String,
        /// What the payer was asked to do.
        kind: ChallengeKind,
        /// Invalid-request error naming what was missing.
        error: SdkError,
    },
}

impl RedirectOutcome {
    /// The order or setup-token id the outcome belongs to.
    #[must_use]
    pub fn reference_id(&self) -> &str {
        match self {
            Self::Success(success) => &success.reference_id,
            Self::Canceled { reference_id, .. } | Self::Failure { reference_id, .. } => {
                reference_id
            }
        }
    }

    /// The kind of challenge the outcome belongs to.
    #[must_use]
    pub const fn kind(&self) -> ChallengeKind {
        match self {
            Self::Success(success) => success.kind,
            Self::Canceled { kind, .. } | Self::Failure { kind, .. } => *kind,
        }
    }
}

/// Why a redirect event produced no outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// Nothing is pending, or the outcome was already delivered.
    NoPendingChallenge,
    /// The deep link is addressed to another scheme.
    SchemeMismatch,
    /// The metadata names a challenge that has since been replaced.
    StaleReference,
}

/// Result of feeding a [`RedirectEvent`] to a [`ResultCorrelator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// The pending challenge was resolved and cleared.
    Delivered(RedirectOutcome),
    /// The event was not for the pending challenge; nothing changed.
    Ignored(IgnoreReason),
}

/// Single-slot holder of the pending challenge.
#[derive(Debug, Default)]
pub struct ResultCorrelator {
    slot: Mutex<Option<PendingChallenge>>,
}

impl ResultCorrelator {
    /// Creates an idle correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `challenge` as pending and returns the challenge it replaced.
    pub fn begin(&self, challenge: PendingChallenge) -> Option<PendingChallenge> {
        let replaced = self.lock().replace(challenge);
        #[cfg(feature = "telemetry")]
        if let Some(old) = &replaced {
            tracing::debug!(
                reference_id = %old.reference_id,
                kind = %old.kind,
                "Pending challenge replaced"
            );
        }
        replaced
    }

    /// Clears the pending challenge if it belongs to `reference_id`.
    ///
    /// Returns whether anything was cleared.
    pub fn discard(&self, reference_id: &str) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|p| p.reference_id == reference_id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Clears and returns the pending challenge without producing an outcome.
    pub fn cancel(&self) -> Option<PendingChallenge> {
        self.lock().take()
    }

    /// Returns a copy of the pending challenge.
    #[must_use]
    pub fn pending(&self) -> Option<PendingChallenge> {
        self.lock().clone()
    }

    /// Resolves the pending challenge against `event`.
    ///
    /// The slot is read and, on delivery, cleared under one lock, so two
    /// concurrent calls can never both deliver.
    pub fn complete(&self, event: &RedirectEvent) -> Correlation {
        let mut slot = self.lock();
        let Some(pending) = slot.as_ref() else {
            return Correlation::Ignored(IgnoreReason::NoPendingChallenge);
        };
        let correlation = correlate(pending, event);
        if matches!(correlation, Correlation::Delivered(_)) {
            *slot = None;
        }
        drop(slot);

        #[cfg(feature = "telemetry")]
        match &correlation {
            Correlation::Delivered(outcome) => tracing::info!(
                reference_id = %outcome.reference_id(),
                kind = %outcome.kind(),
                "Challenge resolved"
            ),
            Correlation::Ignored(reason) => {
                tracing::debug!(?reason, "Redirect event ignored");
            }
        }
        correlation
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingChallenge>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn correlate(pending: &PendingChallenge, event: &RedirectEvent) -> Correlation {
    let Some(raw_link) = event.deep_link.as_deref() else {
        return Correlation::Delivered(RedirectOutcome::Canceled {
            reference_id: pending.reference_id.clone(),
            kind: pending.kind,
        });
    };
    let Ok(deep_link) = Url::parse(raw_link) else {
        return failure(pending, format!("Malformed deep link {raw_link:?}"));
    };
    if !deep_link.scheme().eq_ignore_ascii_case(&pending.return_scheme) {
        return Correlation::Ignored(IgnoreReason::SchemeMismatch);
    }

    let key = pending.reference.metadata_key();
    let Some(metadata) = &event.metadata else {
        return failure(pending, format!("Redirect is missing metadata field {key}"));
    };
    let reference_id = match metadata.get(key).map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => return failure(pending, format!("Redirect metadata is missing {key}")),
    };
    if reference_id != pending.reference_id {
        return Correlation::Ignored(IgnoreReason::StaleReference);
    }

    let outcome = match pending.kind {
        ChallengeKind::Checkout => checkout_outcome(pending, deep_link),
        ChallengeKind::Vault => vault_outcome(pending, deep_link),
        ChallengeKind::ThreeDSecure => {
            let payer_id = query_param(&deep_link, PAYER_ID_PARAM);
            success(pending, deep_link, payer_id, None)
        }
    };
    Correlation::Delivered(outcome)
}

fn checkout_outcome(pending: &PendingChallenge, deep_link: Url) -> RedirectOutcome {
    if query_param(&deep_link, OP_TYPE_PARAM).as_deref() == Some("cancel") {
        return canceled(pending);
    }
    match query_param(&deep_link, PAYER_ID_PARAM) {
        Some(payer_id) => success(pending, deep_link, Some(payer_id), None),
        None => failure_outcome(pending, format!("Deep link is missing {PAYER_ID_PARAM}")),
    }
}

fn vault_outcome(pending: &PendingChallenge, deep_link: Url) -> RedirectOutcome {
    if deep_link.path().contains("cancel") {
        return canceled(pending);
    }
    match query_param(&deep_link, APPROVAL_SESSION_ID_PARAM) {
        Some(session) => success(pending, deep_link, None, Some(session)),
        None => failure_outcome(
            pending,
            format!("Deep link is missing {APPROVAL_SESSION_ID_PARAM}"),
        ),
    }
}

/// First non-blank value of `name`.
fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn success(
    pending: &PendingChallenge,
    deep_link: Url,
    payer_id: Option<String>,
    approval_session_id: Option<String>,
) -> RedirectOutcome {
    RedirectOutcome::Success(ChallengeSuccess {
        reference_id: pending.reference_id.clone(),
        kind: pending.kind,
        payer_id,
        approval_session_id,
        deep_link,
    })
}

fn canceled(pending: &PendingChallenge) -> RedirectOutcome {
    RedirectOutcome::Canceled {
        reference_id: pending.reference_id.clone(),
        kind: pending.kind,
    }
}

fn failure_outcome(pending: &PendingChallenge, description: String) -> RedirectOutcome {
    RedirectOutcome::Failure {
        reference_id: pending.reference_id.clone(),
        kind: pending.kind,
        error: SdkError::invalid_request(None)
            .with_description(description)
            .with_domain(ErrorDomain::Challenge),
    }
}

fn failure(pending: &PendingChallenge, description: String) -> Correlation {
    Correlation::Delivered(failure_outcome(pending, description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::challenge::{
        CheckoutRequest, PayPalVaultRequest, checkout_destination, three_d_secure_destination,
        vault_destination,
    };
    use std::sync::Arc;

    const SCHEME: &str = "com.example.app";

    fn web() -> Url {
        Url::parse("https://www.sandbox.paypal.com/").unwrap()
    }

    fn checkout(order_id: &str) -> PendingChallenge {
        let destination =
            checkout_destination(&web(), SCHEME, &CheckoutRequest::new(order_id)).unwrap();
        PendingChallenge::for_destination(&destination)
    }

    fn order_metadata(order_id: &str) -> ChallengeMetadata {
        ChallengeMetadata::new(ReferenceKind::Order, order_id)
    }

    fn checkout_link(query: &str) -> String {
        format!("{SCHEME}://x-callback-url/paypal-sdk/paypal-checkout?{query}")
    }

    #[test]
    fn test_payer_id_yields_single_success() {
        let correlator = ResultCorrelator::new();
        correlator.begin(checkout("O-1"));

        let event = RedirectEvent::deep_link(
            checkout_link("opType=payment&token=O-1&PayerID=xyz"),
            order_metadata("O-1"),
        );
        let Correlation::Delivered(RedirectOutcome::Success(success)) = correlator.complete(&event)
        else {
            panic!("expected success");
        };
        assert_eq!(success.reference_id, "O-1");
        assert_eq!(success.payer_id.as_deref(), Some("xyz"));
        assert_eq!(success.kind, ChallengeKind::Checkout);

        assert_eq!(
            correlator.complete(&event),
            Correlation::Ignored(IgnoreReason::NoPendingChallenge)
        );
        assert_eq!(correlator.pending(), None);
    }

    #[test]
    fn test_resume_without_deep_link_cancels_once() {
        let correlator = ResultCorrelator::new();
        correlator.begin(checkout("O-1"));

        assert_eq!(
            correlator.complete(&RedirectEvent::resumed()),
            Correlation::Delivered(RedirectOutcome::Canceled {
                reference_id: "O-1".into(),
                kind: ChallengeKind::Checkout,
            })
        );
        assert_eq!(
            correlator.complete(&RedirectEvent::resumed()),
            Correlation::Ignored(IgnoreReason::NoPendingChallenge)
        );
    }

    #[test]
    fn test_checkout_cancel_marker() {
        let correlator = ResultCorrelator::new();
        correlator.begin(checkout("O-1"));
        let event = RedirectEvent::deep_link(
            checkout_link("opType=cancel&token=O-1"),
            order_metadata("O-1"),
        );
        assert!(matches!(
            correlator.complete(&event),
            Correlation::Delivered(RedirectOutcome::Canceled { .. })
        ));
    }

    #[test]
    fn test_missing_payer_id_is_failure() {
        let correlator = ResultCorrelator::new();
        correlator.begin(checkout("O-1"));
        let event =
            RedirectEvent::deep_link(checkout_link("token=O-1&PayerID="), order_metadata("O-1"));
        let Correlation::Delivered(RedirectOutcome::Failure { error, .. }) =
            correlator.complete(&event)
        else {
            panic!("expected failure");
        };
        assert_eq!(error.kind, ErrorKind::InvalidRequest);
        assert!(error.description.contains("PayerID"));
    }

    #[test]
    fn test_missing_metadata_names_field() {
        let correlator = ResultCorrelator::new();
        correlator.begin(checkout("O-1"));
        let event = RedirectEvent {
            deep_link: Some(checkout_link("PayerID=xyz")),
            metadata: None,
        };
        let Correlation::Delivered(RedirectOutcome::Failure { error, .. }) =
            correlator.complete(&event)
        else {
            panic!("expected failure");
        };
        assert_eq!(error.kind, ErrorKind::InvalidRequest);
        assert!(error.description.contains("order_id"));

        correlator.begin(checkout("O-2"));
        let event = RedirectEvent::deep_link(
            checkout_link("PayerID=xyz"),
            ChallengeMetadata::new(ReferenceKind::Order, "  "),
        );
        assert!(matches!(
            correlator.complete(&event),
            Correlation::Delivered(RedirectOutcome::Failure { .. })
        ));
    }

    #[test]
    fn test_new_challenge_makes_old_callback_stale() {
        let correlator = ResultCorrelator::new();
        correlator.begin(checkout("OLD"));
        let replaced = correlator.begin(checkout("NEW"));
        assert_eq!(replaced.map(|p| p.reference_id).as_deref(), Some("OLD"));

        let late = RedirectEvent::deep_link(checkout_link("PayerID=xyz"), order_metadata("OLD"));
        assert_eq!(
            correlator.complete(&late),
            Correlation::Ignored(IgnoreReason::StaleReference)
        );
        assert_eq!(
            correlator.pending().map(|p| p.reference_id).as_deref(),
            Some("NEW")
        );

        let current = RedirectEvent::deep_link(checkout_link("PayerID=abc"), order_metadata("NEW"));
        assert!(matches!(
            correlator.complete(&current),
            Correlation::Delivered(RedirectOutcome::Success(_))
        ));
    }

    #[test]
    fn test_foreign_scheme_is_ignored() {
        let correlator = ResultCorrelator::new();
        correlator.begin(checkout("O-1"));
        let event = RedirectEvent::deep_link(
            "other.app://x-callback-url/paypal-sdk/paypal-checkout?PayerID=xyz",
            order_metadata("O-1"),
        );
        assert_eq!(
            correlator.complete(&event),
            Correlation::Ignored(IgnoreReason::SchemeMismatch)
        );
        assert!(correlator.pending().is_some());

        let upper = RedirectEvent::deep_link(
            "COM.EXAMPLE.APP://x-callback-url/paypal-sdk/paypal-checkout?PayerID=xyz",
            order_metadata("O-1"),
        );
        assert!(matches!(
            correlator.complete(&upper),
            Correlation::Delivered(RedirectOutcome::Success(_))
        ));
    }

    #[test]
    fn test_vault_outcomes() {
        let destination =
            vault_destination(&web(), SCHEME, &PayPalVaultRequest::new("TOKEN-1")).unwrap();
        let metadata = destination.metadata.clone();
        let correlator = ResultCorrelator::new();

        correlator.begin(PendingChallenge::for_destination(&destination));
        let event = RedirectEvent::deep_link(
            format!("{SCHEME}://vault/success?approval_session_id=TOKEN-1"),
            metadata.clone(),
        );
        let Correlation::Delivered(RedirectOutcome::Success(success)) = correlator.complete(&event)
        else {
            panic!("expected success");
        };
        assert_eq!(success.approval_session_id.as_deref(), Some("TOKEN-1"));

        correlator.begin(PendingChallenge::for_destination(&destination));
        let event = RedirectEvent::deep_link(format!("{SCHEME}://vault/cancel"), metadata);
        assert_eq!(
            correlator.complete(&event),
            Correlation::Delivered(RedirectOutcome::Canceled {
                reference_id: "TOKEN-1".into(),
                kind: ChallengeKind::Vault,
            })
        );
    }

    #[test]
    fn test_three_d_secure_return_is_success() {
        let destination = three_d_secure_destination(
            "https://www.sandbox.paypal.com/webapps/helios?flow=3ds",
            SCHEME,
            ReferenceKind::Order,
            "O-9",
        )
        .unwrap();
        let correlator = ResultCorrelator::new();
        correlator.begin(PendingChallenge::for_destination(&destination));

        let event = RedirectEvent::deep_link(
            format!("{SCHEME}://x-callback-url/paypal-sdk/card-contingency?state=done"),
            destination.metadata,
        );
        let Correlation::Delivered(RedirectOutcome::Success(success)) = correlator.complete(&event)
        else {
            panic!("expected success");
        };
        assert_eq!(success.kind, ChallengeKind::ThreeDSecure);
        assert_eq!(success.payer_id, None);
    }

    #[test]
    fn test_instance_state_roundtrip_restores_correlation() {
        let pending = checkout("O-1");
        let state = pending.to_instance_state().unwrap();
        let restored = PendingChallenge::from_instance_state(&state).unwrap();
        assert_eq!(restored, pending);

        let correlator = ResultCorrelator::new();
        correlator.begin(restored);
        let event = RedirectEvent::deep_link(checkout_link("PayerID=xyz"), order_metadata("O-1"));
        assert!(matches!(
            correlator.complete(&event),
            Correlation::Delivered(RedirectOutcome::Success(_))
        ));
    }

    #[test]
    fn test_invalid_instance_state() {
        let err = PendingChallenge::from_instance_state("not base64!").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert_eq!(err.domain, ErrorDomain::Challenge);
        assert!(PendingChallenge::from_instance_state(&b64.encode("{}")).is_err());
    }

    #[test]
    fn test_discard_only_matching_reference() {
        let correlator = ResultCorrelator::new();
        correlator.begin(checkout("O-1"));
        assert!(!correlator.discard("O-2"));
        assert!(correlator.discard("O-1"));
        assert_eq!(correlator.pending(), None);
    }

    #[test]
    fn test_concurrent_completion_delivers_once() {
        let correlator = Arc::new(ResultCorrelator::new());
        correlator.begin(checkout("O-1"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let correlator = Arc::clone(&correlator);
                std::thread::spawn(move || {
                    let event = RedirectEvent::deep_link(
                        checkout_link("PayerID=xyz"),
                        order_metadata("O-1"),
                    );
                    matches!(correlator.complete(&event), Correlation::Delivered(_))
                })
            })
            .collect();
        let delivered = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|delivered| *delivered)
            .count();
        assert_eq!(delivered, 1);
    }
}
