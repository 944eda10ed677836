//! The payment client façade.
//!
//! [`PaymentClient`] sequences request building, transport and response
//! parsing for each operation. Results that are known after one round trip
//! (`Confirmed`, `Failed`) are returned directly. When the payer must act on
//! an external surface, the client records a pending challenge, hands the
//! destination to its [`ChallengeLauncher`] and returns `ChallengeRequired`
//! without waiting. The eventual outcome arrives when the host application
//! calls [`PaymentClient::deliver_redirect_result`], and is passed to the
//! registered [`RedirectListener`].
//!
//! One client serves card confirmations, card vaulting, hosted checkout and
//! PayPal vaulting; the launcher and return scheme are the only
//! per-application parts.

use std::fmt;
use std::sync::Arc;

use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::card::{CardRequest, CardVaultRequest};
use crate::challenge::{
    ChallengeDestination, ChallengeLauncher, CheckoutRequest, PayPalVaultRequest, ReferenceKind,
    checkout_destination, three_d_secure_destination, vault_destination,
};
use crate::config::CoreConfig;
use crate::correlator::{
    Correlation, IgnoreReason, PendingChallenge, RedirectEvent, ResultCorrelator,
};
use crate::error::{ErrorDomain, SdkError};
use crate::listener::{Dispatch, ListenerSlot, RedirectListener};
use crate::request::{RequestBuilder, WireRequest};
use crate::response::{
    self, ConfirmationResult, OrderInfo, VaultResult, parse_confirm_payment_source,
    parse_update_setup_token,
};
use crate::transport::{RawResponse, Transport};

/// What happened to a redirect handed to
/// [`PaymentClient::deliver_redirect_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// The outcome was passed to the registered listener.
    Notified,
    /// No listener is registered; the outcome waits for the next one.
    Held,
    /// The redirect did not resolve the pending challenge.
    Ignored(IgnoreReason),
}

/// Entry point for confirming payment sources.
///
/// `T` executes HTTP requests; `L` opens external challenge pages. The
/// client is `Sync`: confirmations for different orders may run
/// concurrently over one transport, while the pending challenge is shared
/// and last writer wins.
pub struct PaymentClient<T, L> {
    config: CoreConfig,
    requests: RequestBuilder,
    web_base: Url,
    transport: T,
    launcher: L,
    correlator: ResultCorrelator,
    listeners: ListenerSlot,
}

impl<T, L> fmt::Debug for PaymentClient<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentClient")
            .field("config", &self.config)
            .field("web_base", &self.web_base.as_str())
            .field("pending", &self.correlator.pending())
            .finish_non_exhaustive()
    }
}

impl<T, L> PaymentClient<T, L>
where
    T: Transport,
    L: ChallengeLauncher,
{
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the configuration cannot produce
    /// valid request headers.
    pub fn new(config: CoreConfig, transport: T, launcher: L) -> Result<Self, SdkError> {
        let requests = RequestBuilder::new(&config)?;
        let web_base = config.environment.web_base();
        Ok(Self {
            config,
            requests,
            web_base,
            transport,
            launcher,
            correlator: ResultCorrelator::new(),
            listeners: ListenerSlot::new(),
        })
    }

    /// Overrides the web base URL used for hosted checkout pages.
    #[must_use]
    pub fn with_web_base(mut self, web_base: Url) -> Self {
        self.web_base = web_base;
        self
    }

    /// Returns the client configuration.
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Returns the transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Confirms a card as the payment source of an order.
    ///
    /// Any pending challenge is discarded first. When the server asks for
    /// payer action, the 3-D Secure page is launched and
    /// [`ConfirmationResult::ChallengeRequired`] is returned; the outcome is
    /// delivered later through [`Self::deliver_redirect_result`].
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "confirmkit.confirm_order",
            skip_all,
            fields(reference_id = %request.order_id)
        )
    )]
    pub async fn confirm_order(&self, request: &CardRequest) -> ConfirmationResult {
        self.invalidate_pending();

        let response = match self.requests.confirm_payment_source(request) {
            Ok(wire) => self.send(&wire, ErrorDomain::Card).await,
            Err(error) => Err(error),
        };
        let result = match response {
            Ok(response) => parse_confirm_payment_source(&response),
            Err(error) => return ConfirmationResult::Failed { error },
        };

        let result = match result {
            ConfirmationResult::ChallengeRequired {
                reference_id,
                challenge_uri,
            } => {
                let launched = three_d_secure_destination(
                    &challenge_uri,
                    &self.config.return_url_scheme,
                    ReferenceKind::Order,
                    &reference_id,
                )
                .and_then(|destination| self.begin_challenge(destination));
                match launched {
                    Ok(_) => ConfirmationResult::ChallengeRequired {
                        reference_id,
                        challenge_uri,
                    },
                    Err(error) => ConfirmationResult::Failed { error },
                }
            }
            ConfirmationResult::Failed { error } => ConfirmationResult::Failed {
                error: in_domain(error, ErrorDomain::Card),
            },
            confirmed @ ConfirmationResult::Confirmed(_) => confirmed,
        };

        #[cfg(feature = "telemetry")]
        match &result {
            ConfirmationResult::Confirmed(order) => {
                tracing::info!(status = %order.status, "Order confirmed");
            }
            ConfirmationResult::ChallengeRequired { .. } => {
                tracing::info!("Order requires payer action");
            }
            ConfirmationResult::Failed { error } => tracing::warn!(
                code = error.code(),
                correlation_id = error.correlation_id.as_deref().unwrap_or_default(),
                "Order confirmation failed: {}",
                error.description
            ),
        }
        result
    }

    /// Attaches a card to a vault setup token.
    ///
    /// Any pending challenge is discarded first. If the issuer requires
    /// authentication, the challenge is launched and
    /// [`VaultResult::ChallengeRequired`] is returned.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "confirmkit.vault_card",
            skip_all,
            fields(reference_id = %request.setup_token_id)
        )
    )]
    pub async fn vault_card(&self, request: &CardVaultRequest) -> VaultResult {
        self.invalidate_pending();

        let response = match self.requests.update_setup_token(request) {
            Ok(wire) => self.send(&wire, ErrorDomain::Card).await,
            Err(error) => Err(error),
        };
        let result = match response {
            Ok(response) => parse_update_setup_token(&response),
            Err(error) => return VaultResult::Failed { error },
        };

        match result {
            VaultResult::ChallengeRequired {
                setup_token_id,
                challenge_uri,
            } => {
                let launched = three_d_secure_destination(
                    &challenge_uri,
                    &self.config.return_url_scheme,
                    ReferenceKind::SetupToken,
                    &setup_token_id,
                )
                .and_then(|destination| self.begin_challenge(destination));
                match launched {
                    Ok(_) => VaultResult::ChallengeRequired {
                        setup_token_id,
                        challenge_uri,
                    },
                    Err(error) => VaultResult::Failed { error },
                }
            }
            VaultResult::Failed { error } => VaultResult::Failed {
                error: in_domain(error, ErrorDomain::Card),
            },
            updated @ VaultResult::Updated { .. } => updated,
        }
    }

    /// Starts a hosted PayPal checkout for an order.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the destination cannot be built,
    /// or a challenge-domain error if the launcher fails. In both cases no
    /// challenge remains pending.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "confirmkit.start_checkout",
            skip_all,
            err,
            fields(reference_id = %request.order_id)
        )
    )]
    pub fn start_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<ChallengeDestination, SdkError> {
        let destination =
            checkout_destination(&self.web_base, &self.config.return_url_scheme, request)?;
        self.begin_challenge(destination)
    }

    /// Starts approval of a PayPal vault setup token.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start_checkout`].
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "confirmkit.start_vault",
            skip_all,
            err,
            fields(reference_id = %request.setup_token_id)
        )
    )]
    pub fn start_vault(
        &self,
        request: &PayPalVaultRequest,
    ) -> Result<ChallengeDestination, SdkError> {
        let destination =
            vault_destination(&self.web_base, &self.config.return_url_scheme, request)?;
        self.begin_challenge(destination)
    }

    /// Fetches an order, typically after a 3-D Secure challenge to learn its
    /// final status.
    ///
    /// # Errors
    ///
    /// Returns the classified error for transport failures, non-2xx
    /// responses and undecodable bodies.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "confirmkit.get_order", skip_all, err, fields(reference_id = %order_id))
    )]
    pub async fn get_order(&self, order_id: &str) -> Result<OrderInfo, SdkError> {
        let wire = self.requests.get_order(order_id)?;
        let response = self.send(&wire, ErrorDomain::Core).await?;
        response::parse_order(&response)
    }

    /// Resolves the pending challenge with a redirect event.
    ///
    /// Call this when the app is opened by a deep link, or resumes without
    /// one while a challenge is pending. The outcome goes to the registered
    /// listener, or is held until one registers.
    pub fn deliver_redirect_result(&self, event: &RedirectEvent) -> Delivery {
        match self.correlator.complete(event) {
            Correlation::Delivered(outcome) => match self.listeners.dispatch(outcome) {
                Dispatch::Notified => Delivery::Notified,
                Dispatch::Held => Delivery::Held,
            },
            Correlation::Ignored(reason) => Delivery::Ignored(reason),
        }
    }

    /// Registers the listener for challenge outcomes, replacing any previous
    /// one.
    ///
    /// Returns `true` if a held outcome was delivered to it.
    pub fn set_listener(&self, listener: impl RedirectListener + 'static) -> bool {
        self.listeners.register(Arc::new(listener)).is_some()
    }

    /// Removes the registered listener.
    pub fn clear_listener(&self) {
        self.listeners.clear();
    }

    /// Returns a copy of the pending challenge.
    pub fn pending_challenge(&self) -> Option<PendingChallenge> {
        self.correlator.pending()
    }

    /// Discards the pending challenge without producing an outcome.
    pub fn cancel_pending(&self) -> Option<PendingChallenge> {
        self.correlator.cancel()
    }

    /// Exports the pending challenge so it can be restored after the
    /// process restarts.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the challenge cannot be encoded.
    pub fn instance_state(&self) -> Result<Option<String>, SdkError> {
        self.correlator
            .pending()
            .map(|pending| pending.to_instance_state())
            .transpose()
    }

    /// Restores a challenge exported by [`Self::instance_state`], replacing
    /// any pending one.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if `state` cannot be decoded.
    pub fn restore(&self, state: &str) -> Result<PendingChallenge, SdkError> {
        let pending = PendingChallenge::from_instance_state(state)?;
        self.correlator.begin(pending.clone());
        Ok(pending)
    }

    fn invalidate_pending(&self) {
        let stale = self.correlator.cancel();
        #[cfg(feature = "telemetry")]
        if let Some(stale) = stale {
            tracing::debug!(
                reference_id = %stale.reference_id,
                "Discarded pending challenge for new attempt"
            );
        }
        #[cfg(not(feature = "telemetry"))]
        drop(stale);
        self.discard_held_outcome();
    }

    fn discard_held_outcome(&self) {
        let held = self.listeners.discard_held();
        #[cfg(feature = "telemetry")]
        if let Some(held) = held {
            tracing::debug!(
                reference_id = %held.reference_id(),
                "Discarded undelivered outcome of a previous attempt"
            );
        }
        #[cfg(not(feature = "telemetry"))]
        drop(held);
    }

    fn begin_challenge(
        &self,
        destination: ChallengeDestination,
    ) -> Result<ChallengeDestination, SdkError> {
        self.discard_held_outcome();
        self.correlator
            .begin(PendingChallenge::for_destination(&destination));
        if let Err(err) = self.launcher.launch(&destination) {
            self.correlator.discard(&destination.reference_id);
            return Err(err.into());
        }
        #[cfg(feature = "telemetry")]
        tracing::info!(
            reference_id = %destination.reference_id,
            kind = %destination.kind,
            "Challenge launched"
        );
        Ok(destination)
    }

    async fn send(&self, wire: &WireRequest, domain: ErrorDomain) -> Result<RawResponse, SdkError> {
        self.transport.send(wire).await.map_err(|err| {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %err, path = %wire.path, "Transport failure");
            in_domain(err.into(), domain)
        })
    }
}

/// Tags core-domain errors with the operation's domain.
fn in_domain(error: SdkError, domain: ErrorDomain) -> SdkError {
    if error.domain == ErrorDomain::Core {
        error.with_domain(domain)
    } else {
        error
    }
}
