//! Command-line driver for confirming payment sources and completing payer
//! challenges.
//!
//! Each invocation prints JSON lines on stdout; logs go to stderr. A pending
//! challenge is kept in the configured state file so that `complete` can run
//! in a later invocation.
//!
//! # Usage
//!
//! ```bash
//! # Confirm a card; prints the challenge URL if the issuer asks for 3-D Secure
//! confirmkit confirm --order-id 5O190127TN364715T \
//!     --number 4111111111111111 --expiry-month 01 --expiry-year 2030 --cvv 123
//!
//! # Hand back the deep link the payer returned with
//! confirmkit complete --deep-link "com.example.confirmkit://x-callback-url/paypal-sdk/card-contingency?state=done"
//!
//! # The payer came back without a deep link
//! confirmkit complete
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: path to the TOML configuration file (default: `confirmkit.toml`)
//! - `PAYPAL_CLIENT_ID`, `PAYPAL_ENVIRONMENT`: override the file values
//! - `RUST_LOG`: log level filter (default: `info`)

mod config;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use confirmkit::card::{Card, CardRequest, CardVaultRequest, Sca, VaultPreference};
use confirmkit::challenge::{
    ChallengeDestination, ChallengeLauncher, CheckoutRequest, FundingSource, LaunchError,
    PayPalVaultRequest,
};
use confirmkit::correlator::{RedirectEvent, RedirectOutcome};
use confirmkit::response::{ConfirmationResult, OrderInfo, VaultResult};
use confirmkit::{Delivery, PaymentClient};
use confirmkit_http::ReqwestTransport;
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::config::{CliConfig, DEFAULT_CONFIG_PATH};

type Client = PaymentClient<ReqwestTransport, PrintLauncher>;

#[derive(Debug, Parser)]
#[command(name = "confirmkit", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Confirm a card as the payment source of an order.
    Confirm {
        /// Order id.
        #[arg(long)]
        order_id: String,
        #[command(flatten)]
        card: CardArgs,
        /// 3-D Secure verification policy.
        #[arg(long, value_enum)]
        sca: Option<ScaArg>,
        /// Return URL after the challenge (default: the card-contingency deep link).
        #[arg(long)]
        return_url: Option<String>,
        /// Vault the card when the order succeeds.
        #[arg(long)]
        vault: bool,
        /// Customer to vault the card for.
        #[arg(long, requires = "vault")]
        customer_id: Option<String>,
    },
    /// Start a hosted PayPal checkout for an order.
    Checkout {
        /// Order id.
        order_id: String,
        /// Funding source to preselect.
        #[arg(long, value_enum)]
        funding_source: Option<FundingArg>,
    },
    /// Start approval of a PayPal vault setup token.
    Vault {
        /// Setup-token id.
        setup_token_id: String,
    },
    /// Attach a card to a vault setup token.
    VaultCard {
        /// Setup-token id.
        setup_token_id: String,
        #[command(flatten)]
        card: CardArgs,
    },
    /// Resolve the pending challenge.
    Complete {
        /// Deep link the app was opened with; omit if the payer came back without one.
        #[arg(long)]
        deep_link: Option<String>,
    },
    /// Fetch an order.
    Order {
        /// Order id.
        order_id: String,
    },
    /// Discard the pending challenge.
    Cancel,
}

#[derive(Debug, Args)]
struct CardArgs {
    /// Card number.
    #[arg(long)]
    number: String,
    /// Expiry month (`1`-`12`).
    #[arg(long)]
    expiry_month: String,
    /// Expiry year (`YYYY` or `YY`).
    #[arg(long)]
    expiry_year: String,
    /// Security code.
    #[arg(long)]
    cvv: Option<String>,
    /// Cardholder name.
    #[arg(long)]
    name: Option<String>,
}

impl CardArgs {
    fn into_card(self) -> Card {
        let mut card = Card::new(self.number, self.expiry_month, self.expiry_year);
        if let Some(cvv) = self.cvv {
            card = card.with_security_code(cvv);
        }
        match self.name {
            Some(name) => card.with_cardholder_name(name),
            None => card,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScaArg {
    Always,
    WhenRequired,
}

impl From<ScaArg> for Sca {
    fn from(value: ScaArg) -> Self {
        match value {
            ScaArg::Always => Self::Always,
            ScaArg::WhenRequired => Self::WhenRequired,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FundingArg {
    Paypal,
    Credit,
    Paylater,
}

impl From<FundingArg> for FundingSource {
    fn from(value: FundingArg) -> Self {
        match value {
            FundingArg::Paypal => Self::PayPal,
            FundingArg::Credit => Self::Credit,
            FundingArg::Paylater => Self::PayLater,
        }
    }
}

/// Prints the challenge URL for the operator to open.
#[derive(Debug, Clone, Copy)]
struct PrintLauncher;

impl ChallengeLauncher for PrintLauncher {
    fn launch(&self, destination: &ChallengeDestination) -> Result<(), LaunchError> {
        emit(&json!({
            "event": "challenge",
            "kind": destination.kind.as_str(),
            "reference_id": destination.reference_id,
            "url": destination.uri.as_str(),
        }));
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("confirmkit failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = CliConfig::load_from(&cli.config)?;
    tracing::info!(
        path = %cli.config.display(),
        environment = %config.environment,
        "Loaded configuration"
    );

    let mut transport = match &config.api_url {
        Some(url) => ReqwestTransport::try_from(url.as_str())?,
        None => ReqwestTransport::for_environment(config.environment)?,
    }
    .with_timeout(config.timeout());
    if let Some(url) = &config.graphql_url {
        transport = transport.with_graphql_url(Url::parse(url)?);
    }
    let client = PaymentClient::new(config.core_config(), transport, PrintLauncher)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<RedirectOutcome>();
    client.set_listener(tx);
    restore_state(&client, &config.state_file)?;

    let result = execute(&client, cli.command, &mut rx).await;
    save_state(&client, &config.state_file)?;
    result
}

async fn execute(
    client: &Client,
    command: Command,
    outcomes: &mut UnboundedReceiver<RedirectOutcome>,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Confirm {
            order_id,
            card,
            sca,
            return_url,
            vault,
            customer_id,
        } => {
            let mut request = CardRequest::new(order_id, card.into_card());
            if let Some(sca) = sca {
                request = request.with_sca(sca.into());
            }
            if let Some(url) = return_url {
                request = request.with_return_url(url);
            }
            if vault {
                let vault = customer_id
                    .map_or_else(VaultPreference::default, VaultPreference::for_customer);
                request = request.with_vault(vault);
            }
            match client.confirm_order(&request).await {
                ConfirmationResult::Confirmed(order) => emit(&order_json(&order)),
                ConfirmationResult::ChallengeRequired { reference_id, .. } => {
                    emit(&json!({ "event": "challenge_required", "reference_id": reference_id }));
                }
                ConfirmationResult::Failed { error } => return Err(error.into()),
            }
        }
        Command::Checkout {
            order_id,
            funding_source,
        } => {
            let mut request = CheckoutRequest::new(order_id);
            if let Some(funding) = funding_source {
                request = request.with_funding_source(funding.into());
            }
            client.start_checkout(&request)?;
        }
        Command::Vault { setup_token_id } => {
            client.start_vault(&PayPalVaultRequest::new(setup_token_id))?;
        }
        Command::VaultCard {
            setup_token_id,
            card,
        } => {
            let request = CardVaultRequest::new(setup_token_id, card.into_card());
            match client.vault_card(&request).await {
                VaultResult::Updated {
                    setup_token_id,
                    status,
                } => emit(&json!({
                    "event": "setup_token_updated",
                    "setup_token_id": setup_token_id,
                    "status": status,
                })),
                VaultResult::ChallengeRequired { setup_token_id, .. } => {
                    emit(&json!({ "event": "challenge_required", "reference_id": setup_token_id }));
                }
                VaultResult::Failed { error } => return Err(error.into()),
            }
        }
        Command::Complete { deep_link } => {
            // The host app persists the metadata it launched with.
            let event = RedirectEvent {
                deep_link,
                metadata: client.pending_challenge().map(|pending| pending.metadata),
            };
            if let Delivery::Ignored(reason) = client.deliver_redirect_result(&event) {
                emit(&json!({ "event": "ignored", "reason": format!("{reason:?}") }));
            }
            while let Ok(outcome) = outcomes.try_recv() {
                emit(&outcome_json(&outcome));
            }
        }
        Command::Order { order_id } => {
            emit(&order_json(&client.get_order(&order_id).await?));
        }
        Command::Cancel => {
            let discarded = client.cancel_pending();
            emit(&json!({
                "event": "pending_discarded",
                "reference_id": discarded.map(|pending| pending.reference_id),
            }));
        }
    }
    Ok(())
}

fn restore_state(client: &Client, path: &Path) -> Result<(), Box<dyn Error>> {
    if !path.exists() {
        return Ok(());
    }
    let state = std::fs::read_to_string(path)?;
    if state.trim().is_empty() {
        return Ok(());
    }
    let pending = client.restore(&state)?;
    tracing::debug!(
        reference_id = %pending.reference_id,
        kind = %pending.kind,
        age_secs = pending.created_at.seconds_until(confirmkit::timestamp::UnixTimestamp::now()),
        "Restored pending challenge"
    );
    Ok(())
}

fn save_state(client: &Client, path: &Path) -> Result<(), Box<dyn Error>> {
    match client.instance_state()? {
        Some(state) => std::fs::write(path, state)?,
        None if path.exists() => std::fs::remove_file(path)?,
        None => {}
    }
    Ok(())
}

fn order_json(order: &OrderInfo) -> Value {
    json!({
        "event": "order",
        "id": order.reference_id,
        "status": order.status.as_str(),
        "last4": order.last4,
        "brand": order.brand,
        "card_type": order.card_type,
    })
}

fn outcome_json(outcome: &RedirectOutcome) -> Value {
    match outcome {
        RedirectOutcome::Success(success) => json!({
            "event": "challenge_success",
            "reference_id": success.reference_id,
            "kind": success.kind.as_str(),
            "payer_id": success.payer_id,
            "approval_session_id": success.approval_session_id,
            "deep_link": success.deep_link.as_str(),
        }),
        RedirectOutcome::Canceled { reference_id, kind } => json!({
            "event": "challenge_canceled",
            "reference_id": reference_id,
            "kind": kind.as_str(),
        }),
        RedirectOutcome::Failure {
            reference_id,
            kind,
            error,
        } => json!({
            "event": "challenge_failed",
            "reference_id": reference_id,
            "kind": kind.as_str(),
            "error": error.to_string(),
        }),
    }
}

#[allow(clippy::print_stdout)]
fn emit(value: &Value) {
    println!("{value}");
}
