//! Card payment sources and the requests that carry them.
//!
//! [`Card`] holds the raw values the payer entered. Normalisation (whitespace
//! stripping, `YYYY-MM` expiry) happens when a request is serialised, so the
//! caller's values are never mutated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorDomain, SdkError};

/// Strong customer authentication preference for a card confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Sca {
    /// Always challenge the payer.
    #[serde(rename = "SCA_ALWAYS")]
    Always,
    /// Challenge only when the issuer requires it.
    #[default]
    #[serde(rename = "SCA_WHEN_REQUIRED")]
    WhenRequired,
}

impl Sca {
    /// Returns the canonical wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "SCA_ALWAYS",
            Self::WhenRequired => "SCA_WHEN_REQUIRED",
        }
    }
}

impl fmt::Display for Sca {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing address attached to a card.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// First street line.
    pub street_address: Option<String>,
    /// Second street line.
    pub extended_address: Option<String>,
    /// City or town.
    pub locality: Option<String>,
    /// State, province or region.
    pub region: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Two-letter ISO 3166-1 country code.
    pub country_code: String,
}

impl Address {
    /// Creates an address with only a country code.
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            ..Self::default()
        }
    }

    /// Sets the first street line.
    #[must_use]
    pub fn with_street_address(mut self, value: impl Into<String>) -> Self {
        self.street_address = Some(value.into());
        self
    }

    /// Sets the second street line.
    #[must_use]
    pub fn with_extended_address(mut self, value: impl Into<String>) -> Self {
        self.extended_address = Some(value.into());
        self
    }

    /// Sets the city or town.
    #[must_use]
    pub fn with_locality(mut self, value: impl Into<String>) -> Self {
        self.locality = Some(value.into());
        self
    }

    /// Sets the state, province or region.
    #[must_use]
    pub fn with_region(mut self, value: impl Into<String>) -> Self {
        self.region = Some(value.into());
        self
    }

    /// Sets the postal code.
    #[must_use]
    pub fn with_postal_code(mut self, value: impl Into<String>) -> Self {
        self.postal_code = Some(value.into());
        self
    }
}

/// A payment card as entered by the payer.
#[derive(Clone, PartialEq, Eq)]
pub struct Card {
    /// Primary account number, possibly containing spaces.
    pub number: String,
    /// Expiration month, `1`-`12`, with or without a leading zero.
    pub expiration_month: String,
    /// Expiration year, two or four digits.
    pub expiration_year: String,
    /// Card verification value, if the payer entered one.
    pub security_code: Option<String>,
    /// Name printed on the card.
    pub cardholder_name: Option<String>,
    /// Billing address.
    pub billing_address: Option<Address>,
}

impl Card {
    /// Creates a card without a security code, cardholder name or billing
    /// address.
    pub fn new(
        number: impl Into<String>,
        expiration_month: impl Into<String>,
        expiration_year: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            expiration_month: expiration_month.into(),
            expiration_year: expiration_year.into(),
            security_code: None,
            cardholder_name: None,
            billing_address: None,
        }
    }

    /// Sets the card verification value.
    #[must_use]
    pub fn with_security_code(mut self, security_code: impl Into<String>) -> Self {
        self.security_code = Some(security_code.into());
        self
    }

    /// Sets the cardholder name.
    #[must_use]
    pub fn with_cardholder_name(mut self, name: impl Into<String>) -> Self {
        self.cardholder_name = Some(name.into());
        self
    }

    /// Sets the billing address.
    #[must_use]
    pub fn with_billing_address(mut self, address: Address) -> Self {
        self.billing_address = Some(address);
        self
    }

    /// Returns the card number with all whitespace removed.
    #[must_use]
    pub fn normalized_number(&self) -> String {
        self.number.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Returns the expiry as `YYYY-MM`.
    ///
    /// Two-digit years are read as `20YY`.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidRequest`](crate::ErrorKind::InvalidRequest)
    /// error if the month is not `1`-`12` or the year is not two or four digits.
    pub fn expiry(&self) -> Result<String, SdkError> {
        let month = self.expiration_month.trim();
        let year = self.expiration_year.trim();

        let month_value = month
            .parse::<u8>()
            .ok()
            .filter(|m| (1..=12).contains(m) && month.len() <= 2)
            .ok_or_else(|| invalid_card(format!("Invalid card expiration month: {month:?}")))?;

        if !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid_card(format!("Invalid card expiration year: {year:?}")));
        }
        let year = match year.len() {
            2 => format!("20{year}"),
            4 => year.to_owned(),
            _ => return Err(invalid_card(format!("Invalid card expiration year: {year:?}"))),
        };

        Ok(format!("{year}-{month_value:02}"))
    }
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let number = self.normalized_number();
        let last4 = number.get(number.len().saturating_sub(4)..).unwrap_or_default();
        f.debug_struct("Card")
            .field("number", &format_args!("****{last4}"))
            .field("expiration_month", &self.expiration_month)
            .field("expiration_year", &self.expiration_year)
            .field("security_code", &self.security_code.as_ref().map(|_| "***"))
            .field("cardholder_name", &self.cardholder_name)
            .field("billing_address", &self.billing_address)
            .finish()
    }
}

fn invalid_card(description: String) -> SdkError {
    SdkError::invalid_request(None)
        .with_description(description)
        .with_domain(ErrorDomain::Card)
}

/// Request to confirm a card as the payment source of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRequest {
    /// Server-assigned order id.
    pub order_id: String,
    /// Card to attach.
    pub card: Card,
    /// Authentication preference; omitted from the body when `None`.
    pub sca: Option<Sca>,
    /// Return URL for a contingency; defaults to the client's return scheme.
    pub return_url: Option<String>,
    /// Vault the card on success.
    pub vault: Option<VaultPreference>,
}

impl CardRequest {
    /// Creates a request with no authentication preference.
    pub fn new(order_id: impl Into<String>, card: Card) -> Self {
        Self {
            order_id: order_id.into(),
            card,
            sca: None,
            return_url: None,
            vault: None,
        }
    }

    /// Sets the authentication preference.
    #[must_use]
    pub const fn with_sca(mut self, sca: Sca) -> Self {
        self.sca = Some(sca);
        self
    }

    /// Overrides the contingency return URL.
    #[must_use]
    pub fn with_return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    /// Stores the card in the vault when the confirmation succeeds.
    #[must_use]
    pub fn with_vault(mut self, preference: VaultPreference) -> Self {
        self.vault = Some(preference);
        self
    }
}

/// Vault-on-success options for a card confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VaultPreference {
    /// Existing customer to attach the vaulted card to.
    pub customer_id: Option<String>,
}

impl VaultPreference {
    /// Vaults for a known customer.
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: Some(customer_id.into()),
        }
    }
}

/// Request to attach a card to a vault setup token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardVaultRequest {
    /// Server-assigned setup-token id.
    pub setup_token_id: String,
    /// Card to attach.
    pub card: Card,
}

impl CardVaultRequest {
    /// Creates a vault request.
    pub fn new(setup_token_id: impl Into<String>, card: Card) -> Self {
        Self {
            setup_token_id: setup_token_id.into(),
            card,
        }
    }
}
