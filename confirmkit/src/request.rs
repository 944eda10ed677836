//! Wire-level request construction.
//!
//! [`RequestBuilder`] turns domain requests into [`WireRequest`]s: a method,
//! a path relative to an [`Endpoint`], headers and a JSON body. Building is
//! pure; the same input always yields the same request, and absent optional
//! fields are omitted from the body rather than sent as `null`.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use http::header::{ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use serde::Serialize;

use crate::card::{Address, Card, CardRequest, CardVaultRequest, Sca};
use crate::config::CoreConfig;
use crate::constants::{
    CARD_RETURN_PATH, CONFIRM_PAYMENT_SOURCE_PATH, GRAPHQL_PATH, ORDER_PATH,
};
use crate::error::{ErrorDomain, SdkError};

/// Base URL a request path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The REST API host.
    Rest,
    /// The GraphQL endpoint on the web host.
    GraphQl,
}

/// A fully built HTTP request, independent of any HTTP library.
#[derive(Clone, PartialEq, Eq)]
pub struct WireRequest {
    /// Which base URL `path` is relative to.
    pub endpoint: Endpoint,
    /// HTTP method.
    pub method: Method,
    /// Path without a leading slash.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// JSON body.
    pub body: Option<String>,
}

impl fmt::Debug for WireRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireRequest")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(String::len))
            .finish()
    }
}

/// Builds [`WireRequest`]s for one client configuration.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    client_id: String,
    authorization: HeaderValue,
    language: Option<HeaderValue>,
    default_return_url: String,
}

impl RequestBuilder {
    /// Creates a builder for `config`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the configured language is not a
    /// valid header value.
    pub fn new(config: &CoreConfig) -> Result<Self, SdkError> {
        let credentials = b64.encode(format!("{}:", config.client_id));
        let mut authorization = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|_| SdkError::invalid_request(None))?;
        authorization.set_sensitive(true);

        let language = config
            .language
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| {
                SdkError::invalid_request(None)
                    .with_description("Accept-Language value contains invalid characters")
            })?;

        Ok(Self {
            client_id: config.client_id.clone(),
            authorization,
            language,
            default_return_url: format!("{}://{CARD_RETURN_PATH}", config.return_url_scheme),
        })
    }

    /// Builds `POST v2/checkout/orders/{id}/confirm-payment-source`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the order id is unusable in a
    /// path or the card expiry cannot be normalised.
    pub fn confirm_payment_source(&self, request: &CardRequest) -> Result<WireRequest, SdkError> {
        let order_id = path_segment(&request.order_id, "order_id", ErrorDomain::Card)?;
        let return_url = request
            .return_url
            .as_deref()
            .unwrap_or(&self.default_return_url);

        let vault = request.vault.as_ref();
        let attributes = (request.sca.is_some() || vault.is_some()).then(|| AttributesBody {
            verification: request.sca.map(|method| VerificationBody { method }),
            vault: vault.map(|_| VaultBody {
                store_in_vault: "ON_SUCCESS",
            }),
            customer: vault
                .and_then(|v| v.customer_id.as_deref())
                .map(|id| CustomerBody { id }),
        });

        let body = ConfirmPaymentSourceBody {
            payment_source: PaymentSourceBody {
                card: CardBody::from_card(&request.card, attributes)?,
            },
            application_context: Some(ApplicationContextBody {
                return_url,
                cancel_url: return_url,
            }),
        };

        Ok(WireRequest {
            endpoint: Endpoint::Rest,
            method: Method::POST,
            path: CONFIRM_PAYMENT_SOURCE_PATH.replace("{id}", order_id),
            headers: self.headers(true),
            body: Some(to_json(&body)?),
        })
    }

    /// Builds `GET v2/checkout/orders/{id}`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the order id is unusable in a
    /// path.
    pub fn get_order(&self, order_id: &str) -> Result<WireRequest, SdkError> {
        let order_id = path_segment(order_id, "order_id", ErrorDomain::Core)?;
        Ok(WireRequest {
            endpoint: Endpoint::Rest,
            method: Method::GET,
            path: ORDER_PATH.replace("{id}", order_id),
            headers: self.headers(false),
            body: None,
        })
    }

    /// Builds the `UpdateVaultSetupToken` GraphQL mutation that attaches a
    /// card to a setup token.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error if the setup-token id is blank or the
    /// card expiry cannot be normalised.
    pub fn update_setup_token(&self, request: &CardVaultRequest) -> Result<WireRequest, SdkError> {
        let setup_token_id =
            path_segment(&request.setup_token_id, "setup_token_id", ErrorDomain::Card)?;
        let card = &request.card;
        let body = GraphQlBody {
            query: UPDATE_SETUP_TOKEN_QUERY,
            variables: UpdateSetupTokenVariables {
                client_id: &self.client_id,
                vault_setup_token: setup_token_id,
                payment_source: GraphQlPaymentSource {
                    card: GraphQlCard {
                        number: card.normalized_number(),
                        expiry: card.expiry()?,
                        name: card.cardholder_name.as_deref(),
                        security_code: card.security_code.as_deref(),
                        billing_address: card
                            .billing_address
                            .as_ref()
                            .map(GraphQlAddress::from),
                    },
                },
            },
            operation_name: "UpdateVaultSetupToken",
        };

        Ok(WireRequest {
            endpoint: Endpoint::GraphQl,
            method: Method::POST,
            path: GRAPHQL_PATH.to_owned(),
            headers: self.headers(true),
            body: Some(to_json(&body)?),
        })
    }

    fn headers(&self, json: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.authorization.clone());
        if let Some(language) = &self.language {
            headers.insert(ACCEPT_LANGUAGE, language.clone());
        }
        if json {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers
    }
}

/// Checks that a server-assigned id can be placed in a URL path.
fn path_segment<'a>(id: &'a str, field: &str, domain: ErrorDomain) -> Result<&'a str, SdkError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(SdkError::invalid_request(None)
            .with_description(format!("Invalid {field}: {id:?}"))
            .with_domain(domain))
    }
}

fn to_json<T: Serialize>(body: &T) -> Result<String, SdkError> {
    serde_json::to_string(body).map_err(|e| {
        SdkError::invalid_request(None)
            .with_description(format!("Failed to encode request body: {e}"))
    })
}

#[derive(Serialize)]
struct ConfirmPaymentSourceBody<'a> {
    payment_source: PaymentSourceBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application_context: Option<ApplicationContextBody<'a>>,
}

#[derive(Serialize)]
struct PaymentSourceBody<'a> {
    card: CardBody<'a>,
}

#[derive(Serialize)]
struct CardBody<'a> {
    number: String,
    expiry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_address: Option<AddressBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<AttributesBody<'a>>,
}

impl<'a> CardBody<'a> {
    fn from_card(card: &'a Card, attributes: Option<AttributesBody<'a>>) -> Result<Self, SdkError> {
        Ok(Self {
            number: card.normalized_number(),
            expiry: card.expiry()?,
            name: card.cardholder_name.as_deref(),
            security_code: card.security_code.as_deref(),
            billing_address: card.billing_address.as_ref().map(AddressBody::from),
            attributes,
        })
    }
}

#[derive(Serialize)]
struct AddressBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    address_line_1: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address_line_2: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin_area_1: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin_area_2: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    postal_code: Option<&'a str>,
    country_code: &'a str,
}

impl<'a> From<&'a Address> for AddressBody<'a> {
    fn from(address: &'a Address) -> Self {
        Self {
            address_line_1: address.street_address.as_deref(),
            address_line_2: address.extended_address.as_deref(),
            admin_area_1: address.region.as_deref(),
            admin_area_2: address.locality.as_deref(),
            postal_code: address.postal_code.as_deref(),
            country_code: &address.country_code,
        }
    }
}

#[derive(Serialize)]
struct AttributesBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    verification: Option<VerificationBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vault: Option<VaultBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer: Option<CustomerBody<'a>>,
}

#[derive(Serialize)]
struct VerificationBody {
    method: Sca,
}

#[derive(Serialize)]
struct VaultBody {
    store_in_vault: &'static str,
}

#[derive(Serialize)]
struct CustomerBody<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct ApplicationContextBody<'a> {
    return_url: &'a str,
    cancel_url: &'a str,
}

const UPDATE_SETUP_TOKEN_QUERY: &str = "mutation UpdateVaultSetupToken(\
$clientId: String!, $vaultSetupToken: String!, $paymentSource: PaymentSource) { \
updateVaultSetupToken(clientId: $clientId, vaultSetupToken: $vaultSetupToken, \
paymentSource: $paymentSource) { id, status, links { rel, href } } }";

#[derive(Serialize)]
struct GraphQlBody<V> {
    query: &'static str,
    variables: V,
    #[serde(rename = "operationName")]
    operation_name: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSetupTokenVariables<'a> {
    client_id: &'a str,
    vault_setup_token: &'a str,
    payment_source: GraphQlPaymentSource<'a>,
}

#[derive(Serialize)]
struct GraphQlPaymentSource<'a> {
    card: GraphQlCard<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlCard<'a> {
    number: String,
    expiry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_address: Option<GraphQlAddress<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlAddress<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    address_line1: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address_line2: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin_area1: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin_area2: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    postal_code: Option<&'a str>,
    country_code: &'a str,
}

impl<'a> From<&'a Address> for GraphQlAddress<'a> {
    fn from(address: &'a Address) -> Self {
        Self {
            address_line1: address.street_address.as_deref(),
            address_line2: address.extended_address.as_deref(),
            admin_area1: address.region.as_deref(),
            admin_area2: address.locality.as_deref(),
            postal_code: address.postal_code.as_deref(),
            country_code: &address.country_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::card::VaultPreference;
    use crate::config::Environment;
    use serde_json::{Value, json};

    fn builder() -> RequestBuilder {
        RequestBuilder::new(&CoreConfig::new(
            "client-id",
            Environment::Sandbox,
            "com.example.app",
        ))
        .unwrap()
    }

    fn body(request: &WireRequest) -> Value {
        serde_json::from_str(request.body.as_deref().unwrap()).unwrap()
    }

    fn contains_null(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Array(items) => items.iter().any(contains_null),
            Value::Object(map) => map.values().any(contains_null),
            _ => false,
        }
    }

    #[test]
    fn test_minimal_card_body_has_no_null_keys() {
        let card = Card::new("4111111111111111", "01", "2030");
        let request = CardRequest::new("ORDER-1", card.clone());
        let confirm = body(&builder().confirm_payment_source(&request).unwrap());

        assert!(!contains_null(&confirm));
        let card_body = &confirm["payment_source"]["card"];
        assert_eq!(card_body.get("name"), None);
        assert_eq!(card_body.get("security_code"), None);
        assert_eq!(card_body.get("billing_address"), None);
        assert_eq!(card_body.get("attributes"), None);
        assert_eq!(card_body["expiry"], "2030-01");

        let vault = CardVaultRequest::new("TOKEN-1", card);
        let update = body(&builder().update_setup_token(&vault).unwrap());
        assert!(!contains_null(&update));
        assert_eq!(update["variables"]["paymentSource"]["card"].get("securityCode"), None);
    }

    #[test]
    fn test_confirm_payment_source_shape() {
        let card = Card::new("4111 1111 1111 1111", "1", "30")
            .with_security_code("123")
            .with_cardholder_name("Jane Doe")
            .with_billing_address(
                Address::new("US")
                    .with_street_address("2211 N First St")
                    .with_locality("San Jose")
                    .with_region("CA")
                    .with_postal_code("95131"),
            );
        let request = CardRequest::new("ORDER-1", card)
            .with_sca(Sca::Always)
            .with_vault(VaultPreference::for_customer("cust-7"));
        let wire = builder().confirm_payment_source(&request).unwrap();

        assert_eq!(wire.method, Method::POST);
        assert_eq!(wire.endpoint, Endpoint::Rest);
        assert_eq!(wire.path, "v2/checkout/orders/ORDER-1/confirm-payment-source");
        assert_eq!(
            body(&wire),
            json!({
                "payment_source": {
                    "card": {
                        "number": "4111111111111111",
                        "expiry": "2030-01",
                        "name": "Jane Doe",
                        "security_code": "123",
                        "billing_address": {
                            "address_line_1": "2211 N First St",
                            "admin_area_1": "CA",
                            "admin_area_2": "San Jose",
                            "postal_code": "95131",
                            "country_code": "US"
                        },
                        "attributes": {
                            "verification": { "method": "SCA_ALWAYS" },
                            "vault": { "store_in_vault": "ON_SUCCESS" },
                            "customer": { "id": "cust-7" }
                        }
                    }
                },
                "application_context": {
                    "return_url": "com.example.app://x-callback-url/paypal-sdk/card-contingency",
                    "cancel_url": "com.example.app://x-callback-url/paypal-sdk/card-contingency"
                }
            })
        );
    }

    #[test]
    fn test_whitespace_stripped_number_survives_decode() {
        let request = CardRequest::new("ORDER-1", Card::new(" 4111 1111 1111 1111 ", "12", "2031"));
        let wire = builder().confirm_payment_source(&request).unwrap();
        let decoded = body(&wire);
        assert_eq!(decoded["payment_source"]["card"]["number"], "4111111111111111");
    }

    #[test]
    fn test_build_is_deterministic() {
        let request = CardRequest::new("ORDER-1", Card::new("4111111111111111", "01", "2030"))
            .with_sca(Sca::WhenRequired);
        let a = builder().confirm_payment_source(&request).unwrap();
        let b = builder().confirm_payment_source(&request).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_headers() {
        let config = CoreConfig::new("client-id", Environment::Sandbox, "com.example.app")
            .with_language("en-US");
        let builder = RequestBuilder::new(&config).unwrap();
        let post = builder
            .confirm_payment_source(&CardRequest::new(
                "ORDER-1",
                Card::new("4111111111111111", "01", "2030"),
            ))
            .unwrap();

        // base64("client-id:")
        assert_eq!(post.headers[AUTHORIZATION], "Basic Y2xpZW50LWlkOg==");
        assert_eq!(post.headers[ACCEPT_LANGUAGE], "en-US");
        assert_eq!(post.headers[CONTENT_TYPE], "application/json");

        let get = builder.get_order("ORDER-1").unwrap();
        assert_eq!(get.method, Method::GET);
        assert_eq!(get.path, "v2/checkout/orders/ORDER-1");
        assert!(get.body.is_none());
        assert!(!get.headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_rejects_unusable_order_id() {
        let card = Card::new("4111111111111111", "01", "2030");
        for id in ["", "../admin", "ORDER 1"] {
            let err = builder()
                .confirm_payment_source(&CardRequest::new(id, card.clone()))
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidRequest);
            assert!(err.description.contains("order_id"));
        }
    }

    #[test]
    fn test_update_setup_token_mutation() {
        let card = Card::new("4111 1111 1111 1111", "02", "2029")
            .with_security_code("456")
            .with_billing_address(Address::new("GB").with_postal_code("EC1A 1BB"));
        let wire = builder()
            .update_setup_token(&CardVaultRequest::new("TOKEN-9", card))
            .unwrap();

        assert_eq!(wire.endpoint, Endpoint::GraphQl);
        assert_eq!(wire.path, "graphql");
        let body = body(&wire);
        assert_eq!(body["operationName"], "UpdateVaultSetupToken");
        assert!(body["query"].as_str().unwrap().contains("updateVaultSetupToken"));
        assert_eq!(
            body["variables"],
            json!({
                "clientId": "client-id",
                "vaultSetupToken": "TOKEN-9",
                "paymentSource": {
                    "card": {
                        "number": "4111111111111111",
                        "expiry": "2029-02",
                        "securityCode": "456",
                        "billingAddress": { "postalCode": "EC1A 1BB", "countryCode": "GB" }
                    }
                }
            })
        );
    }

    #[test]
    fn test_debug_hides_body_and_authorization() {
        let wire = builder()
            .confirm_payment_source(&CardRequest::new(
                "ORDER-1",
                Card::new("4111111111111111", "01", "2030"),
            ))
            .unwrap();
        let text = format!("{wire:?}");
        assert!(!text.contains("4111111111111111"));
        assert!(!text.contains("Y2xpZW50LWlkOg=="));
    }
}
