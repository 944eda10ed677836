//! Header names, API paths and environment base URLs.

/// Response header carrying the server-side correlation id.
pub const DEBUG_ID_HEADER: &str = "Paypal-Debug-Id";

/// Path template for the confirm-payment-source endpoint.
pub const CONFIRM_PAYMENT_SOURCE_PATH: &str = "v2/checkout/orders/{id}/confirm-payment-source";

/// Path template for fetching an order.
pub const ORDER_PATH: &str = "v2/checkout/orders/{id}";

/// GraphQL endpoint path, relative to the web base URL.
pub const GRAPHQL_PATH: &str = "graphql";

/// Checkout page path, relative to the web base URL.
pub const CHECKOUT_PATH: &str = "checkoutnow";

/// Billing agreement approval path, relative to the web base URL.
pub const VAULT_APPROVAL_PATH: &str = "agreements/approve";

/// Host and path appended to the return scheme for checkout redirects.
pub const CHECKOUT_RETURN_PATH: &str = "x-callback-url/paypal-sdk/paypal-checkout";

/// Host and path appended to the return scheme for card contingencies.
pub const CARD_RETURN_PATH: &str = "x-callback-url/paypal-sdk/card-contingency";

/// Metadata key holding an order id.
pub const ORDER_ID_KEY: &str = "order_id";

/// Metadata key holding a vault setup-token id.
pub const SETUP_TOKEN_ID_KEY: &str = "setup_token_id";

/// Deep-link query parameter set when the payer approved a checkout.
pub const PAYER_ID_PARAM: &str = "PayerID";

/// Deep-link query parameter set when the payer approved a vault session.
pub const APPROVAL_SESSION_ID_PARAM: &str = "approval_session_id";

/// Deep-link query parameter describing the checkout operation.
pub const OP_TYPE_PARAM: &str = "opType";

/// Live REST API base URL.
pub const LIVE_API_URL: &str = "https://api-m.paypal.com/";

/// Sandbox REST API base URL.
pub const SANDBOX_API_URL: &str = "https://api-m.sandbox.paypal.com/";

/// Live web base URL, used for hosted checkout and GraphQL.
pub const LIVE_WEB_URL: &str = "https://www.paypal.com/";

/// Sandbox web base URL, used for hosted checkout and GraphQL.
pub const SANDBOX_WEB_URL: &str = "https://www.sandbox.paypal.com/";
