//! Client configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{LIVE_API_URL, LIVE_WEB_URL, SANDBOX_API_URL, SANDBOX_WEB_URL};

/// API environment a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production.
    Live,
    /// Testing with sandbox credentials.
    #[default]
    Sandbox,
}

impl Environment {
    /// Base URL of the REST API, with a trailing slash.
    #[must_use]
    pub const fn api_url(self) -> &'static str {
        match self {
            Self::Live => LIVE_API_URL,
            Self::Sandbox => SANDBOX_API_URL,
        }
    }

    /// Base URL of the web surface (hosted checkout, GraphQL), with a
    /// trailing slash.
    #[must_use]
    pub const fn web_url(self) -> &'static str {
        match self {
            Self::Live => LIVE_WEB_URL,
            Self::Sandbox => SANDBOX_WEB_URL,
        }
    }

    /// Parsed [`Environment::web_url`].
    ///
    /// # Panics
    ///
    /// Panics only if the built-in URL constants are malformed.
    #[must_use]
    pub fn web_base(self) -> Url {
        Url::parse(self.web_url()).expect("environment web url is valid")
    }

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an environment name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown environment {0:?}, expected \"live\" or \"sandbox\"")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "production" => Ok(Self::Live),
            "sandbox" => Ok(Self::Sandbox),
            _ => Err(UnknownEnvironment(s.to_owned())),
        }
    }
}

/// Settings shared by every request a [`PaymentClient`](crate::PaymentClient)
/// makes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Public client id; sent as client-id-only basic authorization.
    pub client_id: String,

    /// Target environment (default: sandbox).
    #[serde(default)]
    pub environment: Environment,

    /// URL scheme the external surface returns to, e.g. `com.example.app`.
    pub return_url_scheme: String,

    /// Value for the `Accept-Language` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl CoreConfig {
    /// Creates a configuration without a language preference.
    pub fn new(
        client_id: impl Into<String>,
        environment: Environment,
        return_url_scheme: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            environment,
            return_url_scheme: return_url_scheme.into(),
            language: None,
        }
    }

    /// Sets the `Accept-Language` value.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!("LIVE".parse::<Environment>().unwrap(), Environment::Live);
        assert_eq!(" sandbox ".parse::<Environment>().unwrap(), Environment::Sandbox);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CoreConfig = serde_json::from_str(
            r#"{"client_id":"abc","return_url_scheme":"com.example.app"}"#,
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.language, None);
        assert_eq!(config.environment.web_base().as_str(), SANDBOX_WEB_URL);
    }
}
