//! CLI configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! client_id = "$PAYPAL_CLIENT_ID"
//! environment = "sandbox"
//! return_url_scheme = "com.example.app"
//! language = "en-US"
//! timeout_secs = 30
//! # api_url = "http://localhost:8080"
//! # graphql_url = "http://localhost:8081/graphql"
//! state_file = ".confirmkit-state"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: path to the configuration file (default: `confirmkit.toml`)
//! - `PAYPAL_CLIENT_ID`: overrides `client_id`
//! - `PAYPAL_ENVIRONMENT`: overrides `environment` (`live` or `sandbox`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use confirmkit::config::UnknownEnvironment;
use confirmkit::{CoreConfig, Environment};
use serde::{Deserialize, Serialize};

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "confirmkit.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`CliConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// `PAYPAL_ENVIRONMENT` names no known environment.
    #[error(transparent)]
    Environment(#[from] UnknownEnvironment),
    /// No client id was configured.
    #[error("client_id is not set (configure it or export PAYPAL_CLIENT_ID)")]
    MissingClientId,
}

/// Top-level CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Merchant client id.
    #[serde(default)]
    pub client_id: String,

    /// Target environment (default: `sandbox`).
    #[serde(default)]
    pub environment: Environment,

    /// Scheme of the return deep links (default: `com.example.confirmkit`).
    #[serde(default = "default_return_url_scheme")]
    pub return_url_scheme: String,

    /// Value sent as `Accept-Language`.
    #[serde(default)]
    pub language: Option<String>,

    /// Overrides the API base URL of the environment.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Overrides the GraphQL endpoint. Without it, GraphQL goes to the web
    /// host of the environment, or to `<api_url>/graphql` when `api_url` is
    /// set.
    #[serde(default)]
    pub graphql_url: Option<String>,

    /// Request timeout in seconds (default: `30`).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// File the pending challenge is kept in between invocations.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_return_url_scheme() -> String {
    "com.example.confirmkit".to_owned()
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".confirmkit-state")
}

impl CliConfig {
    /// Loads configuration from `path`, expanding variables and applying
    /// overrides from the process environment.
    ///
    /// A missing file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// override is invalid, or no client id ends up configured.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        Self::parse(&content, |name| std::env::var(name).ok())
    }

    /// Parses TOML `content`, resolving `$VAR` references and overrides
    /// through `lookup`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load_from`], minus I/O.
    pub fn parse(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let expanded = expand_vars(content, &lookup);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Some(client_id) = lookup("PAYPAL_CLIENT_ID").filter(|v| !v.trim().is_empty()) {
            config.client_id = client_id;
        }
        if let Some(environment) = lookup("PAYPAL_ENVIRONMENT") {
            config.environment = environment.parse()?;
        }

        let client_id = config.client_id.trim();
        if client_id.is_empty() || client_id.starts_with('$') {
            return Err(ConfigError::MissingClientId);
        }
        Ok(config)
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn core_config(&self) -> CoreConfig {
        let config = CoreConfig::new(
            self.client_id.trim(),
            self.environment,
            self.return_url_scheme.as_str(),
        );
        match &self.language {
            Some(language) => config.with_language(language.as_str()),
            None => config,
        }
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Expands `$VAR` and `${VAR}` patterns using `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match (name.is_empty(), lookup(&name)) {
            (false, Some(value)) => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_expand_vars() {
        let lookup = env(&[("ID", "abc"), ("SCHEME", "com.app")]);
        assert_eq!(expand_vars("id = \"$ID\"", &lookup), "id = \"abc\"");
        assert_eq!(expand_vars("${SCHEME}://x", &lookup), "com.app://x");
        assert_eq!(expand_vars("$MISSING and ${ALSO}", &lookup), "$MISSING and ${ALSO}");
        assert_eq!(expand_vars("cost: $ 5", &lookup), "cost: $ 5");
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = CliConfig::parse("client_id = \"abc\"", env(&[])).unwrap();
        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.state_file, PathBuf::from(".confirmkit-state"));
        assert_eq!(config.core_config().client_id, "abc");
    }

    #[test]
    fn test_file_values_expand_from_environment() {
        let toml = r#"
            client_id = "${MERCHANT_ID}"
            environment = "live"
            return_url_scheme = "com.shop"
            language = "de-DE"
        "#;
        let config = CliConfig::parse(toml, env(&[("MERCHANT_ID", "merchant")])).unwrap();
        let core = config.core_config();
        assert_eq!(core.client_id, "merchant");
        assert_eq!(core.environment, Environment::Live);
        assert_eq!(core.return_url_scheme, "com.shop");
        assert_eq!(core.language.as_deref(), Some("de-DE"));
    }

    #[test]
    fn test_environment_overrides() {
        let config = CliConfig::parse(
            "client_id = \"file\"\nenvironment = \"sandbox\"",
            env(&[("PAYPAL_CLIENT_ID", "env"), ("PAYPAL_ENVIRONMENT", "Production")]),
        )
        .unwrap();
        assert_eq!(config.client_id, "env");
        assert_eq!(config.environment, Environment::Live);

        let err = CliConfig::parse("client_id = \"x\"", env(&[("PAYPAL_ENVIRONMENT", "staging")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Environment(_)));
    }

    #[test]
    fn test_endpoint_overrides() {
        let toml = r#"
            client_id = "abc"
            api_url = "http://localhost:8080"
            graphql_url = "${WEB}/graphql"
        "#;
        let config = CliConfig::parse(toml, env(&[("WEB", "http://localhost:8081")])).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(
            config.graphql_url.as_deref(),
            Some("http://localhost:8081/graphql")
        );

        let config = CliConfig::parse("client_id = \"abc\"", env(&[])).unwrap();
        assert_eq!(config.graphql_url, None);
    }

    #[test]
    fn test_missing_client_id() {
        assert!(matches!(
            CliConfig::parse("", env(&[])),
            Err(ConfigError::MissingClientId)
        ));
        assert!(matches!(
            CliConfig::parse("client_id = \"$UNSET\"", env(&[])),
            Err(ConfigError::MissingClientId)
        ));
    }
}
