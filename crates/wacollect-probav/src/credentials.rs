//! Account lookup for authenticated providers.

use crate::{ProbavError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Provider name of the PROBA-V archive.
pub const VITO: &str = "VITO";

/// Basic-auth username and password.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of provider accounts.
pub trait CredentialProvider {
    /// Credentials for `provider` (e.g. `VITO`).
    fn credentials(&self, provider: &str) -> Result<Credentials>;
}

/// Credentials held in memory, e.g. from a config file.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    accounts: HashMap<String, Credentials>,
}

impl StaticCredentials {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account for `provider`.
    pub fn with(mut self, provider: &str, credentials: Credentials) -> Self {
        self.accounts.insert(provider.to_ascii_uppercase(), credentials);
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self, provider: &str) -> Result<Credentials> {
        self.accounts
            .get(&provider.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| ProbavError::MissingCredentials {
                provider: provider.to_string(),
                reason: "not configured".to_string(),
            })
    }
}

/// Credentials read from `<PREFIX>_<PROVIDER>_USERNAME` and `_PASSWORD`.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    prefix: String,
}

impl EnvCredentials {
    /// Default prefix, `WACOLLECT`.
    pub const DEFAULT_PREFIX: &'static str = "WACOLLECT";

    /// Reader with a custom variable prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable names for `provider`.
    pub fn variable_names(&self, provider: &str) -> (String, String) {
        let stem = format!("{}_{}", self.prefix, provider.to_ascii_uppercase());
        (format!("{stem}_USERNAME"), format!("{stem}_PASSWORD"))
    }

    fn lookup(
        &self,
        provider: &str,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials> {
        let (user_var, pass_var) = self.variable_names(provider);
        let missing = |var: &str| ProbavError::MissingCredentials {
            provider: provider.to_string(),
            reason: format!("{var} is not set"),
        };
        let username = get(&user_var).ok_or_else(|| missing(&user_var))?;
        let password = get(&pass_var).ok_or_else(|| missing(&pass_var))?;
        Ok(Credentials::new(username, password))
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self, provider: &str) -> Result<Credentials> {
        self.lookup(provider, |var| std::env::var(var).ok().filter(|v| !v.is_empty()))
    }
}
