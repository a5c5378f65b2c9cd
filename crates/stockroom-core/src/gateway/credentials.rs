//! Credentials attached to every remote call

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::Config;

/// Supplies the `Authorization` header value for remote calls
pub trait CredentialProvider: Send + Sync {
    fn authorization(&self) -> Option<String>;
}

/// No credentials
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn authorization(&self) -> Option<String> {
        None
    }
}

/// Static HTTP basic credentials
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Credentials from configuration, if a username is set
    pub fn from_config(config: &Config) -> Option<Self> {
        config.username.as_ref().map(|username| {
            Self::new(username.clone(), config.password.clone().unwrap_or_default())
        })
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl CredentialProvider for BasicAuth {
    fn authorization(&self) -> Option<String> {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        Some(format!("Basic {}", token))
    }
}
