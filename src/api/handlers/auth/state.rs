//! Handshake configuration and shared handler state.

use crate::sso::IdentityProvider;
use anyhow::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_PROVIDER: &str = "GitHubOAuth";
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);
pub const LANDING_PATH: &str = "/";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    redirect_uri: Url,
    provider: String,
    exchange_timeout: Duration,
}

impl AuthConfig {
    /// # Errors
    /// Returns an error if the callback URI is empty or not an absolute URL.
    pub fn new(redirect_uri: &str) -> Result<Self> {
        let trimmed = redirect_uri.trim();
        if trimmed.is_empty() {
            bail!("auth callback URI must not be empty");
        }
        let redirect_uri = Url::parse(trimmed)
            .map_err(|err| anyhow::anyhow!("invalid auth callback URI {trimmed}: {err}"))?;

        Ok(Self {
            redirect_uri,
            provider: DEFAULT_PROVIDER.to_string(),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        })
    }

    /// # Errors
    /// Returns an error if `provider` is empty.
    pub fn with_provider(mut self, provider: String) -> Result<Self> {
        if provider.trim().is_empty() {
            bail!("provider must not be empty");
        }
        self.provider = provider;
        Ok(self)
    }

    #[must_use]
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn exchange_timeout(&self) -> Duration {
        self.exchange_timeout
    }
}

pub struct AuthState {
    config: AuthConfig,
    provider: Arc<dyn IdentityProvider>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { config, provider }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn provider(&self) -> &dyn IdentityProvider {
        self.provider.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() -> Result<()> {
        let config = AuthConfig::new("https://vitals.example.com/auth/callback")?;
        assert_eq!(config.provider(), DEFAULT_PROVIDER);
        assert_eq!(config.exchange_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.redirect_uri().as_str(),
            "https://vitals.example.com/auth/callback"
        );
        Ok(())
    }

    #[test]
    fn config_rejects_empty_or_relative_callback() {
        assert!(AuthConfig::new("").is_err());
        assert!(AuthConfig::new("   ").is_err());
        assert!(AuthConfig::new("/auth/callback").is_err());
    }

    #[test]
    fn config_rejects_empty_provider() -> Result<()> {
        let config = AuthConfig::new("https://vitals.example.com/auth/callback")?;
        assert!(config.clone().with_provider(String::new()).is_err());
        let config = config.with_provider("GoogleOAuth".to_string())?;
        assert_eq!(config.provider(), "GoogleOAuth");
        Ok(())
    }
}
