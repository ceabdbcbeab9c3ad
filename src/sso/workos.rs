//! WorkOS SSO client.
//!
//! Only the two calls the login handshake needs are implemented: building the
//! authorization URL (local, no network) and the authorization-code exchange.

use super::{AuthorizationRequest, IdentityProvider, ProfileAndToken, ProviderFuture, SsoError};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{Instrument, debug, info_span};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.workos.com";

// Error bodies are logged, keep them short.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug)]
pub struct WorkOsClient {
    base_url: Url,
    client_id: String,
    api_key: SecretString,
    client: Client,
}

impl WorkOsClient {
    /// # Errors
    /// Returns an error if the API URL is not an absolute http(s) URL, the
    /// client id or API key is empty, or the HTTP client cannot be built.
    pub fn new(api_url: &str, client_id: String, api_key: SecretString) -> Result<Self, SsoError> {
        if client_id.trim().is_empty() {
            return Err(SsoError::Config("client id must not be empty".to_string()));
        }
        if api_key.expose_secret().trim().is_empty() {
            return Err(SsoError::Config("API key must not be empty".to_string()));
        }

        let base_url = normalize_base_url(api_url)?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()?;

        Ok(Self {
            base_url,
            client_id,
            api_key,
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn authorize_url(&self, request: &AuthorizationRequest) -> Result<Url, SsoError> {
        if request.provider.trim().is_empty() {
            return Err(SsoError::Config(
                "provider must not be empty".to_string(),
            ));
        }
        if request.state.is_empty() {
            return Err(SsoError::Config("state must not be empty".to_string()));
        }

        let mut url = self.base_url.join("sso/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", request.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("provider", &request.provider)
            .append_pair("state", &request.state);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<ProfileAndToken, SsoError> {
        let url = self.base_url.join("sso/token")?;
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.api_key.expose_secret()),
            ("grant_type", "authorization_code"),
            ("code", code),
        ];

        let response = self.client.post(url).form(&form[..]).send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
            return Err(SsoError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload = response
            .json::<ProfileAndToken>()
            .await
            .map_err(|err| SsoError::InvalidResponse(err.to_string()))?;

        if payload.profile.id.is_empty() {
            return Err(SsoError::InvalidResponse(
                "profile id is missing".to_string(),
            ));
        }

        debug!(
            profile_id = %payload.profile.id,
            connection_type = payload.profile.connection_type.as_deref().unwrap_or("unknown"),
            "Exchanged authorization code"
        );

        Ok(payload)
    }
}

impl IdentityProvider for WorkOsClient {
    fn authorization_url<'a>(&'a self, request: &'a AuthorizationRequest) -> ProviderFuture<'a, Url> {
        Box::pin(async move { self.authorize_url(request) })
    }

    fn profile_and_token<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, ProfileAndToken> {
        let span = info_span!("sso.exchange", sso.provider = "workos");
        Box::pin(self.exchange_code(code).instrument(span))
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn normalize_base_url(api_url: &str) -> Result<Url, SsoError> {
    let trimmed = api_url.trim();
    if trimmed.is_empty() {
        return Err(SsoError::Config("API url must not be empty".to_string()));
    }

    let mut raw = trimmed.to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }

    let url = Url::parse(&raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SsoError::Config(format!(
            "unsupported API url scheme: {scheme}"
        ))),
    }
}

fn floor_char_boundary(value: &str, max: usize) -> usize {
    if value.len() <= max {
        return value.len();
    }
    let mut index = max;
    while !value.is_char_boundary(index) {
        index -= 1;
    }
    index
}
