//! Identity provider seam.
//!
//! Handlers only see [`IdentityProvider`]; the concrete client lives in
//! [`workos`]. Tests swap in their own implementations.

pub mod workos;

use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin, time::Duration};
use thiserror::Error;
use url::Url;

pub use workos::WorkOsClient;

/// Boxed future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SsoError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum SsoError {
    #[error("invalid provider configuration: {0}")]
    Config(String),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider did not respond within {0:?}")]
    Timeout(Duration),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),
}

/// Parameters for the first leg of the handshake.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    pub redirect_uri: Url,
    pub provider: String,
    pub state: String,
}

/// Identity returned by the provider after a successful code exchange.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub idp_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProfileAndToken {
    pub access_token: String,
    pub profile: Profile,
}

pub trait IdentityProvider: Send + Sync {
    /// Build the URL the browser is sent to for authentication.
    fn authorization_url<'a>(&'a self, request: &'a AuthorizationRequest) -> ProviderFuture<'a, Url>;

    /// Exchange an authorization code for the user's profile and access token.
    ///
    /// Callers bound this with their own timeout; dropping the future cancels
    /// the outbound request.
    fn profile_and_token<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, ProfileAndToken>;
}
