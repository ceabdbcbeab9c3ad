//! First leg of the handshake: mint state, bind it, redirect to the provider.

use axum::{
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::sso::AuthorizationRequest;

use super::cookie::state_cookie;
use super::state::AuthState;
use super::token::generate_state_token;

/// Start a login attempt.
///
/// Each call overwrites any earlier `oauth_state` binding held by the browser.
/// Provider failures fail closed: no cookie and no redirect.
#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 302, description = "Redirect to the identity provider, sets the oauth_state cookie"),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Identity provider unavailable")
    ),
    tag = "auth"
)]
pub async fn login(auth_state: Extension<Arc<AuthState>>) -> Response {
    let token = match generate_state_token() {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to generate state token: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let config = auth_state.config();
    let request = AuthorizationRequest {
        redirect_uri: config.redirect_uri().clone(),
        provider: config.provider().to_string(),
        state: token,
    };

    let url = match auth_state.provider().authorization_url(&request).await {
        Ok(url) => url,
        Err(err) => {
            error!(error = %err, "Failed to get authorization URL");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let (Ok(location), Ok(cookie)) = (
        HeaderValue::from_str(url.as_str()),
        state_cookie(&request.state),
    ) else {
        error!("Authorization redirect is not a valid header value");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    debug!(provider = config.provider(), "Redirecting to identity provider");

    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, location);
    headers.insert(SET_COOKIE, cookie);
    (StatusCode::FOUND, headers).into_response()
}
