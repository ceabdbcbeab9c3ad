//! Second leg of the handshake: validate state, exchange the code.

use axum::{
    extract::{Extension, Query, rejection::QueryRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::IntoParams;

use crate::sso::SsoError;

use super::cookie::{clear_state_cookie, extract_state_cookie, state_matches};
use super::state::{AuthState, LANDING_PATH};

pub const MAX_CODE_LEN: usize = 1024;
pub const MAX_STATE_LEN: usize = 256;
pub const MAX_ERROR_DESCRIPTION_LEN: usize = 2048;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// Authorization code issued by the provider.
    #[param(max_length = 1024)]
    pub code: Option<String>,
    /// State echoed back by the provider, must match the `oauth_state` cookie.
    #[param(max_length = 256)]
    pub state: Option<String>,
    /// Provider-reported failure, e.g. the user denied consent.
    #[param(max_length = 2048)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    fn oversized(&self) -> bool {
        exceeds(self.code.as_deref(), MAX_CODE_LEN)
            || exceeds(self.state.as_deref(), MAX_STATE_LEN)
            || exceeds(self.error_description.as_deref(), MAX_ERROR_DESCRIPTION_LEN)
    }
}

fn exceeds(value: Option<&str>, max: usize) -> bool {
    value.is_some_and(|value| value.len() > max)
}

// Every client error gets the same bare 400, whatever the cause.
fn bad_request() -> Response {
    StatusCode::BAD_REQUEST.into_response()
}

/// Complete a login attempt.
///
/// The binding is cleared before the code exchange, so the same state can not
/// be used twice even when the exchange fails.
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackParams),
    responses(
        (status = 302, description = "Login completed, redirect to the landing page"),
        (status = 400, description = "Malformed callback, provider error or state mismatch"),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Code exchange failed")
    ),
    tag = "auth"
)]
pub async fn callback(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            warn!("Malformed callback query: {rejection}");
            return bad_request();
        }
    };

    if params.oversized() {
        warn!("Callback parameters exceed length limits");
        return bad_request();
    }

    if let Some(description) = params.error_description.as_deref().filter(|d| !d.is_empty()) {
        warn!(error_description = description, "Provider reported an OAuth error");
        return bad_request();
    }

    let code = params.code.unwrap_or_default();
    if code.is_empty() {
        warn!("OAuth callback without an authorization code");
        return bad_request();
    }

    let returned_state = params.state.unwrap_or_default();
    let bound_state = extract_state_cookie(&headers);
    if !state_matches(bound_state.as_deref(), &returned_state) {
        if bound_state.is_none() {
            warn!("Invalid OAuth state: no state cookie");
        } else {
            warn!("Invalid OAuth state: value does not match");
        }
        return bad_request();
    }

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, clear_state_cookie());

    let timeout = auth_state.config().exchange_timeout();
    let exchange = auth_state.provider().profile_and_token(&code);

    let result = tokio::time::timeout(timeout, exchange)
        .await
        .unwrap_or_else(|_| Err(SsoError::Timeout(timeout)));

    match result {
        Ok(session) => {
            info!(profile_id = %session.profile.id, "User authenticated");
            response_headers.insert(LOCATION, HeaderValue::from_static(LANDING_PATH));
            (StatusCode::FOUND, response_headers).into_response()
        }
        Err(err) => {
            error!(error = %err, "Failed to exchange authorization code");
            (StatusCode::INTERNAL_SERVER_ERROR, response_headers).into_response()
        }
    }
}
