//! OAuth 2.0 authorization-code handshake.
//!
//! ## State Binding
//!
//! `GET /login` generates a 256-bit state token and stores it only in the
//! `oauth_state` cookie (`HttpOnly`, `Secure`, `SameSite=Lax`, five minutes).
//! The provider echoes the token back as the `state` query parameter of
//! `GET /auth/callback`, where it must match the cookie exactly.
//!
//! A missing cookie and a mismatched value produce the same `400` so the
//! response can not be used to probe for valid state values.

mod callback;
mod cookie;
mod login;
mod state;
mod token;

pub use callback::{
    CallbackParams, MAX_CODE_LEN, MAX_ERROR_DESCRIPTION_LEN, MAX_STATE_LEN, callback,
};
pub use cookie::{STATE_COOKIE_MAX_AGE_SECONDS, STATE_COOKIE_NAME};
pub use login::login;
pub use state::{AuthConfig, AuthState, DEFAULT_EXCHANGE_TIMEOUT, DEFAULT_PROVIDER};

// utoipa path items for the OpenAPI document
pub(crate) use callback::__path_callback;
pub(crate) use login::__path_login;
