//! # Vitals (SSO front door)
//!
//! `vitals` is a small HTTP service that fronts an external identity provider.
//! It runs the browser side of an OAuth 2.0 authorization-code handshake and
//! answers a liveness probe. Everything else is delegated to the provider.
//!
//! ## Login Handshake
//!
//! - `GET /login` mints a fresh random state token, binds it to the browser
//!   with a short-lived `oauth_state` cookie and redirects to the provider.
//! - `GET /auth/callback` accepts the provider's redirect only when the `state`
//!   query parameter matches the cookie. The cookie is cleared on every
//!   callback that reaches the exchange step, so a state value is single use.
//!
//! Mismatched, missing or replayed state values all get the same `400` response.
//!
//! ## Admission Control
//!
//! Every request passes through a per-client token bucket (5 tokens per second,
//! burst of 15). Idle buckets are evicted after three minutes.
//!
//! ## Lifecycle
//!
//! The server moves through `starting`, `serving`, `draining` and `stopped`.
//! On an interrupt or terminate signal it stops accepting, lets in-flight
//! requests finish for up to ten seconds, then aborts the rest.

pub mod api;
pub mod cli;
pub mod server;
pub mod sso;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Short commit hash used in the `X-App` header, empty when unknown.
#[must_use]
pub fn short_commit_hash() -> &'static str {
    if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        ""
    }
}
