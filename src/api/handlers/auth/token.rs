//! State token generation for the login handshake.

use anyhow::{Context, Result};
use rand::{RngCore, rngs::OsRng};

/// 256 bits of entropy, hex encoded to 64 characters.
pub(crate) const STATE_TOKEN_BYTES: usize = 32;

/// Create a fresh state token for one login attempt.
///
/// The token is never stored server side; it only travels in the state cookie
/// and in the `state` parameter echoed back by the provider.
pub(crate) fn generate_state_token() -> Result<String> {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate state token")?;
    Ok(hex::encode(bytes))
}
