//! Map validated CLI arguments to an action.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{
    ARG_CORS_ALLOW_ORIGIN, ARG_ENVIRONMENT, ARG_PORT, rate_limit, workos,
};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let environment = matches
        .get_one::<String>(ARG_ENVIRONMENT)
        .cloned()
        .unwrap_or_else(|| "production".to_string());
    let cors_allow_origin = matches
        .get_one::<String>(ARG_CORS_ALLOW_ORIGIN)
        .cloned()
        .unwrap_or_else(|| "*".to_string());

    let workos_opts = workos::Options::parse(matches)?;
    let rate_limit = rate_limit::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        environment,
        workos_api_key: workos_opts.api_key,
        workos_client_id: workos_opts.client_id,
        workos_auth_callback: workos_opts.auth_callback,
        workos_provider: workos_opts.provider,
        workos_api_url: workos_opts.api_url,
        rate_limit,
        cors_allow_origin,
    }))
}
