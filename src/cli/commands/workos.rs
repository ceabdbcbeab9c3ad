use anyhow::bail;
use clap::{Arg, ArgMatches, Command, builder::NonEmptyStringValueParser};
use secrecy::SecretString;

use crate::api::handlers::auth::DEFAULT_PROVIDER;
use crate::sso::workos::DEFAULT_API_URL;

pub const ARG_WORKOS_API_KEY: &str = "workos-api-key";
pub const ARG_WORKOS_CLIENT_ID: &str = "workos-client-id";
pub const ARG_WORKOS_AUTH_CALLBACK: &str = "workos-auth-callback";
pub const ARG_WORKOS_PROVIDER: &str = "workos-provider";
pub const ARG_WORKOS_API_URL: &str = "workos-api-url";

#[derive(Debug)]
pub struct Options {
    pub api_key: SecretString,
    pub client_id: String,
    pub auth_callback: String,
    pub provider: String,
    pub api_url: String,
}

impl Options {
    /// Parse WorkOS arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let required = |id: &str| -> anyhow::Result<String> {
            match matches.get_one::<String>(id) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => bail!("missing required argument: --{id}"),
            }
        };

        Ok(Self {
            api_key: SecretString::from(required(ARG_WORKOS_API_KEY)?),
            client_id: required(ARG_WORKOS_CLIENT_ID)?,
            auth_callback: required(ARG_WORKOS_AUTH_CALLBACK)?,
            provider: required(ARG_WORKOS_PROVIDER)?,
            api_url: required(ARG_WORKOS_API_URL)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_WORKOS_API_KEY)
                .long(ARG_WORKOS_API_KEY)
                .help("WorkOS API key, used as the client secret for code exchange")
                .env("WORKOS_API_KEY")
                .hide_env_values(true)
                .value_parser(NonEmptyStringValueParser::new())
                .required(true),
        )
        .arg(
            Arg::new(ARG_WORKOS_CLIENT_ID)
                .long(ARG_WORKOS_CLIENT_ID)
                .help("WorkOS client id")
                .env("WORKOS_CLIENT_ID")
                .value_parser(NonEmptyStringValueParser::new())
                .required(true),
        )
        .arg(
            Arg::new(ARG_WORKOS_AUTH_CALLBACK)
                .long(ARG_WORKOS_AUTH_CALLBACK)
                .help("Absolute callback URL registered with WorkOS, e.g. https://vitals.example.com/auth/callback")
                .env("WORKOS_AUTH_CALLBACK")
                .value_parser(NonEmptyStringValueParser::new())
                .required(true),
        )
        .arg(
            Arg::new(ARG_WORKOS_PROVIDER)
                .long(ARG_WORKOS_PROVIDER)
                .help("Identity provider requested in the authorization URL")
                .env("WORKOS_PROVIDER")
                .default_value(DEFAULT_PROVIDER),
        )
        .arg(
            Arg::new(ARG_WORKOS_API_URL)
                .long(ARG_WORKOS_API_URL)
                .help("WorkOS API base URL")
                .env("WORKOS_API_URL")
                .default_value(DEFAULT_API_URL),
        )
}
