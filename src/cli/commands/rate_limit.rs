use clap::{Arg, ArgMatches, Command};

use crate::api::admission::{DEFAULT_BURST, DEFAULT_RATE_PER_SECOND, RateLimitConfig};

pub const ARG_RATE_LIMIT_PER_SECOND: &str = "rate-limit-per-second";
pub const ARG_RATE_LIMIT_BURST: &str = "rate-limit-burst";

/// Parse rate limit arguments from matches.
///
/// # Errors
/// Returns an error if a value is zero.
pub fn parse(matches: &ArgMatches) -> anyhow::Result<RateLimitConfig> {
    let per_second = matches
        .get_one::<u32>(ARG_RATE_LIMIT_PER_SECOND)
        .copied()
        .unwrap_or(DEFAULT_RATE_PER_SECOND);
    let burst = matches
        .get_one::<u32>(ARG_RATE_LIMIT_BURST)
        .copied()
        .unwrap_or(DEFAULT_BURST);
    Ok(RateLimitConfig::new(per_second, burst)?)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_PER_SECOND)
                .long(ARG_RATE_LIMIT_PER_SECOND)
                .help("Requests per second refilled into each client's bucket")
                .env("VITALS_RATE_LIMIT_PER_SECOND")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_BURST)
                .long(ARG_RATE_LIMIT_BURST)
                .help("Maximum burst of requests per client")
                .env("VITALS_RATE_LIMIT_BURST")
                .default_value("15")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}
