use clap::{Arg, ArgMatches, Command, builder::ValueParser, parser::ValueSource};

pub const ARG_VERBOSITY: &str = "verbosity";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

/// Verbosity requested on the command line or through the environment.
///
/// `None` when neither was given, so the environment flag can pick the default.
#[must_use]
pub fn explicit_verbosity(matches: &ArgMatches) -> Option<u8> {
    match matches.value_source(ARG_VERBOSITY) {
        Some(ValueSource::CommandLine | ValueSource::EnvVariable) => {
            matches.get_one::<u8>(ARG_VERBOSITY).copied()
        }
        _ => None,
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: INFO, DEBUG when --environment=dev)")
            .env("VITALS_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
