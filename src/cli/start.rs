use crate::cli::{
    actions::Action,
    commands::{self, env_file, env_file::EnvFile, logging},
    dispatch, telemetry,
};
use anyhow::Result;
use tracing::{Level, debug, info, warn};

const DEV_ENVIRONMENT: &str = "dev";

/// Map verbosity count to tracing level
const fn get_verbosity_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// An explicit verbosity wins, otherwise `dev` logs at DEBUG and everything
/// else at INFO.
fn resolve_level(explicit: Option<u8>, environment: Option<&str>) -> Level {
    match explicit {
        Some(verbosity) => get_verbosity_level(verbosity),
        None if environment == Some(DEV_ENVIRONMENT) => Level::DEBUG,
        None => Level::INFO,
    }
}

/// Main entry point for the CLI - builds and returns the Action
///
/// # Errors
///
/// Returns an error if argument parsing, telemetry initialization, or action dispatch fails
pub fn start() -> Result<Action> {
    // 1. Load the env file before clap reads the environment
    let dotenv = env_file::load(env_file::requested_path(std::env::args_os()).as_deref());

    // 2. Parse command-line arguments
    let matches = commands::new().get_matches();

    // 3. Initialize telemetry
    let level = resolve_level(
        logging::explicit_verbosity(&matches),
        matches
            .get_one::<String>(commands::ARG_ENVIRONMENT)
            .map(String::as_str),
    );
    telemetry::init(level)?;

    match dotenv {
        EnvFile::Loaded(path) => info!(path = %path.display(), "Loaded env file"),
        EnvFile::NotFound => debug!("No .env file found"),
        EnvFile::Failed { path, error } => warn!(
            path = path.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
            "Failed to load env file: {error}"
        ),
    }

    // 4. Dispatch to appropriate action
    dispatch::handler(&matches)
}
