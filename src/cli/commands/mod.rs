pub mod env_file;
pub mod logging;
pub mod rate_limit;
pub mod workos;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_CORS_ALLOW_ORIGIN: &str = "cors-allow-origin";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("vitals")
        .about("SSO front door")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment, `dev` enables debug logging")
                .env("ENVIRONMENT")
                .default_value("production"),
        )
        .arg(
            Arg::new(ARG_CORS_ALLOW_ORIGIN)
                .long(ARG_CORS_ALLOW_ORIGIN)
                .help("Allowed CORS origins, comma separated, `*` for any")
                .env("VITALS_CORS_ALLOW_ORIGIN")
                .default_value("*"),
        );

    let command = workos::with_args(command);
    let command = rate_limit::with_args(command);
    let command = env_file::with_args(command);
    logging::with_args(command)
}
