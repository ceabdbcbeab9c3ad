//! `.env` loading.
//!
//! The file has to be loaded before clap reads the environment, so the
//! `--env-file` flag is located with a plain scan of the raw arguments. The
//! flag is also declared on the command so that clap accepts it.

use clap::{Arg, Command};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const ARG_ENV_FILE: &str = "env-file";
pub const ENV_FILE_VAR: &str = "VITALS_ENV_FILE";

#[derive(Debug)]
pub enum EnvFile {
    Loaded(PathBuf),
    /// No explicit file was requested and no `.env` was found.
    NotFound,
    Failed {
        path: Option<PathBuf>,
        error: dotenvy::Error,
    },
}

/// Locate an explicitly requested env file in the raw arguments, falling back
/// to `VITALS_ENV_FILE`.
pub fn requested_path<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = OsString>,
{
    let flag = format!("--{ARG_ENV_FILE}");
    let prefix = format!("{flag}=");
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let Some(arg) = arg.to_str() else {
            continue;
        };
        if arg == "--" {
            break;
        }
        if arg == flag {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix(&prefix) {
            return Some(PathBuf::from(path));
        }
    }

    std::env::var_os(ENV_FILE_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Load `path`, or `.env` from the working directory and its parents.
///
/// Variables already present in the environment are never overridden.
#[must_use]
pub fn load(path: Option<&Path>) -> EnvFile {
    match path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => EnvFile::Loaded(path.to_path_buf()),
            Err(error) => EnvFile::Failed {
                path: Some(path.to_path_buf()),
                error,
            },
        },
        None => match dotenvy::dotenv() {
            Ok(path) => EnvFile::Loaded(path),
            Err(error) if error.not_found() => EnvFile::NotFound,
            Err(error) => EnvFile::Failed { path: None, error },
        },
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_ENV_FILE)
            .long(ARG_ENV_FILE)
            .help("Path to a .env file loaded before reading configuration (default: .env if present)")
            .env(ENV_FILE_VAR),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[test]
    fn requested_path_from_flag() {
        temp_env::with_var(ENV_FILE_VAR, None::<&str>, || {
            assert_eq!(
                requested_path(args(&["vitals", "--env-file", "/tmp/a.env"])),
                Some(PathBuf::from("/tmp/a.env"))
            );
            assert_eq!(
                requested_path(args(&["vitals", "-v", "--env-file=/tmp/b.env"])),
                Some(PathBuf::from("/tmp/b.env"))
            );
            assert_eq!(requested_path(args(&["vitals", "--port", "80"])), None);
            assert_eq!(
                requested_path(args(&["vitals", "--", "--env-file", "/tmp/c.env"])),
                None
            );
        });
    }

    #[test]
    fn requested_path_from_env() {
        temp_env::with_var(ENV_FILE_VAR, Some("/tmp/from-env.env"), || {
            assert_eq!(
                requested_path(args(&["vitals"])),
                Some(PathBuf::from("/tmp/from-env.env"))
            );
            // the flag wins over the variable
            assert_eq!(
                requested_path(args(&["vitals", "--env-file", "/tmp/flag.env"])),
                Some(PathBuf::from("/tmp/flag.env"))
            );
        });
    }

    #[test]
    fn load_reads_explicit_file_without_overriding() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("vitals-{}.env", ulid::Ulid::new()));
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "VITALS_TEST_FROM_FILE=file")?;
        writeln!(file, "VITALS_TEST_PRESET=file")?;
        drop(file);

        temp_env::with_vars(
            [
                ("VITALS_TEST_FROM_FILE", None::<&str>),
                ("VITALS_TEST_PRESET", Some("process")),
            ],
            || {
                let outcome = load(Some(&path));
                assert!(matches!(outcome, EnvFile::Loaded(_)));
                assert_eq!(
                    std::env::var("VITALS_TEST_FROM_FILE").ok().as_deref(),
                    Some("file")
                );
                assert_eq!(
                    std::env::var("VITALS_TEST_PRESET").ok().as_deref(),
                    Some("process")
                );
            },
        );

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn load_reports_missing_explicit_file() {
        let outcome = load(Some(Path::new("/nonexistent/vitals.env")));
        assert!(matches!(outcome, EnvFile::Failed { path: Some(_), .. }));
    }
}
