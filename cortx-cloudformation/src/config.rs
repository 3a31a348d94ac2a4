// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration file: parameter default overrides and logging

use crate::params::{ParameterDefaults, ParameterError};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use slog::{o, Drain, Level, Logger};
use std::fs::OpenOptions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("error deserializing toml from {path}")]
    Toml {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },

    #[error("invalid parameter default in {path}")]
    Parameter {
        path: Utf8PathBuf,
        #[source]
        err: ParameterError,
    },

    #[error("open log file {path}")]
    LogFile {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Contents of the `--config` file.  Every section is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub parameters: ParameterDefaults,
    pub log: ConfigLogging,
}

impl Config {
    /// Reads and validates the config file at `path`.
    pub fn from_file<P: AsRef<Utf8Path>>(
        path: P,
    ) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io { path: path.to_owned(), err })?;
        Self::parse(path, &contents)
    }

    fn parse(path: &Utf8Path, contents: &str) -> Result<Config, ConfigError> {
        let config = toml::from_str::<Config>(contents)
            .map_err(|err| ConfigError::Toml { path: path.to_owned(), err })?;
        config.parameters.validate().map_err(|err| {
            ConfigError::Parameter { path: path.to_owned(), err }
        })?;
        Ok(config)
    }
}

/// Where log records go (the `[log]` table)
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ConfigLogging {
    StderrTerminal {
        #[serde(default)]
        level: ConfigLoggingLevel,
    },
    File {
        #[serde(default)]
        level: ConfigLoggingLevel,
        path: Utf8PathBuf,
        #[serde(default)]
        if_exists: ConfigLoggingIfExists,
    },
}

impl Default for ConfigLogging {
    fn default() -> Self {
        ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::default() }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingIfExists {
    Fail,
    Truncate,
    #[default]
    Append,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    Critical,
}

impl From<ConfigLoggingLevel> for Level {
    fn from(level: ConfigLoggingLevel) -> Level {
        match level {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

impl ConfigLogging {
    pub fn level(&self) -> ConfigLoggingLevel {
        match self {
            ConfigLogging::StderrTerminal { level }
            | ConfigLogging::File { level, .. } => *level,
        }
    }

    /// Replaces the configured level, e.g. with one given on the command
    /// line.
    pub fn set_level(&mut self, new_level: ConfigLoggingLevel) {
        match self {
            ConfigLogging::StderrTerminal { level }
            | ConfigLogging::File { level, .. } => *level = new_level,
        }
    }

    /// Creates the root logger.
    ///
    /// Records are written by a background thread; drop every clone of the
    /// returned logger before exiting so they get flushed.
    pub fn to_logger(&self, name: &'static str) -> Result<Logger, ConfigError> {
        match self {
            ConfigLogging::StderrTerminal { level } => {
                let decorator =
                    slog_term::TermDecorator::new().stderr().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                Ok(async_root_logger(name, *level, drain))
            }
            ConfigLogging::File { level, path, if_exists } => {
                let mut open_options = OpenOptions::new();
                open_options.write(true);
                match if_exists {
                    ConfigLoggingIfExists::Fail => {
                        open_options.create_new(true);
                    }
                    ConfigLoggingIfExists::Append => {
                        open_options.create(true).append(true);
                    }
                    ConfigLoggingIfExists::Truncate => {
                        open_options.create(true).truncate(true);
                    }
                }
                let drain = log_drain_for_file(name, &open_options, path)?;
                Ok(async_root_logger(name, *level, drain))
            }
        }
    }
}

fn async_root_logger<T>(
    name: &'static str,
    level: ConfigLoggingLevel,
    drain: T,
) -> Logger
where
    T: Drain + Send + 'static,
    <T as Drain>::Err: std::fmt::Debug,
{
    let level_drain = slog::LevelFilter(drain, Level::from(level)).fuse();
    let async_drain = slog_async::Async::new(level_drain).build().fuse();
    Logger::root(async_drain, o!("name" => name))
}

fn log_drain_for_file(
    name: &'static str,
    open_options: &OpenOptions,
    path: &Utf8Path,
) -> Result<
    impl Drain<Ok = (), Err = slog::Never> + Send + 'static,
    ConfigError,
> {
    let open_err = |err: std::io::Error| ConfigError::LogFile {
        path: path.to_owned(),
        err,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(open_err)?;
    }
    let file = open_options.open(path).map_err(open_err)?;

    // The document may be going to stdout; say where the log went.
    eprintln!("note: configured to log to \"{path}\"");
    Ok(slog_bunyan::with_name(name, file).build().fuse())
}
