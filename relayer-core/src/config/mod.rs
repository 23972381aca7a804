//! A set of traits and types to make configuration parsing easier. The main
//! flow is to define a config struct and then a raw config struct which mirrors
//! it but is more forgiving for the deserialization, and then to implement
//! `FromRawConf` which will allow for better error messages.

use std::fmt::{Debug, Display, Formatter};

use eyre::Report;

pub use config_path::{ConfigPath, ENV_PREFIX};
pub use trait_ext::*;

mod config_path;
mod trait_ext;

/// A result type that is used for config parsing and may contain multiple
/// errors.
pub type ConfigResult<T> = Result<T, ConfigParsingError>;

/// A trait that allows for constructing `Self` from a raw config type.
pub trait FromRawConf<T>: Sized
where
    // technically we don't need this bound but it enforces
    // the correct usage.
    T: Debug,
{
    /// Construct `Self` from a raw config type.
    /// - `raw` is the raw config value
    /// - `cwp` is the current working path
    fn from_config(raw: T, cwp: &ConfigPath) -> ConfigResult<Self>;
}

/// A trait that allows for converting a raw config type into a "parsed" type.
pub trait IntoParsedConf: Debug + Sized {
    /// Parse the config.
    fn parse_config<O: FromRawConf<Self>>(self, cwp: &ConfigPath) -> ConfigResult<O> {
        O::from_config(self, cwp)
    }
}

impl<S: Debug> IntoParsedConf for S {}

/// A composite error type that allows for compiling multiple errors into a
/// single result. Use `default()` to create an empty error and then take other
/// errors using the extension traits or directly push them.
#[must_use]
#[derive(Debug, Default)]
pub struct ConfigParsingError(Vec<(ConfigPath, Report)>);

impl ConfigParsingError {
    /// Add a new error to the list.
    pub fn push(&mut self, conf_path: ConfigPath, report: Report) {
        self.0.push((conf_path, report));
    }

    /// Merge all the individual errors from two `ConfigParsingErrors`.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Whether no errors have been collected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Paths of the collected errors, in the order they were pushed.
    pub fn paths(&self) -> impl Iterator<Item = &ConfigPath> {
        self.0.iter().map(|(path, _)| path)
    }

    /// Convert this error into a result, returning `Ok(value)` if there are
    /// no errors.
    pub fn into_result<T>(self, value: T) -> ConfigResult<T> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl FromIterator<ConfigParsingError> for ConfigParsingError {
    fn from_iter<T: IntoIterator<Item = ConfigParsingError>>(iter: T) -> Self {
        Self(iter.into_iter().flat_map(|e| e.0).collect())
    }
}

impl Display for ConfigParsingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ParsingError")?;
        for (path, report) in &self.0 {
            writeln!(f, "\n#####\n")?;
            writeln!(f, "config_path: `{path}`")?;
            writeln!(f, "env_path: `{}`", path.env_name())?;
            writeln!(f, "error: {report:?}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigParsingError {}
