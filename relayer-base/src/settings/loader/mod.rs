//! Load a settings object from the config locations.

use std::{env, error::Error, fmt::Debug, path::PathBuf};

use config::{Config, File};
use convert_case::{Case, Casing};
use eyre::{bail, Context, Result};
use itertools::Itertools;
use relayer_core::config::*;
use serde::de::DeserializeOwned;

use crate::settings::loader::{case_adapter::CaseAdapter, environment::Environment};

mod case_adapter;
mod environment;

/// Directory whose `*.json` files are always loaded.
const DEFAULT_CONFIG_DIR: &str = "./config";

/// Deserialize a settings object from the configs.
///
/// Sources, later ones taking precedence:
/// - every `*.json` file in `./config`, in name order
/// - the comma separated files in `CONFIG_FILES`
/// - environment variables prefixed with `RELAYER_`
pub fn load_settings<T, R>() -> ConfigResult<R>
where
    T: DeserializeOwned + Debug,
    R: FromRawConf<T>,
{
    let root_path = ConfigPath::default();

    let files = config_files().into_config_result(|| root_path.clone())?;
    let config = files
        .iter()
        .fold(Config::builder(), |builder, path| {
            builder.add_source(CaseAdapter::new(File::from(path.as_path()), Case::Flat))
        })
        .add_source(Environment::new(format!("{ENV_PREFIX}_")))
        .build()
        .context("Failed to load config sources")
        .into_config_result(|| root_path.clone())?;

    let raw_config = config
        .try_deserialize::<T>()
        .or_else(|err| {
            let mut err = match err.source() {
                Some(source_err) => {
                    let source = format!("Config error source: {source_err}");
                    Err(err).context(source)
                }
                None => Err(err.into()),
            };
            for path in &files {
                err = err.with_context(|| format!("Config loaded: {}", path.display()));
            }
            err.context("Config deserialization error")
        })
        .into_config_result(|| root_path.clone())?;

    raw_config.parse_config(&root_path)
}

/// The config files to load, lowest precedence first.
fn config_files() -> Result<Vec<PathBuf>> {
    let mut files = vec![];

    let config_dir = PathBuf::from(DEFAULT_CONFIG_DIR);
    if config_dir.is_dir() {
        let mut defaults = config_dir
            .read_dir()
            .context("Failed to open config directory")?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_json(path))
            .collect_vec();
        defaults.sort();
        files.extend(defaults);
    }

    let requested = env::var("CONFIG_FILES").unwrap_or_default();
    for path in requested.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        if !path.exists() {
            bail!("Provided config path via CONFIG_FILES does not exist ({path:?})");
        }
        if !path.is_file() {
            bail!("Provided config path via CONFIG_FILES is not a file ({path:?})");
        }
        if !is_json(&path) {
            bail!("Provided config path via CONFIG_FILES is of an unsupported type ({path:?})");
        }
        files.push(path);
    }

    Ok(files)
}

fn is_json(path: &std::path::Path) -> bool {
    path.extension() == Some("json".as_ref())
}

/// Re-case each `sep` separated component of `key` and re-join them with the
/// `config` crate separator `.`.
fn split_and_recase_key(sep: &str, case: Option<Case>, key: String) -> String {
    match case {
        Some(case) => key.split(sep).map(|s| s.to_case(case)).join("."),
        None if !sep.is_empty() && sep != "." => key.replace(sep, "."),
        None => key,
    }
}
