use std::env;

use config::{ConfigError, Map, Source, Value, ValueKind};
use convert_case::{Case, Casing};
use itertools::Itertools;

const ORIGIN: &str = "program environment";

/// Environment variables under a prefix, as a config source.
///
/// `RELAYER_CHAINS_ETHEREUM_RPCURLS` becomes `chains.ethereum.rpcurls`: the
/// prefix is stripped, the rest is split on `_` and every segment is
/// lowercased. Empty variables count as unset, so a blank value can not mask
/// a value from a config file.
#[must_use]
#[derive(Clone, Debug)]
pub struct Environment {
    prefix: String,
    /// Used instead of the process environment when set.
    vars: Option<Vec<(String, String)>>,
}

impl Environment {
    /// Source of every variable starting with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read `vars` instead of the process environment.
    #[cfg(test)]
    pub fn with_vars<'a>(mut self, vars: impl IntoIterator<Item = &'a (&'a str, &'a str)>) -> Self {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        );
        self
    }

    /// The config key of the variable `name`, if it is one of ours.
    fn config_key(&self, name: &str) -> Option<String> {
        let rest = name.strip_prefix(&self.prefix)?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.split('_').map(|s| s.to_case(Case::Flat)).join("."))
    }

    fn entry(&self, (name, value): (String, String)) -> Option<(String, Value)> {
        if value.trim().is_empty() {
            return None;
        }
        let key = self.config_key(&name)?;
        let origin = ORIGIN.to_owned();
        Some((key, Value::new(Some(&origin), ValueKind::String(value))))
    }
}

impl Source for Environment {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        Ok(match &self.vars {
            Some(vars) => vars
                .iter()
                .cloned()
                .filter_map(|var| self.entry(var))
                .collect(),
            None => env::vars().filter_map(|var| self.entry(var)).collect(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const VARS: &[(&str, &str)] = &[
        ("RELAYER_NETWORK", "testnet"),
        ("RELAYER_SPY_HOST", "http://localhost:7073"),
        ("RELAYER_CHAINS_ETHEREUM_RPCURLS", "http://a,http://b"),
        ("RELAYER_MISSEDVAAS_ENABLED", " "),
        ("RELAYER_", "nothing"),
        ("OTHER_KEY", "ignored"),
    ];

    fn string(config: &Map<String, Value>, key: &str) -> Option<String> {
        config.get(key).map(|v| v.clone().into_string().unwrap())
    }

    #[test]
    fn maps_prefixed_variables() {
        let config = Environment::new("RELAYER_")
            .with_vars(VARS)
            .collect()
            .unwrap();

        assert_eq!(string(&config, "network").as_deref(), Some("testnet"));
        assert_eq!(
            string(&config, "spy.host").as_deref(),
            Some("http://localhost:7073")
        );
        assert_eq!(
            string(&config, "chains.ethereum.rpcurls").as_deref(),
            Some("http://a,http://b")
        );
        assert_eq!(config.len(), 3, "{config:?}");
    }

    #[test]
    fn recases_segments() {
        let env = Environment::new("RELAYER_");
        assert_eq!(
            env.config_key("RELAYER_GUARDIANRPC_RetryTimeoutMs").as_deref(),
            Some("guardianrpc.retrytimeoutms")
        );
        assert_eq!(env.config_key("RELAYERX"), None);
    }
}
