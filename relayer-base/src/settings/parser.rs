//! Typed access to the merged configuration tree.
//!
//! Values come either from JSON files, where they have their natural types, or
//! from the environment, where everything is a string. The accessors here
//! accept both so the same setting can be given either way.

use std::fmt::Display;
use std::str::FromStr;

use convert_case::{Case, Casing};
use eyre::eyre;
use relayer_core::config::*;
use serde_json::Value;

/// A borrowed node of the configuration tree and the path it was reached by.
#[derive(Debug, Clone)]
pub struct ValueParser<'v> {
    /// Path of this node, used in error messages
    pub cwp: ConfigPath,
    /// The node
    pub val: &'v Value,
}

impl<'v> ValueParser<'v> {
    /// Wrap the node at `cwp`.
    pub fn new(cwp: ConfigPath, val: &'v Value) -> Self {
        Self { cwp, val }
    }

    /// Child `key` of an object node, matched case and separator
    /// insensitively. `None` if absent or null.
    pub fn get_opt_key(&self, key: &str) -> ConfigResult<Option<ValueParser<'v>>> {
        let cwp = &self.cwp + key.to_case(Case::Camel);
        match self.val {
            Value::Object(obj) => {
                let flat = key.to_case(Case::Flat);
                Ok(obj
                    .iter()
                    .find(|(k, _)| k.to_case(Case::Flat) == flat)
                    .map(|(_, v)| v)
                    .filter(|v| !v.is_null())
                    .map(|v| ValueParser::new(cwp, v)))
            }
            Value::Null => Ok(None),
            _ => Err(eyre!("Expected an object at `{}`", self.cwp)).into_config_result(|| cwp),
        }
    }

    /// Child `key` of an object node, which must be present.
    pub fn get_key(&self, key: &str) -> ConfigResult<ValueParser<'v>> {
        self.get_opt_key(key)?
            .ok_or_else(|| eyre!("Expected key `{key}` to be defined"))
            .into_config_result(|| &self.cwp + key.to_case(Case::Camel))
    }

    /// Parse the child `key` with `parse` if it is present, recording any
    /// error in `err`.
    pub fn parse_opt_key<T>(
        &self,
        key: &str,
        err: &mut ConfigParsingError,
        parse: impl FnOnce(&ValueParser<'v>) -> ConfigResult<T>,
    ) -> Option<T> {
        self.get_opt_key(key)
            .take_config_err(err)
            .flatten()
            .and_then(|v| parse(&v).take_config_err(err))
    }

    /// Parse the child `key` with `parse`, recording an error in `err` if it
    /// is missing or malformed.
    pub fn parse_key<T>(
        &self,
        key: &str,
        err: &mut ConfigParsingError,
        parse: impl FnOnce(&ValueParser<'v>) -> ConfigResult<T>,
    ) -> Option<T> {
        self.get_key(key)
            .take_config_err(err)
            .and_then(|v| parse(&v).take_config_err(err))
    }

    /// Entries of an object node.
    pub fn into_obj_iter(self) -> ConfigResult<impl Iterator<Item = (String, ValueParser<'v>)>> {
        let cwp = self.cwp.clone();
        match self.val {
            Value::Object(obj) => Ok(obj
                .iter()
                .map(move |(k, v)| (k.clone(), ValueParser::new(&cwp + k.clone(), v)))),
            _ => Err(eyre!("Expected an object")).into_config_result(|| self.cwp),
        }
    }

    /// Elements of a list node. A list may also be given as an object with
    /// numeric keys, which is how indexed environment variables arrive.
    pub fn into_list_iter(self) -> ConfigResult<Vec<ValueParser<'v>>> {
        match self.val {
            Value::Array(values) => Ok(values
                .iter()
                .enumerate()
                .map(|(i, v)| ValueParser::new(&self.cwp + i.to_string(), v))
                .collect()),
            Value::Object(obj) => {
                let mut entries = obj
                    .iter()
                    .map(|(k, v)| k.parse::<usize>().map(|i| (i, v)))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| eyre!("Expected a list"))
                    .into_config_result(|| self.cwp.clone())?;
                entries.sort_by_key(|(i, _)| *i);
                Ok(entries
                    .into_iter()
                    .map(|(i, v)| ValueParser::new(&self.cwp + i.to_string(), v))
                    .collect())
            }
            _ => Err(eyre!("Expected a list")).into_config_result(|| self.cwp),
        }
    }

    /// A string node.
    pub fn parse_string(&self) -> ConfigResult<&'v str> {
        match self.val {
            Value::String(s) => Ok(s.as_str()),
            _ => Err(eyre!("Expected a string")).into_config_result(|| self.cwp.clone()),
        }
    }

    /// A list of strings, given either as a list or as one comma separated
    /// string. Blank entries are dropped.
    pub fn parse_string_list(&self) -> ConfigResult<Vec<String>> {
        match self.val {
            Value::String(s) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()),
            _ => self
                .clone()
                .into_list_iter()?
                .into_iter()
                .map(|v| v.parse_string().map(str::to_owned))
                .collect(),
        }
    }

    /// Any value with a `FromStr` implementation, given as a string or as a
    /// JSON scalar.
    pub fn parse_from_str<T>(&self, ctx: &'static str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let s = match self.val {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(eyre!("{ctx}: expected a scalar")).into_config_result(|| self.cwp.clone()),
        };
        s.trim()
            .parse::<T>()
            .map_err(|e| eyre!("{ctx}: {e}"))
            .into_config_result(|| self.cwp.clone())
    }

    /// A u64 given as a number or a numeric string.
    pub fn parse_u64(&self) -> ConfigResult<u64> {
        self.parse_from_str("Invalid unsigned integer")
    }

    /// A u32 given as a number or a numeric string.
    pub fn parse_u32(&self) -> ConfigResult<u32> {
        self.parse_from_str("Invalid u32")
    }

    /// A u16 given as a number or a numeric string.
    pub fn parse_u16(&self) -> ConfigResult<u16> {
        self.parse_from_str("Invalid u16")
    }

    /// A bool given as `true`/`false` or their string forms.
    pub fn parse_bool(&self) -> ConfigResult<bool> {
        self.parse_from_str("Invalid boolean")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keys_match_regardless_of_case() {
        let value = json!({ "spyservicehost": "localhost:7073", "chains": { "ethereum": { "rpcUrls": ["a", "b"] } } });
        let p = ValueParser::new(ConfigPath::default(), &value);
        assert_eq!(
            p.get_key("spyServiceHost").unwrap().parse_string().unwrap(),
            "localhost:7073"
        );
        let urls = p
            .get_key("chains")
            .unwrap()
            .get_key("ethereum")
            .unwrap()
            .get_key("rpc_urls")
            .unwrap()
            .parse_string_list()
            .unwrap();
        assert_eq!(urls, vec!["a", "b"]);
    }

    #[test]
    fn scalars_accept_strings() {
        let value = json!({ "port": "9090", "workers": 3, "flag": "true", "keys": "k1, k2,," });
        let p = ValueParser::new(ConfigPath::default(), &value);
        assert_eq!(p.get_key("port").unwrap().parse_u16().unwrap(), 9090);
        assert_eq!(p.get_key("workers").unwrap().parse_u32().unwrap(), 3);
        assert!(p.get_key("flag").unwrap().parse_bool().unwrap());
        assert_eq!(
            p.get_key("keys").unwrap().parse_string_list().unwrap(),
            vec!["k1", "k2"]
        );
    }

    #[test]
    fn errors_name_the_env_var() {
        let value = json!({ "metricsPort": "nope" });
        let p = ValueParser::new(ConfigPath::default(), &value);
        let err = p.get_key("metricsPort").unwrap().parse_u16().unwrap_err();
        assert!(err.to_string().contains("RELAYER_METRICSPORT"));
        let err = p.get_key("missing").unwrap_err();
        assert!(err.to_string().contains("RELAYER_MISSING"));
    }

    #[test]
    fn indexed_objects_are_lists() {
        let value = json!({ "1": "b", "0": "a" });
        let list = ValueParser::new(ConfigPath::default(), &value)
            .parse_string_list()
            .unwrap();
        assert_eq!(list, vec!["a", "b"]);
    }
}
