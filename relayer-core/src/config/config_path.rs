use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::sync::Arc;

use convert_case::{Case, Casing};
use itertools::Itertools;

/// Prefix every environment variable read by the relayer carries.
pub const ENV_PREFIX: &str = "RELAYER";

/// Path within a config tree.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigPath(Vec<Arc<String>>);

impl Display for ConfigPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.json_name())
    }
}

impl<S: Into<String>> Add<S> for &ConfigPath {
    type Output = ConfigPath;

    fn add(self, rhs: S) -> Self::Output {
        self.join(rhs)
    }
}

impl ConfigPath {
    /// Add a new part to the path.
    pub fn join(&self, part: impl Into<String>) -> Self {
        let part = part.into();
        debug_assert!(!part.contains('.'));
        let mut new = self.clone();
        new.0.push(Arc::new(part));
        new
    }

    /// Get the JSON formatted path.
    pub fn json_name(&self) -> String {
        self.0
            .iter()
            .map(|s| s.as_str().to_case(Case::Camel))
            .join(".")
    }

    /// Get the environment variable formatted path.
    pub fn env_name(&self) -> String {
        [ENV_PREFIX]
            .into_iter()
            .chain(self.0.iter().map(|s| s.as_str()))
            .map(|s| s.to_uppercase())
            .join("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        let path = &(&ConfigPath::default() + "chains") + "ethereum";
        assert_eq!(path.json_name(), "chains.ethereum");
        assert_eq!(path.env_name(), "RELAYER_CHAINS_ETHEREUM");
        assert_eq!(
            (&ConfigPath::default() + "spy_service_host").json_name(),
            "spyServiceHost"
        );
    }
}
