use std::fmt::Debug;

use config::{ConfigError, Map, Source, Value, ValueKind};
use convert_case::{Case, Casing};
use derive_new::new;

/// Re-case every key a source produces, including the keys of nested tables,
/// so that files and the environment merge into the same tree.
#[derive(Clone, Debug, new)]
pub struct CaseAdapter<S> {
    inner: S,
    casing: Case,
}

impl<S> Source for CaseAdapter<S>
where
    S: Source + Clone + Send + Sync + 'static,
{
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        self.inner.collect().map(|config| {
            config
                .into_iter()
                .map(|(k, v)| {
                    (
                        super::split_and_recase_key(".", Some(self.casing), k),
                        recase_value(v, self.casing),
                    )
                })
                .collect()
        })
    }
}

fn recase_value(mut value: Value, casing: Case) -> Value {
    value.kind = match value.kind {
        ValueKind::Table(table) => ValueKind::Table(
            table
                .into_iter()
                .map(|(k, v)| (k.to_case(casing), recase_value(v, casing)))
                .collect(),
        ),
        ValueKind::Array(values) => ValueKind::Array(
            values
                .into_iter()
                .map(|v| recase_value(v, casing))
                .collect(),
        ),
        kind => kind,
    };
    value
}

#[cfg(test)]
mod tests {
    use config::File;
    use config::FileFormat;

    use super::*;

    #[test]
    fn nested_keys_are_recased() {
        let source = File::from_str(
            r#"{ "spyServiceHost": "x", "chains": { "ethereum": { "rpcUrls": ["a"] } } }"#,
            FileFormat::Json,
        );
        let config = CaseAdapter::new(source, Case::Flat).collect().unwrap();
        assert!(config.contains_key("spyservicehost"));
        let ValueKind::Table(chains) = &config["chains"].kind else {
            panic!("chains is not a table");
        };
        let ValueKind::Table(ethereum) = &chains["ethereum"].kind else {
            panic!("ethereum is not a table");
        };
        assert!(ethereum.contains_key("rpcurls"));
    }
}
