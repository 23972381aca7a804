use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;
use relayer_core::config::*;

use crate::server::Server;
use crate::settings::parser::ValueParser;
use crate::settings::trace::{fmt::Style, Level, TracingConfig};
use crate::CoreMetrics;

/// Settings every agent shares. Agents embed this in their own settings and
/// expose it through `AsRef<Settings>`.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Port to listen for prometheus scrape requests and control routes
    pub metrics_port: u16,
    /// The tracing configuration
    pub tracing: TracingConfig,
    /// Directory of the rocksdb database
    pub db: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            metrics_port: 9090,
            tracing: TracingConfig::default(),
            db: PathBuf::from("./relayer_db"),
        }
    }
}

impl Settings {
    /// Parse the shared keys `metricsPort`, `log.format`, `log.level` and
    /// `db` out of the root of the config tree.
    pub fn from_parser(p: &ValueParser, err: &mut ConfigParsingError) -> Self {
        let defaults = Self::default();

        let metrics_port = p
            .parse_opt_key("metricsPort", err, ValueParser::parse_u16)
            .unwrap_or(defaults.metrics_port);

        let log = p.get_opt_key("log").take_config_err(err).flatten();
        let fmt = log
            .as_ref()
            .and_then(|log| {
                log.parse_opt_key("format", err, |v| {
                    v.parse_from_str::<Style>("Invalid log format")
                })
            })
            .unwrap_or_default();
        let level = log
            .as_ref()
            .and_then(|log| {
                log.parse_opt_key("level", err, |v| v.parse_from_str::<Level>("Invalid log level"))
            })
            .unwrap_or_default();

        let db = p
            .parse_opt_key("db", err, |v| v.parse_string().map(PathBuf::from))
            .unwrap_or(defaults.db);

        Self {
            metrics_port,
            tracing: TracingConfig::new(fmt, level),
            db,
        }
    }

    /// Create the core metrics from the settings given the name of the agent.
    pub fn metrics(&self, name: &str) -> Result<Arc<CoreMetrics>> {
        Ok(Arc::new(CoreMetrics::new(
            name,
            self.metrics_port,
            prometheus::Registry::new(),
        )?))
    }

    /// Create the server from the settings given the name of the agent.
    pub fn server(&self, core_metrics: Arc<CoreMetrics>) -> Arc<Server> {
        Arc::new(Server::new(self.metrics_port, core_metrics))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_shared_keys() {
        let value = json!({ "metricsport": "9100", "log": { "level": "debug", "format": "json" } });
        let mut err = ConfigParsingError::default();
        let settings = Settings::from_parser(&ValueParser::new(ConfigPath::default(), &value), &mut err);
        assert!(err.is_empty());
        assert_eq!(settings.metrics_port, 9100);
        assert_eq!(settings.tracing.level, Level::Debug);
        assert_eq!(settings.tracing.fmt, Style::Json);
        assert_eq!(settings.db, PathBuf::from("./relayer_db"));
    }

    #[test]
    fn collects_errors() {
        let value = json!({ "metricsPort": "x", "log": { "level": "loud" } });
        let mut err = ConfigParsingError::default();
        let settings = Settings::from_parser(&ValueParser::new(ConfigPath::default(), &value), &mut err);
        assert_eq!(settings.metrics_port, 9090);
        assert_eq!(err.paths().count(), 2);
    }
}
