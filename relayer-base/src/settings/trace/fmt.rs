use serde::Deserialize;
use tracing::Subscriber;
use tracing_subscriber::{registry::LookupSpan, Layer};

/// Basic tracing configuration
#[derive(
    Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, strum::EnumString, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Style {
    /// Pretty print
    Pretty,
    /// JSON
    Json,
    /// Compact
    Compact,
    /// Default style
    #[default]
    #[serde(other)]
    Full,
}

/// A stdout log layer of one of the supported styles
pub type LogOutputLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

impl Style {
    /// The `fmt` layer for this style.
    pub fn layer<S>(self) -> LogOutputLayer<S>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = tracing_subscriber::fmt::layer();
        match self {
            Style::Pretty => layer.pretty().boxed(),
            Style::Json => layer.json().boxed(),
            Style::Compact => layer.compact().boxed(),
            Style::Full => layer.boxed(),
        }
    }
}
