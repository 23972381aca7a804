use std::{env, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use eyre::Result;
use relayer_core::config::*;
use tracing::{info, warn};

use crate::{metrics::CoreMetrics, settings::Settings};

/// Settings of an agent defined from configuration
pub trait LoadableFromSettings: AsRef<Settings> + Sized {
    /// Create a new instance of these settings by reading the configs and env
    /// vars.
    fn load() -> ConfigResult<Self>;
}

/// A fundamental agent which does not make any assumptions about the tools
/// which are used.
#[async_trait]
pub trait BaseAgent: Send + Sync + Debug {
    /// The agent's name
    const AGENT_NAME: &'static str;

    /// The settings object for this agent
    type Settings: LoadableFromSettings;

    /// Instantiate the agent from the standard settings object
    async fn from_settings(settings: Self::Settings, metrics: Arc<CoreMetrics>) -> Result<Self>
    where
        Self: Sized;

    /// Start running this agent.
    #[allow(clippy::async_yields_async)]
    async fn run(self);
}

/// Install the report handler picked by `ONELINE_BACKTRACES`.
fn install_error_handler() -> Result<()> {
    let oneline = env::var("ONELINE_BACKTRACES")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if oneline {
        #[cfg(feature = "oneline-errors")]
        return crate::oneline_eyre::install();
        #[cfg(not(feature = "oneline-errors"))]
        eyre::bail!("The oneline errors feature was not included");
    }
    #[cfg(feature = "color-eyre")]
    color_eyre::install()?;
    Ok(())
}

/// Run agent `A` from `main` until all its tasks end or the process is
/// interrupted. Sets up error reporting, settings, metrics and tracing first.
pub async fn agent_main<A: BaseAgent>() -> Result<()> {
    install_error_handler()?;

    let settings = A::Settings::load()?;
    let core_settings: &Settings = settings.as_ref();

    let metrics = core_settings.metrics(A::AGENT_NAME)?;
    core_settings.tracing.start_tracing(&metrics)?;
    info!(
        agent = A::AGENT_NAME,
        version = env!("CARGO_PKG_VERSION"),
        db = %core_settings.db.display(),
        "Starting agent"
    );
    let agent = A::from_settings(settings, metrics).await?;

    tokio::select! {
        _ = agent.run() => info!(agent = A::AGENT_NAME, "All agent tasks stopped"),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!(agent = A::AGENT_NAME, "Received interrupt"),
            Err(err) => warn!(?err, "Failed to listen for interrupts"),
        },
    }
    info!(agent = A::AGENT_NAME, "Shutting down agent...");
    Ok(())
}
