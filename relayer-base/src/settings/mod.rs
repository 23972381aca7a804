//! Common settings and configuration for relayer agents
//!
//! ### Configuration
//!
//! Agents read settings from the config files and then from the environment.
//!
//! #### N.B.: Environment variable names correspond 1:1 with cfg file's JSON object hierarchy.
//!
//! Any environment variable whose name is prefixed with `RELAYER_` is read as
//! an override applied against the hierarchical structure of the JSON config.
//! Path components are separated by `_` and compared without regard to case
//! or separators, so for the config file
//!
//! ```json
//! {
//!   "spyServiceHost": "localhost:7073",
//!   "chains": {
//!     "ethereum": {
//!       "rpcUrls": ["http://localhost:8545"]
//!     }
//!   }
//! }
//! ```
//!
//! `RELAYER_CHAINS_ETHEREUM_RPCURLS=http://a,http://b` replaces the RPC list
//! and `RELAYER_SPYSERVICEHOST` the spy address.
//!
//! ### Configuration value precedence
//!
//! Configuration key/value pairs are loaded in the following order, with later
//! sources taking precedence:
//!
//! 1. The files matching `config/*.json`.
//! 2. The order of configs in `CONFIG_FILES` with each sequential one
//!    overwriting previous ones as appropriate.
//! 3. Configuration env vars with the prefix `RELAYER_`.

pub use base::*;
pub use loader::load_settings;
pub use parser::ValueParser;
pub use trace::*;

mod base;
mod loader;
mod parser;
/// Tracing subscriber management
pub mod trace;

/// The whole merged configuration tree, parsed by hand through
/// [`ValueParser`] so that errors can name the offending path.
#[derive(Debug, serde::Deserialize)]
#[serde(transparent)]
pub struct RawAgentConf(pub serde_json::Value);

/// Implement `LoadableFromSettings` for the settings object of an agent.
///
/// ```ignore
/// impl_loadable_from_settings!(MyAgent, RawSettingsForMyAgent -> SettingsForMyAgent);
/// ```
#[macro_export]
macro_rules! impl_loadable_from_settings {
    ($agent:ident, $settingsparser:ident -> $settingsobj:ident) => {
        impl relayer_base::LoadableFromSettings for $settingsobj {
            fn load() -> relayer_core::config::ConfigResult<Self> {
                relayer_base::settings::load_settings::<$settingsparser, Self>()
            }
        }
    };
}
