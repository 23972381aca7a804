//! Relayer configuration
//!
//! Every key can be given in a JSON config file or as a `RELAYER_` prefixed
//! environment variable, see [`relayer_base::settings`]. The guardian REST
//! hosts default to those of `network` unless `guardianRpc.hosts` is set.
//! A minimal file:
//!
//! ```json
//! {
//!   "network": "testnet",
//!   "spy": { "host": "http://localhost:7073" },
//!   "routes": [
//!     { "emitterChain": "ethereum", "emitterAddress": "0x3ee1...", "targetChain": "alephium" }
//!   ],
//!   "chains": {
//!     "alephium": {
//!       "rpcUrls": "http://localhost:22973",
//!       "privateKeys": "0x...",
//!       "tokenBridge": "0x...",
//!       "tokenBridgeAddress": "2A...",
//!       "completeTransferScript": "0101...{0}..."
//!     }
//!   }
//! }
//! ```

use std::{collections::HashMap, str::FromStr, time::Duration};

use derive_more::{AsMut, AsRef, Deref, DerefMut};
use eyre::eyre;
use itertools::Itertools;
use relayer_base::{
    impl_loadable_from_settings,
    settings::{Settings, ValueParser},
};
use relayer_core::{
    config::*,
    vaa::{parse_emitter_address, EmitterRoute},
    ChainFamily, ChainId, GuardianSet, KnownChain, H160, H256,
};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::settings::matching_list::MatchingList;

pub mod matching_list;

/// Settings for `Relayer`
#[derive(Debug, AsRef, AsMut, Deref, DerefMut)]
pub struct RelayerSettings {
    #[as_ref]
    #[as_mut]
    #[deref]
    #[deref_mut]
    pub base: Settings,

    /// Chains the relayer submits to, by chain id
    pub chains: HashMap<ChainId, ChainConf>,
    /// Streams to subscribe to and scan for missed VAAs
    pub routes: Vec<EmitterRoute>,
    /// Filter for what VAAs to relay.
    pub whitelist: MatchingList,
    /// Filter for what VAAs to block.
    pub blacklist: MatchingList,
    /// Guardian sets VAAs are verified against. Verification is skipped when
    /// empty.
    pub guardian_sets: Vec<GuardianSet>,
    /// Wormhole network the relayer serves
    pub network: Network,
    /// Public guardian REST endpoints VAAs are fetched from
    pub guardian_rpc: GuardianRpcConf,
    /// Spy service streaming signed VAAs
    pub spy: Option<SpyConf>,
    /// Explorer used to look up the source transaction of a VAA
    pub explorer: Option<ExplorerConf>,
    /// Job queue behaviour
    pub queue: QueueConf,
    /// Missed VAA job behaviour
    pub missed_vaas: MissedVaasConf,
}

/// Connection and signing settings of one target chain
#[derive(Clone)]
pub struct ChainConf {
    /// The chain
    pub chain: KnownChain,
    /// Node endpoints, the first one is used for submissions
    pub rpc_urls: Vec<Url>,
    /// One wallet worker is started per key
    pub private_keys: Vec<H256>,
    /// Emitter address of the token bridge deployed on this chain
    pub token_bridge: H256,
    /// Token address of the chain's wrapped native asset, as it appears in
    /// transfer payloads
    pub wrapped_native: Option<H256>,
    /// Family specific settings
    pub connection: ChainConnectionConf,
}

impl std::fmt::Debug for ChainConf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConf")
            .field("chain", &self.chain)
            .field("rpc_urls", &self.rpc_urls)
            .field("private_keys", &self.private_keys.len())
            .field("token_bridge", &self.token_bridge)
            .field("wrapped_native", &self.wrapped_native)
            .field("connection", &self.connection)
            .finish()
    }
}

impl ChainConf {
    /// Wormhole chain id
    pub fn id(&self) -> ChainId {
        self.chain.id()
    }
}

/// Settings that only make sense for one chain family
#[derive(Clone, Debug)]
pub enum ChainConnectionConf {
    /// An EVM chain
    Evm {
        /// EIP-155 chain id used to sign transactions
        evm_chain_id: u64,
    },
    /// An Alephium network
    Alephium(AlephiumConf),
}

/// Alephium full node settings
#[derive(Clone, Debug)]
pub struct AlephiumConf {
    /// Address group the relayer's keys live in
    pub group: u32,
    /// Base58 address of the token bridge contract
    pub token_bridge_address: String,
    /// Index of the method answering whether a transfer has been redeemed
    pub transfer_completed_method_index: u32,
    /// Hex bytecode of the redemption script with `{0}` in place of the VAA
    pub complete_transfer_script: String,
    /// Delay between transaction status polls
    pub poll_interval: Duration,
    /// Status polls before a submitted transaction is given up on
    pub max_polls: u32,
}

/// Wormhole network, selecting the default guardian endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Network {
    /// Production guardians
    #[default]
    Mainnet,
    /// Testnet guardians
    Testnet,
    /// A local guardian devnet
    Devnet,
}

impl Network {
    /// Public guardian REST hosts of this network.
    pub fn guardian_hosts(&self) -> &'static [&'static str] {
        match self {
            Network::Mainnet => &[
                "https://wormhole-v2-mainnet-api.certus.one",
                "https://wormhole.inotel.ro",
                "https://wormhole-v2-mainnet-api.mcf.rocks",
                "https://wormhole-v2-mainnet-api.chainlayer.network",
            ],
            Network::Testnet => &["https://wormhole-v2-testnet-api.certus.one"],
            Network::Devnet => &["http://localhost:7071"],
        }
    }
}

/// Guardian REST endpoints
#[derive(Clone, Debug)]
pub struct GuardianRpcConf {
    /// Hosts, tried in order
    pub hosts: Vec<Url>,
    /// Rounds over all hosts before giving up
    pub retries: usize,
    /// Delay between rounds
    pub retry_timeout: Duration,
}

/// Spy service endpoint
#[derive(Clone, Debug)]
pub struct SpyConf {
    /// gRPC endpoint, e.g. `http://localhost:7073`
    pub host: String,
    /// Delay before reconnecting after the stream ends
    pub reconnect_backoff: Duration,
}

/// Explorer endpoint
#[derive(Clone, Debug)]
pub struct ExplorerConf {
    /// Explorer API base url
    pub url: Url,
    /// Attempts per lookup
    pub retries: usize,
    /// Base of the linear backoff between attempts
    pub backoff: Duration,
}

/// Job queue settings
#[derive(Clone, Debug)]
pub struct QueueConf {
    /// Concurrent workers
    pub workers: usize,
    /// Attempts before a job is moved to the failed set
    pub max_attempts: u32,
    /// Base of the exponential backoff between attempts
    pub backoff: Duration,
    /// How long completed and failed jobs are kept
    pub retention: Duration,
}

impl Default for QueueConf {
    fn default() -> Self {
        Self {
            workers: 3,
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Missed VAA job settings
#[derive(Clone, Debug)]
pub struct MissedVaasConf {
    /// Whether the job runs at all
    pub enabled: bool,
    /// Delay between sweeps
    pub interval: Duration,
    /// How long a fetch claims a sequence
    pub in_progress_ttl: Duration,
}

impl Default for MissedVaasConf {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            in_progress_ttl: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawRelayerSettings(Value);

impl_loadable_from_settings!(Relayer, RawRelayerSettings -> RelayerSettings);

impl FromRawConf<RawRelayerSettings> for RelayerSettings {
    fn from_config(raw: RawRelayerSettings, cwp: &ConfigPath) -> ConfigResult<Self> {
        let mut err = ConfigParsingError::default();

        let p = ValueParser::new(cwp.clone(), &raw.0);

        let base = Settings::from_parser(&p, &mut err);

        let chains = p
            .get_opt_key("chains")
            .take_config_err(&mut err)
            .flatten()
            .and_then(|chains| chains.into_obj_iter().take_config_err(&mut err))
            .map(|chains| {
                chains
                    .filter_map(|(name, chain)| parse_chain(&name, &chain, &mut err))
                    .map(|conf| (conf.id(), conf))
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();

        let routes = p
            .parse_opt_key("routes", &mut err, |v| v.clone().into_list_iter())
            .map(|routes| {
                routes
                    .iter()
                    .filter_map(|route| parse_route(route, &mut err))
                    .collect_vec()
            })
            .unwrap_or_default();

        let whitelist = p
            .parse_opt_key("whitelist", &mut err, parse_matching_list)
            .unwrap_or_default();
        let blacklist = p
            .parse_opt_key("blacklist", &mut err, parse_matching_list)
            .unwrap_or_default();

        let guardian_sets = p
            .parse_opt_key("guardianSets", &mut err, |v| v.clone().into_list_iter())
            .map(|sets| {
                sets.iter()
                    .filter_map(|set| parse_guardian_set(set, &mut err))
                    .collect_vec()
            })
            .unwrap_or_default();

        let network = p
            .parse_opt_key("network", &mut err, |v| v.parse_from_str("Invalid network"))
            .unwrap_or_default();

        let guardian_rpc = {
            let g = p
                .get_opt_key("guardianRpc")
                .take_config_err(&mut err)
                .flatten();
            let hosts = g
                .as_ref()
                .and_then(|g| g.parse_opt_key("hosts", &mut err, parse_url_list))
                .unwrap_or_else(|| default_guardian_hosts(network));
            if hosts.is_empty() {
                Err::<(), _>(eyre!("At least one guardian host is required"))
                    .take_err(&mut err, || &(cwp + "guardianRpc") + "hosts");
            }
            GuardianRpcConf {
                hosts,
                retries: g
                    .as_ref()
                    .and_then(|g| {
                        g.parse_opt_key("retries", &mut err, |v| v.parse_from_str("Invalid retries"))
                    })
                    .unwrap_or(3),
                retry_timeout: g
                    .as_ref()
                    .and_then(|g| g.parse_opt_key("retryTimeoutMs", &mut err, parse_millis))
                    .unwrap_or(Duration::from_secs(1)),
            }
        };

        let spy = p
            .get_opt_key("spy")
            .take_config_err(&mut err)
            .flatten()
            .and_then(|s| {
                Some(SpyConf {
                    host: s.parse_key("host", &mut err, |v| v.parse_string().map(str::to_owned))?,
                    reconnect_backoff: s
                        .parse_opt_key("reconnectBackoffMs", &mut err, parse_millis)
                        .unwrap_or(Duration::from_secs(5)),
                })
            });

        let explorer = p
            .get_opt_key("explorer")
            .take_config_err(&mut err)
            .flatten()
            .and_then(|e| {
                Some(ExplorerConf {
                    url: e.parse_key("url", &mut err, |v| v.parse_from_str("Invalid url"))?,
                    retries: e
                        .parse_opt_key("retries", &mut err, |v| v.parse_from_str("Invalid retries"))
                        .unwrap_or(3),
                    backoff: e
                        .parse_opt_key("backoffMs", &mut err, parse_millis)
                        .unwrap_or(Duration::from_secs(1)),
                })
            });

        let queue = {
            let defaults = QueueConf::default();
            let q = p.get_opt_key("queue").take_config_err(&mut err).flatten();
            match q {
                Some(q) => QueueConf {
                    workers: q
                        .parse_opt_key("workers", &mut err, |v| v.parse_from_str("Invalid workers"))
                        .unwrap_or(defaults.workers),
                    max_attempts: q
                        .parse_opt_key("maxAttempts", &mut err, ValueParser::parse_u32)
                        .unwrap_or(defaults.max_attempts),
                    backoff: q
                        .parse_opt_key("backoffMs", &mut err, parse_millis)
                        .unwrap_or(defaults.backoff),
                    retention: q
                        .parse_opt_key("retentionSecs", &mut err, |v| {
                            v.parse_u64().map(Duration::from_secs)
                        })
                        .unwrap_or(defaults.retention),
                },
                None => defaults,
            }
        };
        if queue.workers == 0 || queue.max_attempts == 0 {
            Err::<(), _>(eyre!("Queue workers and max attempts must be positive"))
                .take_err(&mut err, || cwp + "queue");
        }

        let missed_vaas = {
            let defaults = MissedVaasConf::default();
            let m = p.get_opt_key("missedVaas").take_config_err(&mut err).flatten();
            match m {
                Some(m) => MissedVaasConf {
                    enabled: m
                        .parse_opt_key("enabled", &mut err, ValueParser::parse_bool)
                        .unwrap_or(defaults.enabled),
                    interval: m
                        .parse_opt_key("intervalMs", &mut err, parse_millis)
                        .unwrap_or(defaults.interval),
                    in_progress_ttl: m
                        .parse_opt_key("inProgressTtlMs", &mut err, parse_millis)
                        .unwrap_or(defaults.in_progress_ttl),
                },
                None => defaults,
            }
        };

        err.into_result(Self {
            base,
            chains,
            routes,
            whitelist,
            blacklist,
            guardian_sets,
            network,
            guardian_rpc,
            spy,
            explorer,
            queue,
            missed_vaas,
        })
    }
}

fn parse_millis(v: &ValueParser) -> ConfigResult<Duration> {
    v.parse_u64().map(Duration::from_millis)
}

fn default_guardian_hosts(network: Network) -> Vec<Url> {
    network
        .guardian_hosts()
        .iter()
        .filter_map(|host| Url::parse(host).ok())
        .collect()
}

fn parse_url_list(v: &ValueParser) -> ConfigResult<Vec<Url>> {
    v.parse_string_list()?
        .iter()
        .map(|s| {
            Url::parse(s)
                .map_err(|e| eyre!("Invalid url `{s}`: {e}"))
                .into_config_result(|| v.cwp.clone())
        })
        .collect()
}

/// A chain given by id or by name.
fn parse_chain_id(v: &ValueParser) -> ConfigResult<ChainId> {
    v.parse_u16().or_else(|_| {
        v.parse_from_str::<KnownChain>("Unknown chain")
            .map(|chain| chain.id())
    })
}

fn parse_address(v: &ValueParser) -> ConfigResult<H256> {
    let s = v.parse_string()?;
    parse_emitter_address(s)
        .ok_or_else(|| eyre!("Invalid address `{s}`"))
        .into_config_result(|| v.cwp.clone())
}

fn parse_private_keys(v: &ValueParser) -> ConfigResult<Vec<H256>> {
    v.parse_string_list()?
        .iter()
        .map(|key| {
            let key = key.strip_prefix("0x").unwrap_or(key);
            hex::decode(key)
                .ok()
                .filter(|bytes| bytes.len() == 32)
                .map(|bytes| H256::from_slice(&bytes))
                .ok_or_else(|| eyre!("Private keys must be 32 hex encoded bytes"))
                .into_config_result(|| v.cwp.clone())
        })
        .collect()
}

/// Matching lists are given as JSON, either inline in a config file or as a
/// string in an environment variable.
fn parse_matching_list(v: &ValueParser) -> ConfigResult<MatchingList> {
    let parsed = match v.val {
        Value::String(s) => serde_json::from_str(s),
        other => serde_json::from_value(other.clone()),
    };
    parsed
        .map_err(|e| eyre!("Invalid matching list: {e}"))
        .into_config_result(|| v.cwp.clone())
}

fn parse_route(p: &ValueParser, err: &mut ConfigParsingError) -> Option<EmitterRoute> {
    let emitter_chain = p.parse_key("emitterChain", err, parse_chain_id);
    let emitter_address = p.parse_key("emitterAddress", err, parse_address);
    let target_chain = p.parse_key("targetChain", err, parse_chain_id);
    Some(EmitterRoute {
        emitter_chain: emitter_chain?,
        emitter_address: emitter_address?,
        target_chain: target_chain?,
    })
}

fn parse_guardian_set(p: &ValueParser, err: &mut ConfigParsingError) -> Option<GuardianSet> {
    let index = p.parse_key("index", err, ValueParser::parse_u32);
    let addresses = p.parse_key("addresses", err, |v| {
        v.parse_string_list()?
            .iter()
            .map(|a| {
                let hex_str = a.strip_prefix("0x").unwrap_or(a);
                hex::decode(hex_str)
                    .ok()
                    .filter(|bytes| bytes.len() == 20)
                    .map(|bytes| H160::from_slice(&bytes))
                    .ok_or_else(|| eyre!("Invalid guardian address `{a}`"))
                    .into_config_result(|| v.cwp.clone())
            })
            .collect::<ConfigResult<Vec<_>>>()
    });
    let expiration_time = p
        .parse_opt_key("expirationTime", err, ValueParser::parse_u32)
        .unwrap_or(0);
    Some(GuardianSet {
        index: index?,
        addresses: addresses?,
        expiration_time,
    })
}

fn parse_chain(name: &str, p: &ValueParser, err: &mut ConfigParsingError) -> Option<ChainConf> {
    let chain = KnownChain::from_str(name)
        .map_err(|_| eyre!("Unknown chain `{name}`"))
        .take_err(err, || p.cwp.clone())?;

    let rpc_urls = p.parse_key("rpcUrls", err, parse_url_list);
    if rpc_urls.as_ref().is_some_and(Vec::is_empty) {
        Err::<(), _>(eyre!("At least one rpc url is required"))
            .take_err(err, || &p.cwp + "rpcUrls");
    }
    let private_keys = p
        .parse_opt_key("privateKeys", err, parse_private_keys)
        .unwrap_or_default();
    let token_bridge = p.parse_key("tokenBridge", err, parse_address);
    let wrapped_native = p.parse_opt_key("wrappedNative", err, parse_address);

    let connection = match chain.family() {
        ChainFamily::Evm => {
            let evm_chain_id = p
                .parse_opt_key("evmChainId", err, ValueParser::parse_u64)
                .or_else(|| chain.evm_chain_id());
            Some(ChainConnectionConf::Evm {
                evm_chain_id: evm_chain_id?,
            })
        }
        ChainFamily::Alephium => {
            let token_bridge_address = p.parse_key("tokenBridgeAddress", err, |v| {
                v.parse_string().map(str::to_owned)
            });
            let complete_transfer_script = p.parse_key("completeTransferScript", err, |v| {
                let script = v.parse_string()?;
                if script.contains("{0}") {
                    Ok(script.to_owned())
                } else {
                    Err(eyre!("The script template must contain `{{0}}`"))
                        .into_config_result(|| v.cwp.clone())
                }
            });
            let transfer_completed_method_index =
                p.parse_key("transferCompletedMethodIndex", err, ValueParser::parse_u32);
            Some(ChainConnectionConf::Alephium(AlephiumConf {
                group: p
                    .parse_opt_key("group", err, ValueParser::parse_u32)
                    .unwrap_or(0),
                token_bridge_address: token_bridge_address?,
                transfer_completed_method_index: transfer_completed_method_index?,
                complete_transfer_script: complete_transfer_script?,
                poll_interval: p
                    .parse_opt_key("pollIntervalMs", err, parse_millis)
                    .unwrap_or(Duration::from_secs(4)),
                max_polls: p
                    .parse_opt_key("maxPolls", err, ValueParser::parse_u32)
                    .unwrap_or(45),
            }))
        }
        ChainFamily::Solana => {
            Err::<(), _>(eyre!("Cannot relay to {chain}")).take_err(err, || p.cwp.clone());
            None
        }
    };

    Some(ChainConf {
        chain,
        rpc_urls: rpc_urls?,
        private_keys,
        token_bridge: token_bridge?,
        wrapped_native,
        connection: connection?,
    })
}
