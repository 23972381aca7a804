//! Construction of token bridge clients from chain settings.

use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};
use relayer_core::{TokenBridgeReader, TokenBridgeWriter};

use crate::settings::{ChainConf, ChainConnectionConf};

pub use alephium::{AlephiumTokenBridgeReader, AlephiumTokenBridgeWriter};
pub use ethereum::{EthereumTokenBridgeReader, EthereumTokenBridgeWriter};

mod alephium;
mod ethereum;

/// One reader per configured rpc url, in configuration order.
pub fn build_readers(conf: &ChainConf) -> Result<Vec<Arc<dyn TokenBridgeReader>>> {
    let chain = conf.id();
    conf.rpc_urls
        .iter()
        .map(|url| -> Result<Arc<dyn TokenBridgeReader>> {
            Ok(match &conf.connection {
                ChainConnectionConf::Evm { .. } => Arc::new(
                    EthereumTokenBridgeReader::new(chain, url, &conf.token_bridge)
                        .wrap_err_with(|| format!("connecting to {url}"))?,
                ),
                ChainConnectionConf::Alephium(alephium) => Arc::new(
                    AlephiumTokenBridgeReader::new(chain, url.clone(), alephium.clone()),
                ),
            })
        })
        .collect()
}

/// One writer per configured private key, all submitting through the first
/// rpc url.
pub fn build_writers(conf: &ChainConf) -> Result<Vec<Arc<dyn TokenBridgeWriter>>> {
    let chain = conf.id();
    let url = conf
        .rpc_urls
        .first()
        .ok_or_else(|| eyre!("No rpc url configured for {}", conf.chain))?;
    conf.private_keys
        .iter()
        .map(|key| -> Result<Arc<dyn TokenBridgeWriter>> {
            Ok(match &conf.connection {
                ChainConnectionConf::Evm { evm_chain_id } => Arc::new(
                    EthereumTokenBridgeWriter::new(
                        chain,
                        url,
                        &conf.token_bridge,
                        key,
                        *evm_chain_id,
                    )?,
                ),
                ChainConnectionConf::Alephium(alephium) => Arc::new(
                    AlephiumTokenBridgeWriter::new(chain, url.clone(), alephium.clone(), key)?,
                ),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relayer_core::{KnownChain, H256};
    use url::Url;

    use super::*;
    use crate::settings::AlephiumConf;

    fn conf(connection: ChainConnectionConf, chain: KnownChain) -> ChainConf {
        ChainConf {
            chain,
            rpc_urls: vec![
                Url::parse("http://node-a:8545").unwrap(),
                Url::parse("http://node-b:8545").unwrap(),
            ],
            private_keys: vec![H256::repeat_byte(1), H256::repeat_byte(2), H256::repeat_byte(3)],
            token_bridge: H256::repeat_byte(9),
            wrapped_native: None,
            connection,
        }
    }

    #[test]
    fn one_reader_per_url_one_writer_per_key() {
        let evm = conf(ChainConnectionConf::Evm { evm_chain_id: 1 }, KnownChain::Ethereum);
        assert_eq!(build_readers(&evm).unwrap().len(), 2);
        let writers = build_writers(&evm).unwrap();
        assert_eq!(writers.len(), 3);
        assert!(writers.iter().all(|w| w.chain() == 2));

        let alephium = conf(
            ChainConnectionConf::Alephium(AlephiumConf {
                group: 0,
                token_bridge_address: "bridge".into(),
                transfer_completed_method_index: 4,
                complete_transfer_script: "{0}".into(),
                poll_interval: Duration::from_secs(1),
                max_polls: 1,
            }),
            KnownChain::Alephium,
        );
        let readers = build_readers(&alephium).unwrap();
        assert!(readers.iter().all(|r| r.chain() == 255));
        assert_eq!(build_writers(&alephium).unwrap().len(), 3);
    }

    #[test]
    fn writers_need_a_url() {
        let mut evm = conf(ChainConnectionConf::Evm { evm_chain_id: 1 }, KnownChain::Ethereum);
        evm.rpc_urls.clear();
        assert!(build_writers(&evm).is_err());
        assert!(build_readers(&evm).unwrap().is_empty());
    }
}
