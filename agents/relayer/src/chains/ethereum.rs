use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::{
    abi::Detokenize,
    contract::{abigen, builders::ContractCall},
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, Bytes},
};
use relayer_core::{
    ChainCommunicationError, ChainId, ChainResult, TokenBridgeReader, TokenBridgeWriter,
    TxOutcome, H256,
};
use tracing::{error, info, instrument};
use url::Url;

abigen!(
    TokenBridge,
    r#"[
        function isTransferCompleted(bytes32 hash) external view returns (bool)
        function completeTransfer(bytes encodedVm) external
        function completeTransferAndUnwrapETH(bytes encodedVm) external
    ]"#,
);

const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

type SigningClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// The token bridge is addressed by its emitter address, which is the
/// contract address left padded to 32 bytes.
fn contract_address(token_bridge: &H256) -> Address {
    Address::from_slice(&token_bridge.as_bytes()[12..])
}

fn provider(url: &Url) -> ChainResult<Provider<Http>> {
    Provider::<Http>::try_from(url.as_str()).map_err(ChainCommunicationError::from_other)
}

/// Read handle of an EVM token bridge.
#[derive(Debug)]
pub struct EthereumTokenBridgeReader {
    chain: ChainId,
    contract: TokenBridge<Provider<Http>>,
}

impl EthereumTokenBridgeReader {
    /// Reader over the node at `url`.
    pub fn new(chain: ChainId, url: &Url, token_bridge: &H256) -> ChainResult<Self> {
        let provider = Arc::new(provider(url)?);
        Ok(Self {
            chain,
            contract: TokenBridge::new(contract_address(token_bridge), provider),
        })
    }
}

#[async_trait]
impl TokenBridgeReader for EthereumTokenBridgeReader {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn is_transfer_completed(&self, _vaa_bytes: &[u8], signable_hash: H256) -> ChainResult<bool> {
        self.contract
            .is_transfer_completed(signable_hash.0)
            .call()
            .await
            .map_err(ChainCommunicationError::from_other)
    }
}

/// Write handle of an EVM token bridge, bound to one key.
#[derive(Debug)]
pub struct EthereumTokenBridgeWriter {
    chain: ChainId,
    contract: TokenBridge<SigningClient>,
}

impl EthereumTokenBridgeWriter {
    /// Writer signing with `private_key` for `evm_chain_id`.
    pub fn new(
        chain: ChainId,
        url: &Url,
        token_bridge: &H256,
        private_key: &H256,
        evm_chain_id: u64,
    ) -> ChainResult<Self> {
        let wallet = LocalWallet::from_bytes(private_key.as_bytes())
            .map_err(ChainCommunicationError::from_other)?
            .with_chain_id(evm_chain_id);
        let client = Arc::new(SignerMiddleware::new(provider(url)?, wallet));
        Ok(Self {
            chain,
            contract: TokenBridge::new(contract_address(token_bridge), client),
        })
    }

    /// Address the transactions are sent from.
    pub fn address(&self) -> Address {
        self.contract.client().address()
    }
}

/// Send the call and wait for its receipt.
async fn report_tx<D: Detokenize>(call: ContractCall<SigningClient, D>) -> ChainResult<TxOutcome> {
    let to = call.tx.to().cloned();
    info!(?to, "Dispatching transaction");
    let dispatched = call
        .send()
        .await
        .map_err(ChainCommunicationError::from_other)?;
    let tx_hash = *dispatched;
    let transaction_id = format!("{tx_hash:?}");
    info!(?to, ?tx_hash, "Dispatched tx");

    match tokio::time::timeout(RECEIPT_TIMEOUT, dispatched).await {
        Ok(Ok(Some(receipt))) if receipt.status.is_some_and(|status| status.is_zero()) => {
            error!(?tx_hash, "transaction reverted");
            Err(ChainCommunicationError::TransactionReverted(transaction_id))
        }
        Ok(Ok(Some(_))) => {
            info!(?tx_hash, "confirmed transaction");
            Ok(TxOutcome { transaction_id })
        }
        // ethers returns None once the tx is no longer in the mempool
        Ok(Ok(None)) => Err(ChainCommunicationError::TransactionDropped(transaction_id)),
        Ok(Err(err)) => {
            error!(?tx_hash, error = ?err, "encountered error when waiting for receipt");
            Err(ChainCommunicationError::from_other(err))
        }
        Err(_) => {
            error!(?tx_hash, "waiting for receipt timed out");
            Err(ChainCommunicationError::Timeout)
        }
    }
}

#[async_trait]
impl TokenBridgeWriter for EthereumTokenBridgeWriter {
    fn chain(&self) -> ChainId {
        self.chain
    }

    #[instrument(skip_all, fields(chain = self.chain))]
    async fn complete_transfer(&self, vaa_bytes: &[u8]) -> ChainResult<TxOutcome> {
        report_tx(
            self.contract
                .complete_transfer(Bytes::from(vaa_bytes.to_vec())),
        )
        .await
    }

    #[instrument(skip_all, fields(chain = self.chain))]
    async fn complete_transfer_and_unwrap_native(&self, vaa_bytes: &[u8]) -> ChainResult<TxOutcome> {
        report_tx(
            self.contract
                .complete_transfer_and_unwrap_eth(Bytes::from(vaa_bytes.to_vec())),
        )
        .await
    }

    async fn complete_transfer_with_reward(&self, _vaa_bytes: &[u8]) -> ChainResult<TxOutcome> {
        Err(ChainCommunicationError::CustomError(
            "EVM token bridges pay no relayer reward".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_low_twenty_bytes() {
        let mut emitter = H256::zero();
        emitter.as_bytes_mut()[12..].copy_from_slice(&[0xaa; 20]);
        assert_eq!(contract_address(&emitter), Address::repeat_byte(0xaa));
    }

    #[test]
    fn writer_derives_sender() {
        let key = H256::from_slice(
            &hex::decode("4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d")
                .unwrap(),
        );
        let writer = EthereumTokenBridgeWriter::new(
            2,
            &Url::parse("http://localhost:8545").unwrap(),
            &H256::repeat_byte(1),
            &key,
            1,
        )
        .unwrap();
        assert_eq!(
            format!("{:?}", writer.address()),
            "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1"
        );
        assert_eq!(TokenBridgeWriter::chain(&writer), 2);
    }
}
