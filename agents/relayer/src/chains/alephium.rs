//! Alephium token bridge over the full node REST API.
//!
//! Redemptions are TxScripts: the configured script bytecode with the hex
//! VAA spliced in. The node builds the unsigned transaction, we sign its id
//! and submit it, then poll the transaction status until it is confirmed.

use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use relayer_core::{
    ChainCommunicationError, ChainId, ChainResult, TokenBridgeReader, TokenBridgeWriter,
    TxOutcome, H256,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::settings::AlephiumConf;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin JSON client of one full node.
#[derive(Debug, Clone)]
struct NodeClient {
    http: reqwest::Client,
    base: Url,
}

impl NodeClient {
    fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn url(&self, path: &str) -> ChainResult<Url> {
        self.base
            .join(path)
            .map_err(ChainCommunicationError::from_other)
    }

    async fn handle<R: DeserializeOwned>(response: reqwest::Response) -> ChainResult<R> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainCommunicationError::CustomError(format!(
                "node responded {status}: {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(ChainCommunicationError::from_other)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ChainResult<R> {
        let response = self
            .http
            .post(self.url(path)?)
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(ChainCommunicationError::from_other)?;
        Self::handle(response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ChainResult<R> {
        let response = self
            .http
            .get(self.url(path)?)
            .timeout(REQUEST_TIMEOUT)
            .query(query)
            .send()
            .await
            .map_err(ChainCommunicationError::from_other)?;
        Self::handle(response).await
    }
}

#[derive(Debug, Deserialize)]
struct ContractValue {
    #[serde(rename = "type")]
    kind: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CallContractResult {
    #[serde(default)]
    returns: Vec<ContractValue>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildScriptTxResult {
    unsigned_tx: String,
    tx_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitTxResult {
    tx_id: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
enum TxStatus {
    Confirmed,
    MemPooled,
    TxNotFound,
}

/// Read handle of the Alephium token bridge.
#[derive(Debug)]
pub struct AlephiumTokenBridgeReader {
    chain: ChainId,
    node: NodeClient,
    conf: AlephiumConf,
}

impl AlephiumTokenBridgeReader {
    /// Reader over the node at `url`.
    pub fn new(chain: ChainId, url: Url, conf: AlephiumConf) -> Self {
        Self {
            chain,
            node: NodeClient::new(url),
            conf,
        }
    }
}

fn call_contract_request(conf: &AlephiumConf, signable_hash: &H256) -> serde_json::Value {
    json!({
        "group": conf.group,
        "address": conf.token_bridge_address,
        "methodIndex": conf.transfer_completed_method_index,
        "args": [{ "type": "ByteVec", "value": hex::encode(signable_hash.as_bytes()) }],
    })
}

#[async_trait]
impl TokenBridgeReader for AlephiumTokenBridgeReader {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn is_transfer_completed(&self, _vaa_bytes: &[u8], signable_hash: H256) -> ChainResult<bool> {
        let result: CallContractResult = self
            .node
            .post(
                "contracts/call-contract",
                &call_contract_request(&self.conf, &signable_hash),
            )
            .await?;
        if let Some(error) = result.error {
            return Err(ChainCommunicationError::CustomError(error));
        }
        match result.returns.first() {
            Some(ContractValue { kind, value }) if kind == "Bool" => value
                .as_bool()
                .ok_or_else(|| ChainCommunicationError::from_other_str("malformed Bool")),
            other => Err(ChainCommunicationError::CustomError(format!(
                "unexpected return value {other:?}"
            ))),
        }
    }
}

/// Write handle of the Alephium token bridge, bound to one key.
pub struct AlephiumTokenBridgeWriter {
    chain: ChainId,
    node: NodeClient,
    conf: AlephiumConf,
    key: SigningKey,
}

impl std::fmt::Debug for AlephiumTokenBridgeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlephiumTokenBridgeWriter")
            .field("chain", &self.chain)
            .field("node", &self.node.base.as_str())
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl AlephiumTokenBridgeWriter {
    /// Writer signing with `private_key`.
    pub fn new(chain: ChainId, url: Url, conf: AlephiumConf, private_key: &H256) -> ChainResult<Self> {
        let key = SigningKey::from_slice(private_key.as_bytes())
            .map_err(|_| ChainCommunicationError::from_other_str("invalid private key"))?;
        Ok(Self {
            chain,
            node: NodeClient::new(url),
            conf,
            key,
        })
    }

    /// Hex of the compressed public key.
    pub fn public_key(&self) -> String {
        hex::encode(self.key.verifying_key().to_encoded_point(true).as_bytes())
    }

    fn script_bytecode(&self, vaa_bytes: &[u8]) -> String {
        self.conf
            .complete_transfer_script
            .replace("{0}", &hex::encode(vaa_bytes))
    }

    fn sign_tx_id(&self, tx_id: &str) -> ChainResult<String> {
        let digest = hex::decode(tx_id).map_err(ChainCommunicationError::from_other)?;
        let signature: Signature = self
            .key
            .sign_prehash(&digest)
            .map_err(ChainCommunicationError::from_other)?;
        Ok(hex::encode(signature.to_bytes()))
    }

    async fn wait_for_confirmation(&self, tx_id: &str) -> ChainResult<()> {
        let mut last = TxStatus::TxNotFound;
        for _ in 0..self.conf.max_polls {
            tokio::time::sleep(self.conf.poll_interval).await;
            last = match self
                .node
                .get::<TxStatus>("transactions/status", &[("txId", tx_id)])
                .await
            {
                Ok(TxStatus::Confirmed) => return Ok(()),
                Ok(status) => status,
                Err(err) => {
                    warn!(?err, tx_id, "Failed to poll transaction status");
                    continue;
                }
            };
            debug!(tx_id, status = ?last, "Waiting for confirmation");
        }
        Err(match last {
            TxStatus::TxNotFound => ChainCommunicationError::TransactionDropped(tx_id.to_owned()),
            _ => ChainCommunicationError::Timeout,
        })
    }
}

#[async_trait]
impl TokenBridgeWriter for AlephiumTokenBridgeWriter {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn complete_transfer(&self, vaa_bytes: &[u8]) -> ChainResult<TxOutcome> {
        self.complete_transfer_with_reward(vaa_bytes).await
    }

    async fn complete_transfer_and_unwrap_native(&self, _vaa_bytes: &[u8]) -> ChainResult<TxOutcome> {
        Err(ChainCommunicationError::CustomError(
            "Alephium has no wrapped native unwrapping".into(),
        ))
    }

    #[instrument(skip_all, fields(chain = self.chain))]
    async fn complete_transfer_with_reward(&self, vaa_bytes: &[u8]) -> ChainResult<TxOutcome> {
        let built: BuildScriptTxResult = self
            .node
            .post(
                "contracts/unsigned-tx/execute-script",
                &json!({
                    "fromPublicKey": self.public_key(),
                    "bytecode": self.script_bytecode(vaa_bytes),
                }),
            )
            .await?;
        let signature = self.sign_tx_id(&built.tx_id)?;
        let submitted: SubmitTxResult = self
            .node
            .post(
                "transactions/submit",
                &json!({ "unsignedTx": built.unsigned_tx, "signature": signature }),
            )
            .await?;
        info!(tx_id = submitted.tx_id, "Dispatched tx");
        self.wait_for_confirmation(&submitted.tx_id).await?;
        info!(tx_id = submitted.tx_id, "confirmed transaction");
        Ok(TxOutcome {
            transaction_id: submitted.tx_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey};

    use super::*;

    fn conf() -> AlephiumConf {
        AlephiumConf {
            group: 0,
            token_bridge_address: "tpxjsWJSaUh5i7XzNAsTWMRtD9QvDTV9zmMNeHHS6jQB".into(),
            transfer_completed_method_index: 4,
            complete_transfer_script: "0101{0}ff".into(),
            poll_interval: Duration::from_millis(1),
            max_polls: 2,
        }
    }

    fn writer() -> AlephiumTokenBridgeWriter {
        AlephiumTokenBridgeWriter::new(
            255,
            Url::parse("http://127.0.0.1:1/").unwrap(),
            conf(),
            &H256::repeat_byte(3),
        )
        .unwrap()
    }

    #[test]
    fn splices_vaa_into_script() {
        assert_eq!(writer().script_bytecode(&[0xab, 0xcd]), "0101abcdff");
    }

    #[test]
    fn signs_tx_id() {
        let writer = writer();
        let tx_id = hex::encode([7u8; 32]);
        let signature = hex::decode(writer.sign_tx_id(&tx_id).unwrap()).unwrap();
        assert_eq!(signature.len(), 64);

        let public = VerifyingKey::from_sec1_bytes(&hex::decode(writer.public_key()).unwrap()).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();
        assert!(public.verify_prehash(&[7u8; 32], &signature).is_ok());
        assert_eq!(writer.public_key().len(), 66);
    }

    #[test]
    fn call_contract_body() {
        let body = call_contract_request(&conf(), &H256::repeat_byte(0xee));
        assert_eq!(body["methodIndex"], 4);
        assert_eq!(body["args"][0]["type"], "ByteVec");
        assert_eq!(body["args"][0]["value"], "ee".repeat(32));
    }

    #[test]
    fn tx_status_tags() {
        let status: TxStatus =
            serde_json::from_str(r#"{"type": "MemPooled", "fromGroup": 0}"#).unwrap();
        assert_eq!(status, TxStatus::MemPooled);
        let status: TxStatus = serde_json::from_str(r#"{"type": "TxNotFound"}"#).unwrap();
        assert_eq!(status, TxStatus::TxNotFound);
    }

    #[tokio::test]
    async fn unreachable_node_is_an_error() {
        let err = writer()
            .complete_transfer(&[1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, ChainCommunicationError::Other(_)));
    }
}
