#![allow(non_snake_case)]

use std::sync::Arc;

use async_trait::async_trait;
use mockall::*;
use prometheus::Registry;
use relayer_base::{
    db::{RelayerDb, DB},
    CoreMetrics,
};
use relayer_core::{
    vaa::VaaId, ChainCommunicationError, ChainId, GuardianSets, RelayerError, TokenBridgeReader,
    TokenBridgeWriter, TxOutcome, H256,
};
use tokio::sync::broadcast;

use crate::{
    guardian::VaaFetcher,
    ingest::Ingestor,
    pipeline::SourceTxFetcher,
    queue::JobQueue,
    settings::{matching_list::MatchingList, QueueConf},
};

/// Metrics on a private registry.
pub fn test_metrics() -> Arc<CoreMetrics> {
    Arc::new(CoreMetrics::new("test", 9090, Registry::new()).unwrap())
}

/// An ingestor over a fresh queue in `db`.
pub fn test_ingestor(
    db: DB,
    whitelist: MatchingList,
    blacklist: MatchingList,
    guardian_sets: GuardianSets,
) -> Ingestor {
    let metrics = test_metrics();
    let (events, _) = broadcast::channel(16);
    let queue = JobQueue::new(RelayerDb::new(db), QueueConf::default(), events, &metrics);
    Ingestor::new(
        queue,
        Arc::new(whitelist),
        Arc::new(blacklist),
        Arc::new(guardian_sets),
        metrics.vaas_ingested_count(),
    )
}

mock! {
    pub TokenBridgeReader {
        pub fn _chain(&self) -> ChainId {}

        pub fn _is_transfer_completed(
            &self,
            vaa_bytes: &[u8],
            signable_hash: H256,
        ) -> Result<bool, ChainCommunicationError> {}
    }
}

impl std::fmt::Debug for MockTokenBridgeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTokenBridgeReader")
    }
}

#[async_trait]
impl TokenBridgeReader for MockTokenBridgeReader {
    fn chain(&self) -> ChainId {
        self._chain()
    }

    async fn is_transfer_completed(
        &self,
        vaa_bytes: &[u8],
        signable_hash: H256,
    ) -> Result<bool, ChainCommunicationError> {
        self._is_transfer_completed(vaa_bytes, signable_hash)
    }
}

mock! {
    pub TokenBridgeWriter {
        pub fn _chain(&self) -> ChainId {}

        pub fn _complete_transfer(
            &self,
            vaa_bytes: &[u8],
        ) -> Result<TxOutcome, ChainCommunicationError> {}

        pub fn _complete_transfer_and_unwrap_native(
            &self,
            vaa_bytes: &[u8],
        ) -> Result<TxOutcome, ChainCommunicationError> {}

        pub fn _complete_transfer_with_reward(
            &self,
            vaa_bytes: &[u8],
        ) -> Result<TxOutcome, ChainCommunicationError> {}
    }
}

impl std::fmt::Debug for MockTokenBridgeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTokenBridgeWriter")
    }
}

#[async_trait]
impl TokenBridgeWriter for MockTokenBridgeWriter {
    fn chain(&self) -> ChainId {
        self._chain()
    }

    async fn complete_transfer(&self, vaa_bytes: &[u8]) -> Result<TxOutcome, ChainCommunicationError> {
        self._complete_transfer(vaa_bytes)
    }

    async fn complete_transfer_and_unwrap_native(
        &self,
        vaa_bytes: &[u8],
    ) -> Result<TxOutcome, ChainCommunicationError> {
        self._complete_transfer_and_unwrap_native(vaa_bytes)
    }

    async fn complete_transfer_with_reward(
        &self,
        vaa_bytes: &[u8],
    ) -> Result<TxOutcome, ChainCommunicationError> {
        self._complete_transfer_with_reward(vaa_bytes)
    }
}

mock! {
    pub VaaFetcher {
        pub fn _fetch_vaa(&self, id: &VaaId) -> Result<Vec<u8>, RelayerError> {}
    }
}

impl std::fmt::Debug for MockVaaFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockVaaFetcher")
    }
}

#[async_trait]
impl VaaFetcher for MockVaaFetcher {
    async fn fetch_vaa(&self, id: &VaaId) -> Result<Vec<u8>, RelayerError> {
        self._fetch_vaa(id)
    }
}

mock! {
    pub SourceTxFetcher {
        pub fn _fetch_source_tx(&self, id: &VaaId) -> eyre::Result<Option<String>> {}
    }
}

impl std::fmt::Debug for MockSourceTxFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockSourceTxFetcher")
    }
}

#[async_trait]
impl SourceTxFetcher for MockSourceTxFetcher {
    async fn fetch_source_tx(&self, id: &VaaId) -> eyre::Result<Option<String>> {
        self._fetch_source_tx(id)
    }
}
