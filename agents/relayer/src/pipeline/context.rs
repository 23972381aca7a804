use std::sync::Arc;

use relayer_base::db::Job;
use relayer_core::{payload::TransferToken, vaa::Vaa, ChainId};
use tracing::Span;

use crate::{executor::WalletExecutor, providers::ProviderRegistry};

/// State of one relay attempt, threaded through the middleware chain.
#[derive(Debug)]
pub struct RelayContext {
    /// The job being attempted
    pub job: Job,
    /// The decoded envelope of `job.vaa_bytes`
    pub vaa: Vaa,
    /// Span the attempt is logged under
    pub span: Span,
    /// Set by the providers middleware
    pub providers: Option<Arc<ProviderRegistry>>,
    /// Set by the wallets middleware
    pub wallets: Option<Arc<WalletExecutor>>,
    /// Hash of the transaction that emitted the VAA, when the explorer knows it
    pub source_tx_hash: Option<String>,
    /// The transfer, when the VAA was emitted by a token bridge
    pub token_bridge: Option<TransferToken>,
    /// Redeeming transaction, set when one was submitted
    pub tx_id: Option<String>,
}

impl RelayContext {
    /// Fresh context for an attempt of `job`.
    pub fn new(job: Job, vaa: Vaa) -> Self {
        Self {
            job,
            vaa,
            span: Span::none(),
            providers: None,
            wallets: None,
            source_tx_hash: None,
            token_bridge: None,
            tx_id: None,
        }
    }

    /// The raw signed VAA.
    pub fn vaa_bytes(&self) -> &[u8] {
        &self.job.vaa_bytes
    }

    /// Chain the VAA is relayed to. Transfers name their own recipient chain.
    pub fn target_chain(&self) -> ChainId {
        self.token_bridge
            .as_ref()
            .map_or(self.vaa.target_chain, |transfer| transfer.recipient_chain)
    }
}
