use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use relayer_core::{
    payload::TransferToken, ChainFamily, ChainId, RelayerError, TokenBridgeReader,
    TokenBridgeWriter, H256,
};
use tracing::{debug, info, warn};

use super::{Middleware, Next, RelayContext};

/// Which token bridge entry point redeems a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
enum Redemption {
    Plain,
    UnwrapNative,
    WithReward,
}

/// Submits the redemption of a token transfer to its recipient chain,
/// unless the transfer has been redeemed already.
#[derive(Debug, Default)]
pub struct RelayHandler {
    /// Wrapped native token of each chain, as it appears in transfers
    wrapped_native: HashMap<ChainId, H256>,
}

impl RelayHandler {
    /// Handler unwrapping transfers of the given wrapped native tokens.
    pub fn new(wrapped_native: HashMap<ChainId, H256>) -> Self {
        Self { wrapped_native }
    }

    fn redemption(&self, transfer: &TransferToken) -> Result<Redemption, RelayerError> {
        let target = transfer.recipient_chain;
        match ChainFamily::of(target) {
            Some(ChainFamily::Evm) => {
                let is_native = transfer.token_chain == target
                    && self.wrapped_native.get(&target) == Some(&transfer.token_address);
                Ok(if is_native {
                    Redemption::UnwrapNative
                } else {
                    Redemption::Plain
                })
            }
            Some(ChainFamily::Alephium) => Ok(Redemption::WithReward),
            Some(ChainFamily::Solana) | None => Err(RelayerError::UnknownChain(target)),
        }
    }
}

/// Ask each reader in turn until one answers.
async fn is_transfer_completed(
    readers: &[Arc<dyn TokenBridgeReader>],
    chain: ChainId,
    vaa_bytes: &[u8],
    signable_hash: H256,
) -> Result<bool, RelayerError> {
    let mut last_error = None;
    for reader in readers {
        match reader.is_transfer_completed(vaa_bytes, signable_hash).await {
            Ok(completed) => return Ok(completed),
            Err(err) => {
                warn!(?reader, ?err, "Provider failed, trying the next one");
                last_error = Some(err);
            }
        }
    }
    Err(match last_error {
        Some(err) => RelayerError::TransientNetwork(err),
        None => RelayerError::UnknownChain(chain),
    })
}

#[async_trait]
impl Middleware for RelayHandler {
    async fn handle(&self, ctx: &mut RelayContext, next: Next<'_>) -> Result<()> {
        let Some(transfer) = ctx.token_bridge.clone() else {
            debug!("Not a token transfer, nothing to relay");
            return next.run(ctx).await;
        };
        let target = transfer.recipient_chain;
        let providers = ctx
            .providers
            .clone()
            .ok_or_else(|| eyre!("No providers attached to the relay context"))?;
        let wallets = ctx
            .wallets
            .clone()
            .ok_or_else(|| eyre!("No wallets attached to the relay context"))?;

        let completed = is_transfer_completed(
            providers.of(target),
            target,
            ctx.vaa_bytes(),
            ctx.vaa
                .signable_hash()
                .wrap_err("hashing the VAA body")?,
        )
        .await?;
        if completed {
            info!(target, "Transfer already redeemed");
            return next.run(ctx).await;
        }

        let redemption = self.redemption(&transfer)?;
        let vaa_bytes = ctx.vaa_bytes().to_vec();
        let outcome = wallets
            .execute(target, move |writer: Arc<dyn TokenBridgeWriter>| async move {
                let result = match redemption {
                    Redemption::Plain => writer.complete_transfer(&vaa_bytes).await,
                    Redemption::UnwrapNative => {
                        writer.complete_transfer_and_unwrap_native(&vaa_bytes).await
                    }
                    Redemption::WithReward => {
                        writer.complete_transfer_with_reward(&vaa_bytes).await
                    }
                };
                result.map_err(|err| eyre::Report::new(RelayerError::from(err)))
            })
            .await?;
        info!(
            target,
            %redemption,
            tx_id = outcome.transaction_id,
            source_tx = ?ctx.source_tx_hash,
            "Relayed transfer"
        );
        ctx.tx_id = Some(outcome.transaction_id);
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;
    use relayer_base::db::Job;
    use relayer_core::{
        now_millis, test_utils::dummy_vaa, vaa::Vaa, ChainCommunicationError, Encode, TxOutcome,
        U256,
    };

    use super::*;
    use crate::{
        executor::WalletExecutor,
        providers::ProviderRegistry,
        test_utils::{MockTokenBridgeReader, MockTokenBridgeWriter},
    };

    const WETH: H256 = H256::repeat_byte(0xee);

    fn transfer(
        token_chain: ChainId,
        token_address: H256,
        recipient_chain: ChainId,
    ) -> TransferToken {
        TransferToken {
            amount: U256::from(10),
            token_address,
            token_chain,
            recipient: H256::repeat_byte(9),
            recipient_chain,
            fee: U256::zero(),
        }
    }

    fn reader(
        chain: ChainId,
        answer: fn() -> Result<bool, ChainCommunicationError>,
    ) -> Arc<dyn TokenBridgeReader> {
        let mut reader = MockTokenBridgeReader::new();
        reader.expect__chain().return_const(chain);
        reader
            .expect__is_transfer_completed()
            .returning(move |_, _| answer());
        Arc::new(reader)
    }

    fn ctx(
        transfer: TransferToken,
        readers: Vec<Arc<dyn TokenBridgeReader>>,
        writer: MockTokenBridgeWriter,
    ) -> RelayContext {
        let target = transfer.recipient_chain;
        let vaa = dummy_vaa(transfer.to_vec().unwrap());
        let job = Job::new(vaa.id(), vaa.encode().unwrap(), 3, now_millis());
        let mut ctx = RelayContext::new(job.clone(), Vaa::decode(&job.vaa_bytes).unwrap());
        let mut providers = ProviderRegistry::default();
        providers.insert(target, readers);
        ctx.providers = Some(Arc::new(providers));
        ctx.wallets = Some(Arc::new(WalletExecutor::new([(
            target,
            Arc::new(writer) as Arc<dyn TokenBridgeWriter>,
        )])));
        ctx.token_bridge = Some(transfer);
        ctx
    }

    fn outcome(tx: &str) -> Result<TxOutcome, ChainCommunicationError> {
        Ok(TxOutcome {
            transaction_id: tx.to_owned(),
        })
    }

    fn handler() -> RelayHandler {
        RelayHandler::new(hashmap! { 2 => WETH })
    }

    #[tokio::test]
    async fn already_redeemed_is_a_no_op() {
        let mut writer = MockTokenBridgeWriter::new();
        writer.expect__complete_transfer().never();
        let mut ctx = ctx(transfer(2, WETH, 2), vec![reader(2, || Ok(true))], writer);

        handler().handle(&mut ctx, Next { rest: &[] }).await.unwrap();
        assert!(ctx.tx_id.is_none());
    }

    #[tokio::test]
    async fn unwraps_the_wrapped_native_token() {
        let mut writer = MockTokenBridgeWriter::new();
        writer
            .expect__complete_transfer_and_unwrap_native()
            .times(1)
            .returning(|_| outcome("0xunwrap"));
        writer.expect__complete_transfer().never();
        let mut ctx = ctx(transfer(2, WETH, 2), vec![reader(2, || Ok(false))], writer);

        handler().handle(&mut ctx, Next { rest: &[] }).await.unwrap();
        assert_eq!(ctx.tx_id.as_deref(), Some("0xunwrap"));
    }

    #[tokio::test]
    async fn other_tokens_use_plain_redemption() {
        for token in [transfer(2, H256::repeat_byte(1), 2), transfer(4, WETH, 2)] {
            let mut writer = MockTokenBridgeWriter::new();
            writer
                .expect__complete_transfer()
                .times(1)
                .returning(|_| outcome("0xplain"));
            writer.expect__complete_transfer_and_unwrap_native().never();
            let mut ctx = ctx(token, vec![reader(2, || Ok(false))], writer);

            handler().handle(&mut ctx, Next { rest: &[] }).await.unwrap();
            assert_eq!(ctx.tx_id.as_deref(), Some("0xplain"));
        }
    }

    #[tokio::test]
    async fn alephium_collects_the_reward() {
        let mut writer = MockTokenBridgeWriter::new();
        writer
            .expect__complete_transfer_with_reward()
            .times(1)
            .returning(|_| outcome("alph-tx"));
        let readers = vec![
            reader(255, || Err(ChainCommunicationError::Timeout)),
            reader(255, || Ok(false)),
        ];
        let mut ctx = ctx(transfer(2, WETH, 255), readers, writer);

        handler().handle(&mut ctx, Next { rest: &[] }).await.unwrap();
        assert_eq!(ctx.tx_id.as_deref(), Some("alph-tx"));
    }

    #[tokio::test]
    async fn reverts_are_retried() {
        let mut writer = MockTokenBridgeWriter::new();
        writer
            .expect__complete_transfer()
            .returning(|_| Err(ChainCommunicationError::TransactionReverted("0xdead".into())));
        let mut ctx = ctx(
            transfer(2, H256::repeat_byte(1), 2),
            vec![reader(2, || Ok(false))],
            writer,
        );

        let err = handler().handle(&mut ctx, Next { rest: &[] }).await.unwrap_err();
        assert!(RelayerError::is_report_retryable(&err));
        assert!(ctx.tx_id.is_none());
    }

    #[tokio::test]
    async fn unconfigured_target_fails_for_good() {
        let mut ctx = ctx(transfer(2, WETH, 2), vec![], MockTokenBridgeWriter::new());
        let err = handler().handle(&mut ctx, Next { rest: &[] }).await.unwrap_err();
        assert!(matches!(
            RelayerError::find_in(&err),
            Some(RelayerError::UnknownChain(2))
        ));
        assert!(!RelayerError::is_report_retryable(&err));
    }
}
