use std::collections::HashMap;

use async_trait::async_trait;
use eyre::Result;
use relayer_core::{payload::TransferToken, ChainId, H256};
use tracing::debug;

use super::{Middleware, Next, RelayContext};

/// Decodes the transfer of VAAs emitted by a known token bridge.
#[derive(Debug, Default)]
pub struct TokenBridgeMiddleware {
    /// Token bridge emitter address by chain
    token_bridges: HashMap<ChainId, H256>,
}

impl TokenBridgeMiddleware {
    /// Middleware trusting the given token bridge emitters.
    pub fn new(token_bridges: HashMap<ChainId, H256>) -> Self {
        Self { token_bridges }
    }

    fn is_token_bridge(&self, chain: ChainId, emitter: &H256) -> bool {
        self.token_bridges.get(&chain) == Some(emitter)
    }
}

#[async_trait]
impl Middleware for TokenBridgeMiddleware {
    async fn handle(&self, ctx: &mut RelayContext, next: Next<'_>) -> Result<()> {
        if self.is_token_bridge(ctx.vaa.emitter_chain, &ctx.vaa.emitter_address) {
            ctx.token_bridge = TransferToken::parse(&ctx.vaa.payload);
            if ctx.token_bridge.is_none() {
                debug!("Token bridge VAA is not a transfer");
            }
        }
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;
    use relayer_base::db::Job;
    use relayer_core::{now_millis, test_utils::dummy_vaa, vaa::Vaa, Encode, U256};

    use super::*;

    fn transfer() -> TransferToken {
        TransferToken {
            amount: U256::from(5),
            token_address: H256::repeat_byte(7),
            token_chain: 2,
            recipient: H256::repeat_byte(9),
            recipient_chain: 255,
            fee: U256::zero(),
        }
    }

    async fn run(middleware: &TokenBridgeMiddleware, payload: Vec<u8>) -> RelayContext {
        let vaa = dummy_vaa(payload);
        let job = Job::new(vaa.id(), vaa.encode().unwrap(), 3, now_millis());
        let mut ctx = RelayContext::new(job.clone(), Vaa::decode(&job.vaa_bytes).unwrap());
        middleware.handle(&mut ctx, Next { rest: &[] }).await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn only_parses_known_emitters() {
        let trusted = TokenBridgeMiddleware::new(hashmap! { 2 => H256::repeat_byte(0x11) });
        let ctx = run(&trusted, transfer().to_vec().unwrap()).await;
        assert_eq!(ctx.token_bridge, Some(transfer()));
        assert_eq!(ctx.target_chain(), 255);

        let other = TokenBridgeMiddleware::new(hashmap! { 2 => H256::repeat_byte(0x22) });
        assert!(run(&other, transfer().to_vec().unwrap()).await.token_bridge.is_none());
        assert!(run(&trusted, vec![9, 9]).await.token_bridge.is_none());
    }
}
