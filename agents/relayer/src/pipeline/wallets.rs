use std::sync::Arc;

use async_trait::async_trait;
use derive_new::new;
use eyre::Result;

use super::{Middleware, Next, RelayContext};
use crate::executor::WalletExecutor;

/// Attaches the wallet executor.
#[derive(Debug, new)]
pub struct WalletsMiddleware {
    wallets: Arc<WalletExecutor>,
}

#[async_trait]
impl Middleware for WalletsMiddleware {
    async fn handle(&self, ctx: &mut RelayContext, next: Next<'_>) -> Result<()> {
        ctx.wallets = Some(self.wallets.clone());
        next.run(ctx).await
    }
}
