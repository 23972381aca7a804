use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use eyre::Result;
use relayer_core::ChainId;
use tokio::sync::OnceCell;

use super::{Middleware, Next, RelayContext};
use crate::{providers::ProviderRegistry, settings::ChainConf};

/// Attaches the provider registry, built on first use and shared by every
/// later attempt.
#[derive(Debug)]
pub struct ProvidersMiddleware {
    chains: HashMap<ChainId, ChainConf>,
    registry: OnceCell<Arc<ProviderRegistry>>,
}

impl ProvidersMiddleware {
    /// Middleware building readers for `chains`.
    pub fn new(chains: HashMap<ChainId, ChainConf>) -> Self {
        Self {
            chains,
            registry: OnceCell::new(),
        }
    }

    /// Middleware handing out an already built registry.
    pub fn with_registry(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            chains: HashMap::new(),
            registry: OnceCell::new_with(Some(registry)),
        }
    }

    async fn registry(&self) -> Result<Arc<ProviderRegistry>> {
        self.registry
            .get_or_try_init(|| async {
                ProviderRegistry::from_chains(self.chains.values()).map(Arc::new)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl Middleware for ProvidersMiddleware {
    async fn handle(&self, ctx: &mut RelayContext, next: Next<'_>) -> Result<()> {
        ctx.providers = Some(self.registry().await?);
        next.run(ctx).await
    }
}
