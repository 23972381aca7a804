//! The relay pipeline: an ordered chain of middleware every job attempt
//! runs through.

use std::{fmt::Debug, sync::Arc, time::Instant};

use async_trait::async_trait;
use eyre::Result;
use prometheus::HistogramVec;
use relayer_base::db::Job;
use relayer_core::{vaa::Vaa, RelayerError};

pub use context::RelayContext;
pub use logging::LoggingMiddleware;
pub use providers::ProvidersMiddleware;
pub use relay::RelayHandler;
pub use source_tx::{ExplorerClient, SourceTxFetcher, SourceTxMiddleware};
pub use token_bridge::TokenBridgeMiddleware;
pub use wallets::WalletsMiddleware;

use crate::queue::JobHandler;

mod context;
mod logging;
mod providers;
mod relay;
mod source_tx;
mod token_bridge;
mod wallets;

/// One step of the pipeline. Call `next.run(ctx)` to continue; returning
/// without calling it skips the remaining steps.
#[async_trait]
pub trait Middleware: Send + Sync + Debug {
    /// Process `ctx`.
    async fn handle(&self, ctx: &mut RelayContext, next: Next<'_>) -> Result<()>;
}

/// The middleware after the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Run the remaining middleware.
    pub async fn run(self, ctx: &mut RelayContext) -> Result<()> {
        match self.rest.split_first() {
            Some((current, rest)) => current.handle(ctx, Next { rest }).await,
            None => Ok(()),
        }
    }
}

/// Middleware chain run for every job.
#[derive(Debug)]
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    relay_duration: HistogramVec,
}

impl Pipeline {
    /// Chain running `middleware` in order.
    pub fn new(middleware: Vec<Arc<dyn Middleware>>, relay_duration: HistogramVec) -> Self {
        Self {
            middleware,
            relay_duration,
        }
    }

    /// Run the chain over `ctx`.
    pub async fn run(&self, ctx: &mut RelayContext) -> Result<()> {
        Next {
            rest: &self.middleware,
        }
        .run(ctx)
        .await
    }
}

#[async_trait]
impl JobHandler for Pipeline {
    async fn handle(&self, job: Job) -> Result<Option<String>> {
        let vaa = Vaa::decode(&job.vaa_bytes).map_err(RelayerError::from)?;
        let mut ctx = RelayContext::new(job, vaa);

        let start = Instant::now();
        let result = self.run(&mut ctx).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        self.relay_duration
            .with_label_values(&[&ctx.target_chain().to_string(), outcome])
            .observe(start.elapsed().as_secs_f64());
        result?;
        Ok(ctx.tx_id)
    }
}
