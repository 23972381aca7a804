use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, info_span, Instrument};

use super::{Middleware, Next, RelayContext};

/// Opens the span the rest of the attempt is logged under.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, ctx: &mut RelayContext, next: Next<'_>) -> Result<()> {
        let span = info_span!(
            "relay",
            id = %ctx.job.id,
            attempt = ctx.job.attempts,
            emitter_chain = ctx.vaa.emitter_chain,
            sequence = ctx.vaa.sequence,
        );
        ctx.span = span.clone();
        async move {
            debug!("Relaying VAA");
            let result = next.run(ctx).await;
            debug!(ok = result.is_ok(), "Relay attempt finished");
            result
        }
        .instrument(span)
        .await
    }
}
