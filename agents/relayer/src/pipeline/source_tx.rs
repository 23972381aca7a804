use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use relayer_core::vaa::VaaId;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{Middleware, Next, RelayContext};
use crate::settings::ExplorerConf;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Looks up the transaction that emitted a VAA.
#[async_trait]
pub trait SourceTxFetcher: Send + Sync + Debug {
    /// Source transaction hash of `id`, `None` if it is not indexed.
    async fn fetch_source_tx(&self, id: &VaaId) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    data: Option<ExplorerVaa>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerVaa {
    tx_hash: Option<String>,
}

/// Client of the explorer's VAA index.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    url: Url,
}

impl ExplorerClient {
    /// Client of the explorer at `url`.
    pub fn new(url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }

    fn vaa_url(&self, id: &VaaId) -> Result<Url> {
        Ok(self.url.join(&format!(
            "api/v1/vaas/{}/{}/{}",
            id.emitter_chain,
            id.emitter_address_hex(),
            id.sequence
        ))?)
    }
}

#[async_trait]
impl SourceTxFetcher for ExplorerClient {
    async fn fetch_source_tx(&self, id: &VaaId) -> Result<Option<String>> {
        let response = self
            .http
            .get(self.vaa_url(id)?)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ExplorerResponse = response
            .error_for_status()?
            .json()
            .await
            .wrap_err("decoding explorer response")?;
        Ok(body.data.and_then(|vaa| vaa.tx_hash))
    }
}

/// Records the source transaction hash in the context. A failed lookup is
/// logged and the attempt carries on without it.
#[derive(Debug)]
pub struct SourceTxMiddleware {
    fetcher: Option<Arc<dyn SourceTxFetcher>>,
    retries: usize,
    backoff: Duration,
}

impl SourceTxMiddleware {
    /// Lookups through `fetcher`, `retries` attempts each.
    pub fn new(fetcher: Arc<dyn SourceTxFetcher>, retries: usize, backoff: Duration) -> Self {
        Self {
            fetcher: Some(fetcher),
            retries,
            backoff,
        }
    }

    /// Lookups against the configured explorer, or none at all.
    pub fn from_conf(conf: Option<&ExplorerConf>) -> Self {
        match conf {
            Some(conf) => Self::new(
                Arc::new(ExplorerClient::new(conf.url.clone())),
                conf.retries,
                conf.backoff,
            ),
            None => Self {
                fetcher: None,
                retries: 0,
                backoff: Duration::ZERO,
            },
        }
    }

    async fn lookup(&self, fetcher: &dyn SourceTxFetcher, id: &VaaId) -> Option<String> {
        for attempt in 1..=self.retries.max(1) {
            match fetcher.fetch_source_tx(id).await {
                Ok(Some(hash)) => return Some(hash),
                Ok(None) => debug!(attempt, "Source transaction not indexed yet"),
                Err(err) => debug!(attempt, ?err, "Source transaction lookup failed"),
            }
            if attempt < self.retries {
                tokio::time::sleep(self.backoff * attempt as u32).await;
            }
        }
        warn!(%id, "Could not find the source transaction");
        None
    }
}

#[async_trait]
impl Middleware for SourceTxMiddleware {
    async fn handle(&self, ctx: &mut RelayContext, next: Next<'_>) -> Result<()> {
        if ctx.source_tx_hash.is_none() {
            if let Some(fetcher) = &self.fetcher {
                ctx.source_tx_hash = self.lookup(fetcher.as_ref(), &ctx.job.vaa_id).await;
            }
        }
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use relayer_base::db::Job;
    use relayer_core::{now_millis, test_utils::dummy_vaa, vaa::Vaa};

    use super::*;
    use crate::test_utils::MockSourceTxFetcher;

    fn ctx() -> RelayContext {
        let vaa = dummy_vaa(vec![1]);
        let job = Job::new(vaa.id(), vaa.encode().unwrap(), 3, now_millis());
        let vaa = Vaa::decode(&job.vaa_bytes).unwrap();
        RelayContext::new(job, vaa)
    }

    #[tokio::test]
    async fn retries_then_records_hash() {
        let mut fetcher = MockSourceTxFetcher::new();
        let mut calls = 0;
        fetcher.expect__fetch_source_tx().times(3).returning(move |_| {
            calls += 1;
            match calls {
                1 => Err(eyre::eyre!("explorer down")),
                2 => Ok(None),
                _ => Ok(Some("0xabc".to_owned())),
            }
        });
        let middleware = SourceTxMiddleware::new(Arc::new(fetcher), 3, Duration::from_millis(1));

        let mut ctx = ctx();
        middleware.handle(&mut ctx, Next { rest: &[] }).await.unwrap();
        assert_eq!(ctx.source_tx_hash.as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn failure_is_not_fatal() {
        let mut fetcher = MockSourceTxFetcher::new();
        fetcher
            .expect__fetch_source_tx()
            .times(2)
            .returning(|_| Err(eyre::eyre!("explorer down")));
        let middleware = SourceTxMiddleware::new(Arc::new(fetcher), 2, Duration::from_millis(1));

        let mut ctx = ctx();
        middleware.handle(&mut ctx, Next { rest: &[] }).await.unwrap();
        assert!(ctx.source_tx_hash.is_none());
    }

    #[test]
    fn explorer_url_layout() {
        let client = ExplorerClient::new(Url::parse("https://api.wormholescan.io/").unwrap());
        let id = dummy_vaa(()).id();
        assert_eq!(
            client.vaa_url(&id).unwrap().as_str(),
            format!("https://api.wormholescan.io/api/v1/vaas/2/{}/3", "11".repeat(32))
        );
    }
}
