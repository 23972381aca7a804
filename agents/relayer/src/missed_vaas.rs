//! Periodic recovery of VAAs the spy feed never delivered.
//!
//! Each sweep looks at the sequences seen on every route: holes between the
//! smallest and largest are fetched from the guardians, then sequences past
//! the largest are fetched in turn until one is not available yet.

use std::sync::Arc;

use eyre::Result;
use prometheus::IntCounterVec;
use relayer_base::db::RelayerDb;
use relayer_core::{
    now_millis,
    vaa::{EmitterRoute, VaaId},
    RelayerError,
};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::{
    guardian::VaaFetcher,
    ingest::{IngestOutcome, Ingestor, VaaSource},
    settings::MissedVaasConf,
};

/// The missed VAA sweeper.
#[derive(Debug)]
pub struct MissedVaaJob {
    routes: Vec<EmitterRoute>,
    conf: MissedVaasConf,
    fetcher: Arc<dyn VaaFetcher>,
    ingestor: Ingestor,
    db: RelayerDb,
    recovered: IntCounterVec,
}

impl MissedVaaJob {
    /// Sweeper over `routes`.
    pub fn new(
        routes: Vec<EmitterRoute>,
        conf: MissedVaasConf,
        fetcher: Arc<dyn VaaFetcher>,
        ingestor: Ingestor,
        db: RelayerDb,
        recovered: IntCounterVec,
    ) -> Self {
        Self {
            routes,
            conf,
            fetcher,
            ingestor,
            db,
            recovered,
        }
    }

    /// Sweep every `interval` until the task is aborted.
    pub async fn run(self) {
        let span = info_span!("MissedVaaJob", routes = self.routes.len());
        async move {
            loop {
                self.sweep().await;
                tokio::time::sleep(self.conf.interval).await;
            }
        }
        .instrument(span)
        .await
    }

    /// One pass over all routes. Errors of one route do not stop the others.
    pub async fn sweep(&self) {
        for route in &self.routes {
            match self.sweep_route(route).await {
                Ok(0) => {}
                Ok(processed) => info!(%route, processed, "Recovered missed VAAs"),
                Err(err) => warn!(%route, ?err, "Missed VAA sweep failed"),
            }
        }
    }

    #[instrument(skip(self), fields(%route))]
    async fn sweep_route(&self, route: &EmitterRoute) -> Result<usize> {
        let seen = self.db.seen_sequences(route)?;
        let Some(&max) = seen.last() else {
            debug!("No sequence seen yet, nothing to scan");
            return Ok(0);
        };

        let mut processed = 0;
        for pair in seen.windows(2) {
            for sequence in pair[0] + 1..pair[1] {
                if self.try_fetch_and_process(route.at(sequence)).await {
                    processed += 1;
                }
            }
        }

        let mut next = max + 1;
        while self.try_fetch_and_process(route.at(next)).await {
            processed += 1;
            next += 1;
        }

        let compacted = self.db.compact_seen_sequences(route)?;
        debug!(compacted, next, "Sweep finished");
        Ok(processed)
    }

    /// Fetch `id` from the guardians and ingest it. Returns whether the VAA
    /// was fetched and accepted; a fetch started by someone else within the
    /// TTL also counts as a miss.
    pub async fn try_fetch_and_process(&self, id: VaaId) -> bool {
        let now = now_millis();
        match self.db.is_in_progress(&id, now) {
            Ok(false) => {}
            Ok(true) => {
                debug!(%id, "Fetch already in progress");
                return false;
            }
            Err(err) => {
                warn!(%id, ?err, "Failed to read in-progress marker");
                return false;
            }
        }

        let vaa_bytes = match self.fetcher.fetch_matching_vaa(&id).await {
            Ok(bytes) => bytes,
            Err(RelayerError::FetchNotFound(_)) => {
                debug!(%id, "VAA not available yet");
                return false;
            }
            Err(err) => {
                warn!(%id, ?err, "Failed to fetch VAA");
                return false;
            }
        };

        let ttl = self.conf.in_progress_ttl.as_millis() as u64;
        match self.db.try_mark_in_progress(&id, now, ttl) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                warn!(%id, ?err, "Failed to claim in-progress marker");
                return false;
            }
        }

        match self.ingestor.ingest(vaa_bytes, VaaSource::Missed) {
            Ok(outcome) => {
                if let IngestOutcome::Queued(_) = outcome {
                    self.recovered
                        .with_label_values(&[
                            &id.emitter_chain.to_string(),
                            &id.target_chain.to_string(),
                        ])
                        .inc();
                }
                debug!(%id, ?outcome, "Processed missed VAA");
                true
            }
            Err(err) => {
                warn!(%id, ?err, "Failed to ingest missed VAA");
                false
            }
        }
    }
}
