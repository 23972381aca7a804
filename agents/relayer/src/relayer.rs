use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use futures_util::future::try_join_all;
use relayer_base::{
    db::{RelayerDb, DB},
    BaseAgent, CoreMetrics,
};
use relayer_core::{ChainId, GuardianSets, H256};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    chains::build_writers,
    executor::WalletExecutor,
    guardian::{GuardianRestClient, VaaFetcher},
    ingest::Ingestor,
    missed_vaas::MissedVaaJob,
    pipeline::{
        LoggingMiddleware, Middleware, Pipeline, ProvidersMiddleware, RelayHandler,
        SourceTxMiddleware, TokenBridgeMiddleware, WalletsMiddleware,
    },
    queue::{JobQueue, QueueEvent},
    server::{self, UiApi, VaasApi},
    settings::RelayerSettings,
    spy::SpySubscriber,
};

const QUEUE_EVENTS_CAPACITY: usize = 1_000;

/// A relayer agent
#[derive(Debug)]
pub struct Relayer {
    settings: RelayerSettings,
    core_metrics: Arc<CoreMetrics>,
    queue: JobQueue,
    ingestor: Ingestor,
    pipeline: Arc<Pipeline>,
    fetcher: Arc<dyn VaaFetcher>,
}

#[async_trait]
impl BaseAgent for Relayer {
    const AGENT_NAME: &'static str = "relayer";

    type Settings = RelayerSettings;

    async fn from_settings(settings: Self::Settings, core_metrics: Arc<CoreMetrics>) -> Result<Self>
    where
        Self: Sized,
    {
        let db = DB::from_path(&settings.db)
            .wrap_err_with(|| format!("opening database at {}", settings.db.display()))?;
        let db = RelayerDb::new(db);

        let (events, _) = broadcast::channel(QUEUE_EVENTS_CAPACITY);
        let queue = JobQueue::new(db, settings.queue.clone(), events, &core_metrics);

        let guardian_sets: GuardianSets = settings.guardian_sets.iter().cloned().collect();
        if guardian_sets.current().is_none() {
            warn!("No guardian set configured, VAA signatures will not be verified");
        }
        let ingestor = Ingestor::new(
            queue.clone(),
            Arc::new(settings.whitelist.clone()),
            Arc::new(settings.blacklist.clone()),
            Arc::new(guardian_sets),
            core_metrics.vaas_ingested_count(),
        )
        .with_routes(settings.routes.iter().copied());

        let mut writers = vec![];
        for conf in settings.chains.values() {
            for writer in build_writers(conf)? {
                writers.push((conf.id(), writer));
            }
        }
        info!(wallets = writers.len(), "Starting wallet workers");
        let wallets = Arc::new(WalletExecutor::new(writers));

        let token_bridges: HashMap<ChainId, H256> = settings
            .chains
            .values()
            .map(|conf| (conf.id(), conf.token_bridge))
            .collect();
        let wrapped_native: HashMap<ChainId, H256> = settings
            .chains
            .values()
            .filter_map(|conf| Some((conf.id(), conf.wrapped_native?)))
            .collect();
        let middleware: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(LoggingMiddleware),
            Arc::new(ProvidersMiddleware::new(settings.chains.clone())),
            Arc::new(SourceTxMiddleware::from_conf(settings.explorer.as_ref())),
            Arc::new(TokenBridgeMiddleware::new(token_bridges)),
            Arc::new(WalletsMiddleware::new(wallets)),
            Arc::new(RelayHandler::new(wrapped_native)),
        ];
        let pipeline = Arc::new(Pipeline::new(
            middleware,
            core_metrics.relay_duration_seconds(),
        ));
        let fetcher = Arc::new(GuardianRestClient::new(settings.guardian_rpc.clone()));

        Ok(Self {
            settings,
            core_metrics,
            queue,
            ingestor,
            pipeline,
            fetcher,
        })
    }

    #[allow(clippy::async_yields_async)]
    async fn run(self) {
        let mut tasks = vec![];

        if let Err(err) = self.queue.recover_interrupted() {
            error!(?err, "Failed to requeue interrupted jobs");
        }
        tasks.push(self.run_queue_event_logger());
        tasks.extend(self.queue.start_workers(self.pipeline.clone()));
        tasks.push(self.queue.spawn_maintenance());

        match &self.settings.spy {
            Some(spy) => {
                let subscriber =
                    SpySubscriber::new(spy.clone(), &self.settings.routes, self.ingestor.clone());
                tasks.push(tokio::spawn(
                    subscriber.run().instrument(info_span!("SpySubscriber")),
                ));
            }
            None => warn!("No spy configured, only missed VAAs and requests are relayed"),
        }

        if self.settings.missed_vaas.enabled {
            let job = MissedVaaJob::new(
                self.settings.routes.clone(),
                self.settings.missed_vaas.clone(),
                self.fetcher.clone(),
                self.ingestor.clone(),
                self.queue.db().clone(),
                self.core_metrics.missed_vaas_recovered_count(),
            );
            tasks.push(tokio::spawn(job.run()));
        }

        let router = server::router(
            VaasApi::new(self.ingestor.clone(), self.fetcher.clone()),
            UiApi::new(self.queue.clone()),
        );
        let server = self.settings.server(self.core_metrics.clone());
        tasks.push(server.run_with_custom_router(router));

        info!(tasks = tasks.len(), "Relayer started");
        if let Err(err) = try_join_all(tasks).await {
            error!(error = ?err, "Relayer task panicked");
        }
    }
}

impl Relayer {
    fn run_queue_event_logger(&self) -> JoinHandle<()> {
        let mut events = self.queue.subscribe();
        tokio::spawn(
            async move {
                loop {
                    match events.recv().await {
                        Ok(QueueEvent::Added(id)) => debug!(%id, "Job added"),
                        Ok(QueueEvent::Completed { id, tx_id }) => {
                            info!(%id, ?tx_id, "Job completed")
                        }
                        Ok(QueueEvent::Failed { id, error }) => warn!(%id, %error, "Job failed"),
                        Err(RecvError::Lagged(skipped)) => debug!(skipped, "Queue events lagged"),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            .instrument(info_span!("QueueEvents")),
        )
    }
}
