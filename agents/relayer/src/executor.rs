//! Serialized access to wallets.
//!
//! Every signing key gets one worker task that owns the key's wallet and runs
//! the actions sent to it one after the other, so two transactions are never
//! built from the same nonce. Actions for a chain are spread over that
//! chain's keys round robin.

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::{future::BoxFuture, FutureExt};
use relayer_core::{ChainId, TokenBridgeWriter};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info_span, warn, Instrument};

type Action<W> = Box<dyn FnOnce(W) -> BoxFuture<'static, ()> + Send>;

/// Reasons an action could not be run at all.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// No key is configured for the chain
    #[error("No wallet configured for chain {0}")]
    NoWallet(ChainId),
    /// The worker exited or the action panicked
    #[error("Wallet worker stopped before the action completed")]
    WorkerStopped,
}

struct WorkerHandle<W> {
    tx: mpsc::UnboundedSender<Action<W>>,
    task: JoinHandle<()>,
}

/// Routes actions to per-key workers.
pub struct ActionExecutor<W> {
    workers: HashMap<(ChainId, usize), WorkerHandle<W>>,
    keys_per_chain: HashMap<ChainId, usize>,
    next_key: HashMap<ChainId, AtomicUsize>,
}

/// Executor over token bridge writers, one per configured private key.
pub type WalletExecutor = ActionExecutor<Arc<dyn TokenBridgeWriter>>;

impl<W> Debug for ActionExecutor<W> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("keys_per_chain", &self.keys_per_chain)
            .finish()
    }
}

impl<W: Clone + Send + 'static> ActionExecutor<W> {
    /// Start one worker per wallet. Wallets are grouped by chain and keep
    /// their order within a chain.
    pub fn new(wallets: impl IntoIterator<Item = (ChainId, W)>) -> Self {
        let mut workers = HashMap::new();
        let mut keys_per_chain: HashMap<ChainId, usize> = HashMap::new();
        for (chain, wallet) in wallets {
            let index = keys_per_chain.entry(chain).or_default();
            workers.insert((chain, *index), Self::spawn_worker(chain, *index, wallet));
            *index += 1;
        }
        let next_key = keys_per_chain
            .keys()
            .map(|chain| (*chain, AtomicUsize::new(0)))
            .collect();
        Self {
            workers,
            keys_per_chain,
            next_key,
        }
    }

    fn spawn_worker(chain: ChainId, index: usize, wallet: W) -> WorkerHandle<W> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Action<W>>();
        let task = tokio::spawn(
            async move {
                while let Some(action) = rx.recv().await {
                    action(wallet.clone()).await;
                }
                debug!("Wallet worker channel closed");
            }
            .instrument(info_span!("WalletWorker", chain, index)),
        );
        WorkerHandle { tx, task }
    }

    /// Number of wallets configured for `chain`.
    pub fn wallet_count(&self, chain: ChainId) -> usize {
        self.keys_per_chain.get(&chain).copied().unwrap_or_default()
    }

    /// Run `f` with the next wallet of `chain` and wait for its result. The
    /// wallet runs nothing else until `f` finishes. A panic inside `f` is
    /// reported as [`ExecutorError::WorkerStopped`] and leaves the worker
    /// running.
    pub async fn execute<T, F, Fut>(&self, chain: ChainId, f: F) -> eyre::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(W) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let count = self.wallet_count(chain);
        let counter = self
            .next_key
            .get(&chain)
            .filter(|_| count > 0)
            .ok_or(ExecutorError::NoWallet(chain))?;
        let index = counter.fetch_add(1, Ordering::Relaxed) % count;
        let worker = self
            .workers
            .get(&(chain, index))
            .ok_or(ExecutorError::NoWallet(chain))?;

        let (result_tx, result_rx) = oneshot::channel();
        let action: Action<W> = Box::new(move |wallet| {
            async move {
                let result = AssertUnwindSafe(f(wallet)).catch_unwind().await;
                let result = match result {
                    Ok(result) => result,
                    Err(_) => {
                        error!(chain, "Wallet action panicked");
                        Err(ExecutorError::WorkerStopped.into())
                    }
                };
                if result_tx.send(result).is_err() {
                    warn!(chain, "Caller stopped waiting for wallet action");
                }
            }
            .boxed()
        });
        worker
            .tx
            .send(action)
            .map_err(|_| ExecutorError::WorkerStopped)?;
        result_rx.await.map_err(|_| ExecutorError::WorkerStopped)?
    }
}

impl<W> Drop for ActionExecutor<W> {
    fn drop(&mut self) {
        for worker in self.workers.values() {
            worker.task.abort();
        }
    }
}
