use std::collections::HashMap;

use rocksdb::{Transaction, TransactionDB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::{debug, trace};

use relayer_core::vaa::{EmitterRoute, VaaId};
use relayer_core::UnixMillis;

use super::{DbError, Job, JobState, DB};

// these keys MUST not be given multiple uses in case multiple agents are
// started with the same database.

const JOB: &str = "job_";
const WAITING: &str = "waiting_";
const ACTIVE: &str = "active_";
const COMPLETED: &str = "completed_";
const FAILED: &str = "failed_";
const TX_ID: &str = "tx_id_";
const SEEN_SEQUENCE: &str = "seen_sequence_";
const IN_PROGRESS: &str = "in_progress_";

const EMPTY: &[u8] = &[];

type Result<T> = std::result::Result<T, DbError>;

/// DB handle for the relayer's job queue, its record of which sequences have
/// been relayed and the markers of fetches in flight.
#[derive(Debug, Clone)]
pub struct RelayerDb(DB);

impl std::ops::Deref for RelayerDb {
    type Target = DB;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<DB> for RelayerDb {
    fn as_ref(&self) -> &DB {
        &self.0
    }
}

fn key(prefix: &str, parts: &[&[u8]]) -> Vec<u8> {
    let mut key = prefix.as_bytes().to_vec();
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

fn job_key(id: &str) -> Vec<u8> {
    key(JOB, &[id.as_bytes()])
}

fn timed_key(prefix: &str, at: UnixMillis, id: &str) -> Vec<u8> {
    key(prefix, &[&at.to_be_bytes(), id.as_bytes()])
}

/// Split a key written by `timed_key` back into its time and id.
fn parse_timed_key<'a>(prefix: &str, key: &'a [u8]) -> Option<(UnixMillis, &'a str)> {
    let rest = key.strip_prefix(prefix.as_bytes())?;
    if rest.len() < 8 {
        return None;
    }
    let (at, id) = rest.split_at(8);
    let at = UnixMillis::from_be_bytes(at.try_into().ok()?);
    Some((at, std::str::from_utf8(id).ok()?))
}

fn route_prefix(route: &EmitterRoute) -> Vec<u8> {
    key(
        SEEN_SEQUENCE,
        &[
            &route.emitter_chain.to_be_bytes(),
            route.emitter_address.as_bytes(),
            &route.target_chain.to_be_bytes(),
        ],
    )
}

fn seen_key(id: &VaaId) -> Vec<u8> {
    let mut key = route_prefix(&id.route());
    key.extend_from_slice(&id.sequence.to_be_bytes());
    key
}

fn finished_prefix(state: JobState) -> Option<&'static str> {
    match state {
        JobState::Completed => Some(COMPLETED),
        JobState::Failed => Some(FAILED),
        JobState::Waiting | JobState::Active => None,
    }
}

fn encode<T: Serialize>(key: &[u8], value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| DbError::CorruptRecord {
        key: String::from_utf8_lossy(key).into_owned(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| DbError::CorruptRecord {
        key: String::from_utf8_lossy(key).into_owned(),
        source,
    })
}

impl RelayerDb {
    /// Instantiate a new `RelayerDb`
    pub fn new(db: DB) -> Self {
        Self(db)
    }

    fn job_for_update(
        &self,
        txn: &Transaction<'_, TransactionDB>,
        id: &str,
    ) -> Result<Option<Job>> {
        let key = job_key(id);
        txn.get_for_update(&key, true)?
            .map(|bytes| decode(&key, &bytes))
            .transpose()
    }

    fn put_job(&self, txn: &Transaction<'_, TransactionDB>, job: &Job) -> Result<()> {
        let key = job_key(&job.id);
        txn.put(&key, encode(&key, job)?)?;
        Ok(())
    }

    /// Queue `job` unless a job with the same id, or its retained record,
    /// already exists. Returns whether the job was inserted.
    ///
    /// Keys --> Values:
    /// - `job_<id>` --> `job`
    /// - `waiting_<run_at><id>` --> ()
    pub fn insert_job(&self, job: &Job) -> Result<bool> {
        let txn = self.transaction();
        if txn.get_for_update(job_key(&job.id), true)?.is_some() {
            trace!(id = job.id, "Job already present");
            return Ok(false);
        }
        self.put_job(&txn, job)?;
        txn.put(timed_key(WAITING, job.run_at, &job.id), EMPTY)?;
        txn.commit()?;
        debug!(id = job.id, "Stored new job");
        Ok(true)
    }

    /// Claim the earliest job that is due at `now`, moving it to `Active` and
    /// counting the attempt. Jobs another worker is claiming concurrently are
    /// skipped.
    pub fn claim_due_job(&self, now: UnixMillis) -> Result<Option<Job>> {
        for item in self.prefix_iterator(WAITING.as_bytes()) {
            let (waiting_key, _) = item?;
            let Some((run_at, id)) = parse_timed_key(WAITING, &waiting_key) else {
                continue;
            };
            if run_at > now {
                break;
            }
            match self.try_claim(&waiting_key, id) {
                Ok(Some(job)) => return Ok(Some(job)),
                Ok(None) => continue,
                Err(err) if err.is_contention() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    fn try_claim(&self, waiting_key: &[u8], id: &str) -> Result<Option<Job>> {
        let txn = self.transaction();
        if txn.get_for_update(waiting_key, true)?.is_none() {
            return Ok(None);
        }
        let Some(mut job) = self.job_for_update(&txn, id)? else {
            // dangling index entry
            txn.delete(waiting_key)?;
            txn.commit()?;
            return Ok(None);
        };
        txn.delete(waiting_key)?;
        job.state = JobState::Active;
        job.attempts += 1;
        self.put_job(&txn, &job)?;
        txn.put(key(ACTIVE, &[id.as_bytes()]), EMPTY)?;
        txn.commit()?;
        Ok(Some(job))
    }

    /// Move an active job to `Completed`, record its transaction id and mark
    /// its sequence as seen, all in one transaction.
    pub fn complete_job(
        &self,
        id: &str,
        tx_id: Option<String>,
        now: UnixMillis,
    ) -> Result<Option<Job>> {
        let txn = self.transaction();
        let Some(mut job) = self.job_for_update(&txn, id)? else {
            return Ok(None);
        };
        txn.delete(key(ACTIVE, &[id.as_bytes()]))?;
        job.state = JobState::Completed;
        job.finished_at = Some(now);
        job.last_error = None;
        job.tx_id = tx_id;
        self.put_job(&txn, &job)?;
        txn.put(timed_key(COMPLETED, now, id), EMPTY)?;
        if let Some(tx_id) = &job.tx_id {
            txn.put(key(TX_ID, &[id.as_bytes()]), tx_id.as_bytes())?;
        }
        txn.put(seen_key(&job.vaa_id), EMPTY)?;
        txn.commit()?;
        Ok(Some(job))
    }

    /// Put an active job back in the waiting set, due at `run_at`.
    pub fn retry_job(&self, id: &str, error: String, run_at: UnixMillis) -> Result<Option<Job>> {
        let txn = self.transaction();
        let Some(mut job) = self.job_for_update(&txn, id)? else {
            return Ok(None);
        };
        txn.delete(key(ACTIVE, &[id.as_bytes()]))?;
        job.state = JobState::Waiting;
        job.run_at = run_at;
        job.last_error = Some(error);
        self.put_job(&txn, &job)?;
        txn.put(timed_key(WAITING, run_at, id), EMPTY)?;
        txn.commit()?;
        Ok(Some(job))
    }

    /// Move an active job to `Failed`.
    pub fn fail_job(&self, id: &str, error: String, now: UnixMillis) -> Result<Option<Job>> {
        let txn = self.transaction();
        let Some(mut job) = self.job_for_update(&txn, id)? else {
            return Ok(None);
        };
        txn.delete(key(ACTIVE, &[id.as_bytes()]))?;
        job.state = JobState::Failed;
        job.finished_at = Some(now);
        job.last_error = Some(error);
        self.put_job(&txn, &job)?;
        txn.put(timed_key(FAILED, now, id), EMPTY)?;
        txn.commit()?;
        Ok(Some(job))
    }

    /// Return jobs left `Active` by a previous run to the waiting set. Call
    /// before any worker starts.
    pub fn requeue_active_jobs(&self, now: UnixMillis) -> Result<usize> {
        let ids = self
            .prefix_iterator(ACTIVE.as_bytes())
            .map(|item| {
                item.map(|(key, _)| String::from_utf8_lossy(&key[ACTIVE.len()..]).into_owned())
            })
            .collect::<Result<Vec<_>>>()?;
        for id in &ids {
            let txn = self.transaction();
            if let Some(mut job) = self.job_for_update(&txn, id)? {
                job.state = JobState::Waiting;
                job.run_at = now;
                self.put_job(&txn, &job)?;
                txn.put(timed_key(WAITING, now, id), EMPTY)?;
            }
            txn.delete(key(ACTIVE, &[id.as_bytes()]))?;
            txn.commit()?;
        }
        Ok(ids.len())
    }

    /// Delete completed and failed jobs that finished before `cutoff`. The
    /// transaction id of a completed job is kept.
    pub fn prune_finished_jobs(&self, cutoff: UnixMillis) -> Result<usize> {
        let mut pruned = 0;
        for prefix in [COMPLETED, FAILED] {
            let expired = self
                .prefix_iterator(prefix.as_bytes())
                .map_while(|item| match item {
                    Ok((key, _)) => match parse_timed_key(prefix, &key) {
                        Some((at, id)) if at < cutoff => Some(Ok((key.to_vec(), id.to_owned()))),
                        _ => None,
                    },
                    Err(err) => Some(Err(err)),
                })
                .collect::<Result<Vec<_>>>()?;
            for (index_key, id) in expired {
                let txn = self.transaction();
                txn.delete(&index_key)?;
                txn.delete(job_key(&id))?;
                txn.commit()?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Retrieve a job by its id
    pub fn job(&self, id: &str) -> Result<Option<Job>> {
        let key = job_key(id);
        self.retrieve(&key)?
            .map(|bytes| decode(&key, &bytes))
            .transpose()
    }

    /// Up to `limit` jobs in `state`. Waiting jobs come in due order, finished
    /// jobs most recent first.
    pub fn jobs_in_state(&self, state: JobState, limit: usize) -> Result<Vec<Job>> {
        let ids: Vec<String> = match state {
            JobState::Waiting => self.timed_ids(WAITING)?,
            JobState::Active => self
                .prefix_iterator(ACTIVE.as_bytes())
                .map(|item| {
                    item.map(|(key, _)| {
                        String::from_utf8_lossy(&key[ACTIVE.len()..]).into_owned()
                    })
                })
                .collect::<Result<_>>()?,
            JobState::Completed | JobState::Failed => {
                let prefix = finished_prefix(state).unwrap_or(COMPLETED);
                let mut ids = self.timed_ids(prefix)?;
                ids.reverse();
                ids
            }
        };
        let mut jobs = Vec::with_capacity(ids.len().min(limit));
        for id in ids.iter().take(limit) {
            if let Some(job) = self.job(id)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn timed_ids(&self, prefix: &str) -> Result<Vec<String>> {
        self.prefix_iterator(prefix.as_bytes())
            .filter_map(|item| match item {
                Ok((key, _)) => parse_timed_key(prefix, &key).map(|(_, id)| Ok(id.to_owned())),
                Err(err) => Some(Err(err)),
            })
            .collect()
    }

    /// Number of jobs in each state.
    pub fn job_counts(&self) -> Result<HashMap<JobState, usize>> {
        JobState::iter()
            .map(|state| {
                let prefix = match state {
                    JobState::Waiting => WAITING,
                    JobState::Active => ACTIVE,
                    JobState::Completed => COMPLETED,
                    JobState::Failed => FAILED,
                };
                let mut count = 0;
                for item in self.prefix_iterator(prefix.as_bytes()) {
                    item?;
                    count += 1;
                }
                Ok((state, count))
            })
            .collect()
    }

    /// Transaction id of the relay of `id`, if it was relayed by us.
    pub fn retrieve_tx_id(&self, id: &VaaId) -> Result<Option<String>> {
        Ok(self
            .retrieve(&key(TX_ID, &[id.to_string().as_bytes()]))?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Record that `id` has been processed.
    pub fn mark_sequence_seen(&self, id: &VaaId) -> Result<()> {
        self.store(&seen_key(id), EMPTY)
    }

    /// Seen sequences of `route`, ascending.
    pub fn seen_sequences(&self, route: &EmitterRoute) -> Result<Vec<u64>> {
        let prefix = route_prefix(route);
        self.prefix_iterator(&prefix)
            .filter_map(|item| match item {
                Ok((key, _)) => key
                    .get(prefix.len()..)
                    .and_then(|seq| <[u8; 8]>::try_from(seq).ok())
                    .map(|seq| Ok(u64::from_be_bytes(seq))),
                Err(err) => Some(Err(err)),
            })
            .collect()
    }

    /// Collapse the gap free ascending run at the start of the seen set to
    /// its last element. Gap detection only looks above the smallest seen
    /// sequence, so nothing is lost.
    pub fn compact_seen_sequences(&self, route: &EmitterRoute) -> Result<usize> {
        let seen = self.seen_sequences(route)?;
        let run = seen
            .windows(2)
            .take_while(|pair| pair[1] == pair[0] + 1)
            .count();
        for sequence in &seen[..run] {
            self.delete(&seen_key(&route.at(*sequence)))?;
        }
        Ok(run)
    }

    /// Whether a fetch of `id` was started less than its TTL ago.
    pub fn is_in_progress(&self, id: &VaaId, now: UnixMillis) -> Result<bool> {
        Ok(self
            .retrieve(&key(IN_PROGRESS, &[id.to_string().as_bytes()]))?
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_slice()).ok())
            .is_some_and(|expiry| UnixMillis::from_be_bytes(expiry) > now))
    }

    /// Atomically claim the in-progress marker of `id` for `ttl` millis.
    /// Returns false if another claim is still fresh.
    pub fn try_mark_in_progress(&self, id: &VaaId, now: UnixMillis, ttl: u64) -> Result<bool> {
        let key = key(IN_PROGRESS, &[id.to_string().as_bytes()]);
        let txn = self.transaction();
        let fresh = txn
            .get_for_update(&key, true)?
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_slice()).ok())
            .is_some_and(|expiry| UnixMillis::from_be_bytes(expiry) > now);
        if fresh {
            return Ok(false);
        }
        txn.put(&key, (now + ttl).to_be_bytes())?;
        txn.commit()?;
        Ok(true)
    }

    /// Delete in-progress markers that expired at or before `now`.
    pub fn prune_expired_markers(&self, now: UnixMillis) -> Result<usize> {
        let keys = self
            .prefix_iterator(IN_PROGRESS.as_bytes())
            .map(|item| item.map(|(key, _)| key))
            .collect::<Result<Vec<_>>>()?;
        let mut pruned = 0;
        for key in keys {
            let txn = self.transaction();
            let fresh = txn
                .get_for_update(&key, true)?
                .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_slice()).ok())
                .is_some_and(|expiry| UnixMillis::from_be_bytes(expiry) > now);
            if fresh {
                continue;
            }
            txn.delete(&key)?;
            txn.commit()?;
            pruned += 1;
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use relayer_core::H256;

    use super::*;
    use crate::db::test_utils::run_test_db;

    fn vaa_id(sequence: u64) -> VaaId {
        VaaId {
            emitter_chain: 2,
            emitter_address: H256::repeat_byte(0x11),
            target_chain: 255,
            sequence,
        }
    }

    fn job(sequence: u64, now: UnixMillis) -> Job {
        Job::new(vaa_id(sequence), vec![1, 2, 3], 3, now)
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            assert!(db.insert_job(&job(1, 10)).unwrap());
            assert!(!db.insert_job(&job(1, 20)).unwrap());
            assert_eq!(db.job_counts().unwrap()[&JobState::Waiting], 1);
            assert_eq!(db.job(&vaa_id(1).to_string()).unwrap().unwrap().created_at, 10);
        })
        .await;
    }

    #[tokio::test]
    async fn claims_in_due_order() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            let mut later = job(1, 10);
            later.run_at = 500;
            db.insert_job(&later).unwrap();
            db.insert_job(&job(2, 100)).unwrap();

            let claimed = db.claim_due_job(200).unwrap().unwrap();
            assert_eq!(claimed.vaa_id.sequence, 2);
            assert_eq!(claimed.state, JobState::Active);
            assert_eq!(claimed.attempts, 1);
            assert!(db.claim_due_job(200).unwrap().is_none());
            assert_eq!(db.claim_due_job(500).unwrap().unwrap().vaa_id.sequence, 1);
        })
        .await;
    }

    #[tokio::test]
    async fn lifecycle_moves_between_sets() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            db.insert_job(&job(1, 0)).unwrap();
            db.insert_job(&job(2, 0)).unwrap();

            let first = db.claim_due_job(0).unwrap().unwrap();
            db.retry_job(&first.id, "rpc down".into(), 50).unwrap();
            assert_eq!(db.jobs_in_state(JobState::Waiting, 10).unwrap().len(), 2);

            let second = db.claim_due_job(10).unwrap().unwrap();
            assert_eq!(second.vaa_id.sequence, 2);
            db.complete_job(&second.id, Some("0xabc".into()), 20).unwrap();
            assert_eq!(
                db.retrieve_tx_id(&vaa_id(2)).unwrap().as_deref(),
                Some("0xabc")
            );
            assert_eq!(db.seen_sequences(&vaa_id(2).route()).unwrap(), vec![2]);

            let first = db.claim_due_job(60).unwrap().unwrap();
            assert_eq!(first.attempts, 2);
            db.fail_job(&first.id, "reverted".into(), 70).unwrap();

            let counts = db.job_counts().unwrap();
            assert_eq!(counts[&JobState::Waiting], 0);
            assert_eq!(counts[&JobState::Active], 0);
            assert_eq!(counts[&JobState::Completed], 1);
            assert_eq!(counts[&JobState::Failed], 1);
            let failed = db.jobs_in_state(JobState::Failed, 10).unwrap();
            assert_eq!(failed[0].last_error.as_deref(), Some("reverted"));
        })
        .await;
    }

    #[tokio::test]
    async fn pruning_keeps_tx_ids() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            db.insert_job(&job(1, 0)).unwrap();
            let claimed = db.claim_due_job(0).unwrap().unwrap();
            db.complete_job(&claimed.id, Some("0x1".into()), 100).unwrap();

            assert_eq!(db.prune_finished_jobs(100).unwrap(), 0);
            assert_eq!(db.prune_finished_jobs(101).unwrap(), 1);
            assert!(db.job(&claimed.id).unwrap().is_none());
            assert_eq!(db.retrieve_tx_id(&vaa_id(1)).unwrap().as_deref(), Some("0x1"));
            // the id is free again once the record is gone
            assert!(db.insert_job(&job(1, 200)).unwrap());
        })
        .await;
    }

    #[tokio::test]
    async fn interrupted_jobs_are_requeued() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            db.insert_job(&job(1, 0)).unwrap();
            db.claim_due_job(0).unwrap().unwrap();
            assert_eq!(db.requeue_active_jobs(5).unwrap(), 1);
            let again = db.claim_due_job(5).unwrap().unwrap();
            assert_eq!(again.attempts, 2);
        })
        .await;
    }

    #[tokio::test]
    async fn compaction_keeps_last_of_leading_run() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            for sequence in [0, 1, 2, 3, 5, 6, 9] {
                db.mark_sequence_seen(&vaa_id(sequence)).unwrap();
            }
            let route = vaa_id(0).route();
            assert_eq!(db.compact_seen_sequences(&route).unwrap(), 3);
            assert_eq!(db.seen_sequences(&route).unwrap(), vec![3, 5, 6, 9]);
            assert_eq!(db.compact_seen_sequences(&route).unwrap(), 0);
        })
        .await;
    }

    #[tokio::test]
    async fn routes_do_not_share_sequences() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            db.mark_sequence_seen(&vaa_id(4)).unwrap();
            let mut other = vaa_id(7);
            other.target_chain = 2;
            db.mark_sequence_seen(&other).unwrap();
            assert_eq!(db.seen_sequences(&vaa_id(0).route()).unwrap(), vec![4]);
            assert_eq!(db.seen_sequences(&other.route()).unwrap(), vec![7]);
        })
        .await;
    }

    #[tokio::test]
    async fn in_progress_marker_expires() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            let id = vaa_id(3);
            assert!(!db.is_in_progress(&id, 0).unwrap());
            assert!(db.try_mark_in_progress(&id, 0, 100).unwrap());
            assert!(db.is_in_progress(&id, 50).unwrap());
            assert!(!db.try_mark_in_progress(&id, 50, 100).unwrap());
            assert!(!db.is_in_progress(&id, 100).unwrap());
            assert!(db.try_mark_in_progress(&id, 100, 100).unwrap());
        })
        .await;
    }

    #[tokio::test]
    async fn expired_markers_are_pruned() {
        run_test_db(|db| async move {
            let db = RelayerDb::new(db);
            assert!(db.try_mark_in_progress(&vaa_id(1), 0, 100).unwrap());
            assert!(db.try_mark_in_progress(&vaa_id(2), 50, 100).unwrap());
            db.mark_sequence_seen(&vaa_id(1)).unwrap();

            assert_eq!(db.prune_expired_markers(120).unwrap(), 1);
            assert!(db
                .retrieve(&key(IN_PROGRESS, &[vaa_id(1).to_string().as_bytes()]))
                .unwrap()
                .is_none());
            assert!(db.is_in_progress(&vaa_id(2), 120).unwrap());
            assert_eq!(db.seen_sequences(&vaa_id(1).route()).unwrap(), vec![1]);

            assert_eq!(db.prune_expired_markers(150).unwrap(), 1);
            assert_eq!(db.prune_expired_markers(150).unwrap(), 0);
        })
        .await;
    }
}
