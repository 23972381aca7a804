use std::{collections::HashSet, sync::Arc};

use derive_new::new;
use eyre::Result;
use prometheus::IntCounterVec;
use relayer_base::db::Job;
use relayer_core::{
    payload::{parse_payload, Module},
    vaa::{EmitterRoute, Vaa},
    GuardianSets, RelayerError,
};
use tracing::{debug, instrument, warn};

use crate::{
    queue::JobQueue,
    settings::matching_list::{MatchInfo, MatchingList},
};

/// Where a VAA came from, used as a metric label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum VaaSource {
    /// Streamed by the spy
    Spy,
    /// Fetched by the missed VAA job
    Missed,
    /// Requested through the HTTP endpoint
    Http,
}

/// What happened to an ingested VAA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored as a new job
    Queued(Job),
    /// A job with the same id exists
    Duplicate,
    /// Rejected by the white- or blacklist, or on no configured route
    Filtered,
}

/// Entry point for signed VAA bytes from every source: decode, verify,
/// filter, then enqueue.
#[derive(Debug, Clone, new)]
pub struct Ingestor {
    queue: JobQueue,
    whitelist: Arc<MatchingList>,
    blacklist: Arc<MatchingList>,
    guardian_sets: Arc<GuardianSets>,
    ingested: IntCounterVec,
    /// Accepted (emitter chain, emitter, target chain) triples; empty accepts
    /// every route.
    #[new(default)]
    routes: Arc<HashSet<EmitterRoute>>,
}

/// Name of the payload for filtering, "Unknown" if no parser accepts it.
pub fn payload_type(vaa: &Vaa) -> &'static str {
    let modules: &[Module] = if vaa.is_governance() {
        &[Module::Core, Module::TokenBridge, Module::NftBridge]
    } else {
        &[Module::TokenBridge, Module::NftBridge]
    };
    modules
        .iter()
        .find_map(|module| parse_payload(*module, &vaa.payload))
        .map_or("Unknown", |payload| payload.kind())
}

impl Ingestor {
    /// Only accept VAAs on `routes`.
    pub fn with_routes(mut self, routes: impl IntoIterator<Item = EmitterRoute>) -> Self {
        self.routes = Arc::new(routes.into_iter().collect());
        self
    }

    /// The queue accepted VAAs are pushed to.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Whether VAAs are checked against guardian signatures. Without any
    /// configured guardian set the spy is trusted.
    pub fn verifies_signatures(&self) -> bool {
        self.guardian_sets.current().is_some()
    }

    /// Push `vaa_bytes` through the filter into the queue. Filtered VAAs are
    /// recorded as seen so the missed VAA job does not fetch them again.
    #[instrument(skip_all, fields(%source))]
    pub fn ingest(&self, vaa_bytes: Vec<u8>, source: VaaSource) -> Result<IngestOutcome> {
        let result = self.try_ingest(vaa_bytes);
        let label = match &result {
            Ok(IngestOutcome::Queued(_)) => "queued",
            Ok(IngestOutcome::Duplicate) => "duplicate",
            Ok(IngestOutcome::Filtered) => "filtered",
            Err(_) => "invalid",
        };
        self.ingested
            .with_label_values(&[&source.to_string(), label])
            .inc();
        result
    }

    fn try_ingest(&self, vaa_bytes: Vec<u8>) -> Result<IngestOutcome> {
        let vaa = Vaa::decode(&vaa_bytes).map_err(RelayerError::from)?;
        let id = vaa.id();

        if self.verifies_signatures() {
            let now = (relayer_core::now_millis() / 1000) as u32;
            let verification = self.guardian_sets.verify(&vaa, now);
            if !verification.is_valid() {
                warn!(%id, ?verification, "Dropping VAA that failed verification");
                return Err(RelayerError::Verification(verification).into());
            }
        }

        let payload_type = payload_type(&vaa);
        let info = MatchInfo {
            emitter_chain: vaa.emitter_chain,
            emitter_address: &vaa.emitter_address,
            target_chain: vaa.target_chain,
            payload_type,
        };
        let routed = self.routes.is_empty() || self.routes.contains(&id.route());
        if !routed || !self.whitelist.matches(&info, true) || self.blacklist.matches(&info, false) {
            debug!(%id, payload_type, routed, "VAA filtered out");
            self.queue.db().mark_sequence_seen(&id)?;
            return Ok(IngestOutcome::Filtered);
        }

        Ok(match self.queue.add_vaa_to_queue(vaa_bytes)? {
            Some(job) => IngestOutcome::Queued(job),
            None => IngestOutcome::Duplicate,
        })
    }
}

#[cfg(test)]
mod tests {
    use relayer_base::db::{test_utils::run_test_db, JobState};
    use relayer_core::{
        payload::TransferToken,
        test_utils::{dummy_vaa, test_guardian_set, test_keys, TEST_CORE_UPGRADE_VAA},
        vaa::sign,
        Encode, H256, U256,
    };

    use super::*;
    use crate::test_utils::test_ingestor;

    fn transfer_vaa() -> Vaa {
        let transfer = TransferToken {
            amount: U256::from(1_000),
            token_address: H256::repeat_byte(7),
            token_chain: 2,
            recipient: H256::repeat_byte(9),
            recipient_chain: 255,
            fee: U256::zero(),
        };
        dummy_vaa(transfer.to_vec().unwrap())
    }

    #[test]
    fn names_payload_types() {
        assert_eq!(payload_type(&transfer_vaa()), "TransferToken");
        assert_eq!(payload_type(&dummy_vaa(vec![0xff; 3])), "Unknown");
        let upgrade = Vaa::decode(&hex::decode(TEST_CORE_UPGRADE_VAA).unwrap()).unwrap();
        assert_eq!(payload_type(&upgrade), "ContractUpgrade");

        // governance payloads only count when the governance emitter sent them
        let mut fake = upgrade.clone();
        fake.emitter_address = H256::repeat_byte(1);
        assert_eq!(payload_type(&fake), "Unknown");
    }

    #[tokio::test]
    async fn whitelist_and_blacklist() {
        run_test_db(|db| async move {
            let whitelist: MatchingList =
                serde_json::from_str(r#"[{"payloadType": "TransferToken"}]"#).unwrap();
            let blacklist: MatchingList =
                serde_json::from_str(r#"[{"emitterChain": "bsc"}]"#).unwrap();
            let ingestor = test_ingestor(db, whitelist, blacklist, GuardianSets::default());

            let queued = ingestor
                .ingest(transfer_vaa().encode().unwrap(), VaaSource::Spy)
                .unwrap();
            assert!(matches!(queued, IngestOutcome::Queued(_)));
            assert_eq!(
                ingestor
                    .ingest(transfer_vaa().encode().unwrap(), VaaSource::Http)
                    .unwrap(),
                IngestOutcome::Duplicate
            );

            let mut from_bsc = transfer_vaa();
            from_bsc.emitter_chain = 4;
            assert_eq!(
                ingestor.ingest(from_bsc.encode().unwrap(), VaaSource::Spy).unwrap(),
                IngestOutcome::Filtered
            );
            let not_a_transfer = dummy_vaa(vec![0xff; 3]);
            assert_eq!(
                ingestor
                    .ingest(not_a_transfer.encode().unwrap(), VaaSource::Spy)
                    .unwrap(),
                IngestOutcome::Filtered
            );
            assert_eq!(
                ingestor
                    .queue
                    .db()
                    .seen_sequences(&not_a_transfer.id().route())
                    .unwrap(),
                vec![3]
            );
            assert_eq!(ingestor.queue.count(JobState::Waiting).unwrap(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn unrouted_targets_are_filtered() {
        run_test_db(|db| async move {
            let route = transfer_vaa().id().route();
            let ingestor = test_ingestor(
                db,
                MatchingList::default(),
                MatchingList::default(),
                GuardianSets::default(),
            )
            .with_routes([route]);

            let mut elsewhere = transfer_vaa();
            elsewhere.target_chain = 4;
            assert_eq!(
                ingestor.ingest(elsewhere.encode().unwrap(), VaaSource::Spy).unwrap(),
                IngestOutcome::Filtered
            );
            assert_eq!(
                ingestor
                    .queue
                    .db()
                    .seen_sequences(&elsewhere.id().route())
                    .unwrap(),
                vec![3]
            );
            assert_eq!(ingestor.queue.count(JobState::Waiting).unwrap(), 0);

            assert!(matches!(
                ingestor
                    .ingest(transfer_vaa().encode().unwrap(), VaaSource::Spy)
                    .unwrap(),
                IngestOutcome::Queued(_)
            ));
        })
        .await;
    }

    #[tokio::test]
    async fn rejects_unverified_vaas() {
        run_test_db(|db| async move {
            let keys = test_keys(3);
            let sets: GuardianSets = [test_guardian_set(0, &keys)].into_iter().collect();
            let ingestor = test_ingestor(db, MatchingList::default(), MatchingList::default(), sets);
            assert!(ingestor.verifies_signatures());

            let mut vaa = transfer_vaa();
            vaa.signatures = sign(&keys[..2], &vaa).unwrap();
            let err = ingestor.ingest(vaa.encode().unwrap(), VaaSource::Spy).unwrap_err();
            assert!(matches!(
                RelayerError::find_in(&err),
                Some(RelayerError::Verification(_))
            ));

            vaa.signatures = sign(&keys, &vaa).unwrap();
            assert!(matches!(
                ingestor.ingest(vaa.encode().unwrap(), VaaSource::Spy).unwrap(),
                IngestOutcome::Queued(_)
            ));
        })
        .await;
    }

    #[tokio::test]
    async fn garbage_is_an_error() {
        run_test_db(|db| async move {
            let ingestor = test_ingestor(
                db,
                MatchingList::default(),
                MatchingList::default(),
                GuardianSets::default(),
            );
            let err = ingestor.ingest(vec![9, 9, 9], VaaSource::Spy).unwrap_err();
            assert!(!RelayerError::is_report_retryable(&err));
        })
        .await;
    }
}
