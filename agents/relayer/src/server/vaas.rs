use std::{fmt::Display, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing, Router,
};
use derive_new::new;
use relayer_base::{
    db::JobState,
    server::utils::{ServerErrorResponse, ServerResult, ServerSuccessResponse},
};
use relayer_core::{
    vaa::{parse_emitter_address, VaaId},
    ChainId, RelayerError,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    guardian::VaaFetcher,
    ingest::{IngestOutcome, Ingestor, VaaSource},
};

const RELAY_VAA_ROUTE: &str = "/vaas/{emitter_chain}/{emitter_address}/{target_chain}/{sequence}";

/// Body returned for a VAA that has been relayed already.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedResponse {
    /// Redeeming transaction, `None` if the transfer needed no transaction
    pub tx_id: Option<String>,
}

/// Body returned once a fetched VAA has been queued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedResponse {
    /// Id of the new job
    pub job_id: String,
}

/// Manual (re)processing of a VAA by id.
#[derive(new, Clone, Debug)]
pub struct VaasApi {
    ingestor: Ingestor,
    fetcher: Arc<dyn VaaFetcher>,
}

fn internal_error(err: impl Display) -> ServerErrorResponse {
    ServerErrorResponse::with_message(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn already_queued() -> ServerErrorResponse {
    ServerErrorResponse::with_message(StatusCode::CONFLICT, "already queued")
}

fn relayed(tx_id: Option<String>) -> Response {
    ServerSuccessResponse::new(RelayedResponse { tx_id }).into_response()
}

async fn relay_vaa(
    State(api): State<VaasApi>,
    Path((emitter_chain, emitter_address, target_chain, sequence)): Path<(
        ChainId,
        String,
        ChainId,
        u64,
    )>,
) -> ServerResult<Response> {
    let emitter_address = parse_emitter_address(&emitter_address).ok_or_else(|| {
        ServerErrorResponse::with_message(StatusCode::BAD_REQUEST, "invalid emitter address")
    })?;
    api.relay(VaaId {
        emitter_chain,
        emitter_address,
        target_chain,
        sequence,
    })
    .await
}

impl VaasApi {
    /// Report the outcome of an earlier relay of `id`, or fetch the VAA from
    /// the guardians and queue it.
    #[instrument(skip(self), fields(%id))]
    pub async fn relay(&self, id: VaaId) -> ServerResult<Response> {
        let queue = self.ingestor.queue();
        if let Some(tx_id) = queue.get_tx_id(&id).map_err(internal_error)? {
            return Ok(relayed(Some(tx_id)));
        }
        if let Some(job) = queue.db().job(&id.to_string()).map_err(internal_error)? {
            return match job.state {
                JobState::Completed => Ok(relayed(job.tx_id)),
                JobState::Waiting | JobState::Active => Err(already_queued()),
                JobState::Failed => Err(ServerErrorResponse::with_message(
                    StatusCode::CONFLICT,
                    format!("relay failed: {}", job.last_error.unwrap_or_default()),
                )),
            };
        }

        let vaa_bytes = match self.fetcher.fetch_matching_vaa(&id).await {
            Ok(bytes) => bytes,
            Err(RelayerError::FetchNotFound(_)) => {
                return Err(ServerErrorResponse::with_message(
                    StatusCode::NOT_FOUND,
                    "not found",
                ))
            }
            Err(err) => {
                return Err(ServerErrorResponse::with_message(
                    StatusCode::BAD_GATEWAY,
                    err.to_string(),
                ))
            }
        };

        match self.ingestor.ingest(vaa_bytes, VaaSource::Http) {
            Ok(IngestOutcome::Queued(job)) => {
                info!(id = job.id, "Queued VAA on request");
                Ok(ServerSuccessResponse::new(QueuedResponse { job_id: job.id }).into_response())
            }
            Ok(IngestOutcome::Duplicate) => Err(already_queued()),
            Ok(IngestOutcome::Filtered) => Err(ServerErrorResponse::with_message(
                StatusCode::UNPROCESSABLE_ENTITY,
                "filtered out",
            )),
            Err(err) => Err(ServerErrorResponse::with_message(
                StatusCode::BAD_REQUEST,
                format!("{err:#}"),
            )),
        }
    }

    /// `POST /vaas/{emitterChain}/{emitterAddress}/{targetChain}/{sequence}`
    pub fn router(&self) -> Router {
        Router::new()
            .route(RELAY_VAA_ROUTE, routing::post(relay_vaa))
            .with_state(self.clone())
    }
}
