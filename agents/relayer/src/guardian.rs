use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::StatusCode;
use relayer_core::{
    vaa::{Vaa, VaaId},
    ChainCommunicationError, RelayerError,
};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::settings::GuardianRpcConf;

/// gRPC status code the guardian gateway uses for a VAA it does not have.
const GRPC_NOT_FOUND: i64 = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of signed VAAs by id.
#[async_trait]
pub trait VaaFetcher: Send + Sync + Debug {
    /// The signed VAA with `id`, or [`RelayerError::FetchNotFound`] if the
    /// guardians have not signed it (yet).
    async fn fetch_vaa(&self, id: &VaaId) -> Result<Vec<u8>, RelayerError>;

    /// Like [`VaaFetcher::fetch_vaa`], but the bytes must decode to a VAA
    /// with exactly `id`. Anything else is [`RelayerError::MismatchedVaa`].
    async fn fetch_matching_vaa(&self, id: &VaaId) -> Result<Vec<u8>, RelayerError> {
        let bytes = self.fetch_vaa(id).await?;
        let received = Vaa::decode(&bytes)?.id();
        if received != *id {
            return Err(RelayerError::MismatchedVaa {
                requested: *id,
                received,
            });
        }
        Ok(bytes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedVaaResponse {
    vaa_bytes: Option<String>,
    code: Option<i64>,
    message: Option<String>,
}

/// Client of the guardians' public REST API.
#[derive(Debug, Clone)]
pub struct GuardianRestClient {
    http: reqwest::Client,
    conf: GuardianRpcConf,
}

enum Attempt {
    Found(Vec<u8>),
    NotFound,
    Failed(ChainCommunicationError),
}

impl GuardianRestClient {
    /// Client over the configured hosts.
    pub fn new(conf: GuardianRpcConf) -> Self {
        Self {
            http: reqwest::Client::new(),
            conf,
        }
    }

    fn signed_vaa_url(host: &Url, id: &VaaId) -> Result<Url, url::ParseError> {
        host.join(&format!(
            "v1/signed_vaa/{}/{}/{}/{}",
            id.emitter_chain,
            id.emitter_address_hex(),
            id.target_chain,
            id.sequence
        ))
    }

    async fn fetch_from(&self, host: &Url, id: &VaaId) -> Attempt {
        let url = match Self::signed_vaa_url(host, id) {
            Ok(url) => url,
            Err(err) => return Attempt::Failed(ChainCommunicationError::from_other(err)),
        };
        let response = match self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return Attempt::Failed(ChainCommunicationError::from_other(err)),
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Attempt::NotFound;
        }
        let status = response.status();
        let body: SignedVaaResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => return Attempt::Failed(ChainCommunicationError::from_other(err)),
        };
        if body.code == Some(GRPC_NOT_FOUND) {
            return Attempt::NotFound;
        }
        match body.vaa_bytes {
            Some(encoded) => match STANDARD.decode(encoded) {
                Ok(bytes) => Attempt::Found(bytes),
                Err(err) => Attempt::Failed(ChainCommunicationError::from_other(err)),
            },
            None => Attempt::Failed(ChainCommunicationError::CustomError(format!(
                "guardian responded {status} without a VAA: {}",
                body.message.unwrap_or_default()
            ))),
        }
    }
}

#[async_trait]
impl VaaFetcher for GuardianRestClient {
    /// Tries every host in order, for up to `retries` rounds. Any host
    /// answering not-found ends the search.
    #[instrument(skip(self), fields(%id))]
    async fn fetch_vaa(&self, id: &VaaId) -> Result<Vec<u8>, RelayerError> {
        let mut last_error = ChainCommunicationError::from_other_str("no guardian hosts configured");
        for round in 0..self.conf.retries.max(1) {
            if round > 0 {
                tokio::time::sleep(self.conf.retry_timeout).await;
            }
            for host in &self.conf.hosts {
                match self.fetch_from(host, id).await {
                    Attempt::Found(bytes) => return Ok(bytes),
                    Attempt::NotFound => {
                        debug!(%host, "VAA not found");
                        return Err(RelayerError::FetchNotFound(*id));
                    }
                    Attempt::Failed(err) => {
                        warn!(%host, round, ?err, "Guardian request failed");
                        last_error = err;
                    }
                }
            }
        }
        Err(RelayerError::TransientNetwork(last_error))
    }
}
