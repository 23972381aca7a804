//! Subscriber of the guardian spy's signed VAA stream.

use std::collections::BTreeSet;

use eyre::{eyre, Result, WrapErr};
use relayer_core::{vaa::EmitterRoute, ChainId, H256};
use tonic::{
    codec::ProstCodec,
    codegen::http::uri::PathAndQuery,
    transport::{Channel, Endpoint},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    ingest::{IngestOutcome, Ingestor, VaaSource},
    settings::SpyConf,
};

const SUBSCRIBE_SIGNED_VAA: &str = "/spy.v1.SpyRPCService/SubscribeSignedVAA";

/// Request of `SubscribeSignedVAA`. An empty filter list streams everything.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SubscribeSignedVaaRequest {
    #[prost(message, repeated, tag = "1")]
    pub filters: Vec<FilterEntry>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FilterEntry {
    #[prost(oneof = "filter_entry::Filter", tags = "1")]
    pub filter: Option<filter_entry::Filter>,
}

pub mod filter_entry {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Filter {
        #[prost(message, tag = "1")]
        EmitterFilter(super::EmitterFilter),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EmitterFilter {
    #[prost(int32, tag = "1")]
    pub chain_id: i32,
    /// Unprefixed hex of the 32 byte emitter address
    #[prost(string, tag = "2")]
    pub emitter_address: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubscribeSignedVaaResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub vaa_bytes: Vec<u8>,
}

/// One filter per distinct emitter of `routes`.
pub fn emitter_filters(routes: &[EmitterRoute]) -> Vec<FilterEntry> {
    routes
        .iter()
        .map(|route| (route.emitter_chain, route.emitter_address))
        .collect::<BTreeSet<(ChainId, H256)>>()
        .into_iter()
        .map(|(chain, address)| FilterEntry {
            filter: Some(filter_entry::Filter::EmitterFilter(EmitterFilter {
                chain_id: chain.into(),
                emitter_address: hex::encode(address.as_bytes()),
            })),
        })
        .collect()
}

/// Streams signed VAAs from the spy into the ingest path, reconnecting
/// whenever the stream ends.
#[derive(Debug)]
pub struct SpySubscriber {
    conf: SpyConf,
    filters: Vec<FilterEntry>,
    ingestor: Ingestor,
}

impl SpySubscriber {
    /// Subscriber for the emitters of `routes`.
    pub fn new(conf: SpyConf, routes: &[EmitterRoute], ingestor: Ingestor) -> Self {
        Self {
            conf,
            filters: emitter_filters(routes),
            ingestor,
        }
    }

    /// Run until the task is aborted.
    pub async fn run(self) {
        loop {
            match self.subscribe().await {
                Ok(()) => info!("Spy stream ended"),
                Err(err) => warn!(?err, "Spy subscription failed"),
            }
            tokio::time::sleep(self.conf.reconnect_backoff).await;
        }
    }

    async fn connect(&self) -> Result<Channel> {
        Endpoint::from_shared(self.conf.host.clone())
            .wrap_err("invalid spy host")?
            .connect()
            .await
            .wrap_err_with(|| format!("connecting to spy at {}", self.conf.host))
    }

    #[instrument(skip(self), fields(host = %self.conf.host))]
    async fn subscribe(&self) -> Result<()> {
        let mut grpc = tonic::client::Grpc::new(self.connect().await?);
        grpc.ready()
            .await
            .map_err(|err| eyre!("spy service not ready: {err}"))?;
        let request = tonic::Request::new(SubscribeSignedVaaRequest {
            filters: self.filters.clone(),
        });
        let mut stream = grpc
            .server_streaming(
                request,
                PathAndQuery::from_static(SUBSCRIBE_SIGNED_VAA),
                ProstCodec::<SubscribeSignedVaaRequest, SubscribeSignedVaaResponse>::default(),
            )
            .await?
            .into_inner();
        info!(filters = self.filters.len(), "Subscribed to spy");

        while let Some(message) = stream.message().await? {
            match self.ingestor.ingest(message.vaa_bytes, VaaSource::Spy) {
                Ok(IngestOutcome::Queued(job)) => debug!(id = job.id, "Spy VAA queued"),
                Ok(outcome) => debug!(?outcome, "Spy VAA not queued"),
                Err(err) => warn!(?err, "Dropping spy VAA"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn one_filter_per_emitter() {
        let emitter = EmitterRoute {
            emitter_chain: 2,
            emitter_address: H256::repeat_byte(0xab),
            target_chain: 255,
        };
        let other_target = EmitterRoute {
            target_chain: 4,
            ..emitter
        };
        let filters = emitter_filters(&[emitter, other_target]);
        assert_eq!(filters.len(), 1);
        let Some(filter_entry::Filter::EmitterFilter(filter)) = &filters[0].filter else {
            panic!("expected an emitter filter");
        };
        assert_eq!(filter.chain_id, 2);
        assert_eq!(filter.emitter_address, "ab".repeat(32));
    }

    #[test]
    fn decodes_stream_messages() {
        let response = SubscribeSignedVaaResponse::decode(&[0x0a, 0x03, 1, 2, 3][..]).unwrap();
        assert_eq!(response.vaa_bytes, vec![1, 2, 3]);

        let request = SubscribeSignedVaaRequest {
            filters: emitter_filters(&[EmitterRoute {
                emitter_chain: 1,
                emitter_address: H256::zero(),
                target_chain: 2,
            }]),
        };
        let bytes = request.encode_to_vec();
        // filters (1, len) -> emitter_filter (1, len) -> chain_id (1, varint 1)
        assert_eq!(&bytes[..1], &[0x0a]);
        assert_eq!(&bytes[2..3], &[0x0a]);
        assert_eq!(&bytes[4..6], &[0x08, 0x01]);
        assert_eq!(SubscribeSignedVaaRequest::decode(&bytes[..]).unwrap(), request);
    }
}
