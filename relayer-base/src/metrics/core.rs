use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use eyre::Result;
use prometheus::{
    histogram_opts, labels, opts, register_histogram_vec_with_registry,
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, Registry,
};

/// Macro to prefix a string with the namespace.
macro_rules! namespaced {
    ($name:expr) => {
        format!("{}_{}", super::NAMESPACE, $name)
    };
}

/// Metrics shared by every part of the relayer
pub struct CoreMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,
    listen_port: u16,
    agent_name: String,

    span_events: IntCounterVec,
    job_queue_length: IntGaugeVec,
    jobs_processed_count: IntCounterVec,
    vaas_ingested_count: IntCounterVec,
    missed_vaas_recovered_count: IntCounterVec,
    relay_duration_seconds: HistogramVec,
}

impl CoreMetrics {
    /// Track metrics for a particular agent name.
    ///
    /// - `for_agent` name of the agent these metrics are tracking.
    /// - `listen_port` port to start the HTTP server on.
    /// - `registry` prometheus registry to attach the metrics to
    pub fn new(for_agent: &str, listen_port: u16, registry: Registry) -> prometheus::Result<Self> {
        let const_labels: HashMap<String, String> = labels! {
            namespaced!("baselib_version") => env!("CARGO_PKG_VERSION").into(),
            "agent".into() => for_agent.into(),
        };
        let const_labels_ref = const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<HashMap<_, _>>();

        let span_events = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("span_events_total"),
                "Number of span events (logs and time metrics) emitted by level",
                const_labels_ref
            ),
            &["event_level"],
            registry
        )?;

        let job_queue_length = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("job_queue_length"),
                "Number of jobs in the durable queue by state",
                const_labels_ref
            ),
            &["state"],
            registry
        )?;

        let jobs_processed_count = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("jobs_processed_count"),
                "Number of job attempts by outcome",
                const_labels_ref
            ),
            &["outcome"],
            registry
        )?;

        let vaas_ingested_count = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("vaas_ingested_count"),
                "Number of VAAs offered to the queue by source and result",
                const_labels_ref
            ),
            &["source", "result"],
            registry
        )?;

        let missed_vaas_recovered_count = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("missed_vaas_recovered_count"),
                "Number of VAAs the missed VAA job fetched and queued",
                const_labels_ref
            ),
            &["emitter_chain", "target_chain"],
            registry
        )?;

        let relay_duration_seconds = register_histogram_vec_with_registry!(
            histogram_opts!(
                namespaced!("relay_duration_seconds"),
                "Duration of a relay attempt through the middleware pipeline",
                vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0],
                const_labels
            ),
            &["target_chain", "outcome"],
            registry
        )?;

        Ok(Self {
            agent_name: for_agent.into(),
            registry,
            listen_port,
            span_events,
            job_queue_length,
            jobs_processed_count,
            vaas_ingested_count,
            missed_vaas_recovered_count,
            relay_duration_seconds,
        })
    }

    /// Jobs currently held by the durable queue.
    ///
    /// Labels:
    /// - `state`: waiting, active, completed or failed.
    pub fn job_queue_length(&self) -> IntGaugeVec {
        self.job_queue_length.clone()
    }

    /// Finished job attempts.
    ///
    /// Labels:
    /// - `outcome`: `completed`, `retried` or `failed`.
    pub fn jobs_processed_count(&self) -> IntCounterVec {
        self.jobs_processed_count.clone()
    }

    /// VAAs offered to the queue.
    ///
    /// Labels:
    /// - `source`: `spy`, `missed` or `http`.
    /// - `result`: `queued`, `duplicate`, `filtered` or `invalid`.
    pub fn vaas_ingested_count(&self) -> IntCounterVec {
        self.vaas_ingested_count.clone()
    }

    /// VAAs recovered by the missed VAA job.
    pub fn missed_vaas_recovered_count(&self) -> IntCounterVec {
        self.missed_vaas_recovered_count.clone()
    }

    /// Wall time of relay attempts.
    ///
    /// Labels:
    /// - `target_chain`: chain the VAA is relayed to.
    /// - `outcome`: `success` or `failure`.
    pub fn relay_duration_seconds(&self) -> HistogramVec {
        self.relay_duration_seconds.clone()
    }

    /// Counts of tracing (logging framework) span events.
    ///
    /// Tracking the number of events emitted helps us verify logs are not being
    /// dropped and provides a quick way to query error and warning counts.
    ///
    /// Labels:
    /// - `event_level`: level of the event, i.e. trace, debug, info, warn,
    ///   error.
    pub fn span_events(&self) -> IntCounterVec {
        self.span_events.clone()
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics format)
    /// report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }
}

impl Debug for CoreMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CoreMetrics {{ agent_name: {}, listen_port: {:?} }}",
            self.agent_name, self.listen_port
        )
    }
}
