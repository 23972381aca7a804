use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{layer::Context, Layer};

/// Counts emitted events by level into a prometheus counter.
pub struct EventCounter {
    counts: prometheus::IntCounterVec,
}

impl EventCounter {
    /// Constructor.
    pub fn new(counts: prometheus::IntCounterVec) -> Self {
        Self { counts }
    }
}

impl<S: Subscriber> Layer<S> for EventCounter {
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        let level = match *event.metadata().level() {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            _ => "error",
        };
        self.counts.with_label_values(&[level]).inc();
    }
}
