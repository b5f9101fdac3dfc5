use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub dispatch_queue_depth: IntGauge,
    pub dispatch_latency_seconds: HistogramVec,
    pub status_transitions_total: IntCounterVec,
    pub earnings_recorded_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let dispatch_queue_depth = IntGauge::new(
            "dispatch_queue_depth",
            "Orders waiting for the dispatch worker",
        )
        .expect("valid dispatch_queue_depth metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of a single dispatch pass in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new("status_transitions_total", "Committed order status changes"),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let earnings_recorded_total = IntCounterVec::new(
            Opts::new(
                "earnings_recorded_total",
                "Completion credits by outcome (applied or duplicate)",
            ),
            &["outcome"],
        )
        .expect("valid earnings_recorded_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(dispatch_queue_depth.clone()))
            .expect("register dispatch_queue_depth");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(earnings_recorded_total.clone()))
            .expect("register earnings_recorded_total");

        Self {
            registry,
            assignments_total,
            dispatch_queue_depth,
            dispatch_latency_seconds,
            status_transitions_total,
            earnings_recorded_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
