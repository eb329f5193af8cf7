use std::sync::Arc;

use anyhow::Result;
use prometheus::{Counter, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder};

/// Application metrics for monitoring (spec §9 ambient stack).
pub struct Metrics {
    registry: Registry,

    // Ingest metrics
    pub messages_processed: Counter,
    pub messages_rejected: Counter,

    // Order book metrics
    pub order_book_updates: Counter,
    pub order_book_depth: IntGauge,
    pub order_book_apply_duration: Histogram,

    // API metrics
    pub active_connections: IntGauge,
    pub http_requests_total: Counter,
    pub http_request_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let messages_processed = Counter::with_opts(Opts::new(
            "mbo_messages_processed_total",
            "Total number of MBO records successfully applied",
        ))?;
        registry.register(Box::new(messages_processed.clone()))?;

        let messages_rejected = Counter::with_opts(Opts::new(
            "mbo_messages_rejected_total",
            "Total number of MBO records rejected as contract violations",
        ))?;
        registry.register(Box::new(messages_rejected.clone()))?;

        let order_book_updates = Counter::with_opts(Opts::new(
            "mbo_order_book_updates_total",
            "Total number of order book updates",
        ))?;
        registry.register(Box::new(order_book_updates.clone()))?;

        let order_book_depth = IntGauge::with_opts(Opts::new(
            "mbo_order_book_depth",
            "Current total depth of the order book (bids + asks)",
        ))?;
        registry.register(Box::new(order_book_depth.clone()))?;

        let order_book_apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "mbo_order_book_apply_duration_seconds",
                "Duration of order book apply operations",
            )
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01]),
        )?;
        registry.register(Box::new(order_book_apply_duration.clone()))?;

        let active_connections = IntGauge::with_opts(Opts::new(
            "mbo_active_connections",
            "Number of active feed connections",
        ))?;
        registry.register(Box::new(active_connections.clone()))?;

        let http_requests_total = Counter::with_opts(Opts::new(
            "mbo_http_requests_total",
            "Total number of HTTP requests",
        ))?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new("mbo_http_request_duration_seconds", "HTTP request duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Arc::new(Self {
            registry,
            messages_processed,
            messages_rejected,
            order_book_updates,
            order_book_depth,
            order_book_apply_duration,
            active_connections,
            http_requests_total,
            http_request_duration,
        }))
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}
