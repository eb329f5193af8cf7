mod api;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use mbo::market::Market;
use mbo::metrics::Metrics;
use mbo::stream::{Consumer, LatencyHistogram, ViolationPolicy};

/// Shared application state behind the Axum router.
pub struct State {
    pub market: Market,
    pub metrics: Arc<Metrics>,
}

impl State {
    fn from_env() -> Result<Self> {
        let metrics = Metrics::new().context("...while initializing metrics")?;
        Ok(Self {
            market: Market::new(),
            metrics,
        })
    }
}

fn violation_policy_from_env() -> ViolationPolicy {
    match std::env::var("MBO_ON_VIOLATION").as_deref() {
        Ok("abort") => ViolationPolicy::Abort,
        _ => ViolationPolicy::LogAndSkip,
    }
}

fn print_latency_report(applied: u64, latency: &LatencyHistogram) {
    let rendered: Vec<String> = latency
        .percentiles(&[50, 90, 99])
        .into_iter()
        .filter_map(|(p, v)| v.map(|us| format!("p{p}={us}us")))
        .collect();
    info!(applied, "latency percentiles (apply): {}", rendered.join(", "));
}

/// Runs the Stream Consumer on a dedicated blocking thread, applying records
/// to the shared `Market` one at a time under its `RwLock` (spec §5: the
/// core is single-threaded along the ingest path; the lock exists only
/// because HTTP readers share the same `Market`). Reconnects with a 1s
/// backoff on transport/decode failure or on a closed feed.
async fn run_ingest(state: Arc<RwLock<State>>, cancel: Arc<AtomicBool>) {
    let host = std::env::var("MBO_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("MBO_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9001u16);
    let policy = violation_policy_from_env();

    while !cancel.load(Ordering::Relaxed) {
        let mut consumer = match Consumer::connect(&host, port, policy) {
            Ok(consumer) => consumer,
            Err(err) => {
                warn!(%err, "failed to connect to feed, retrying in 1s");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let task_state = Arc::clone(&state);
        let task_cancel = Arc::clone(&cancel);
        let result = tokio::task::spawn_blocking(move || {
            let run_result = consumer.run(
                |record| {
                    let mut state = task_state.blocking_write();
                    state.metrics.order_book_updates.inc();
                    let timer = state.metrics.order_book_apply_duration.start_timer();
                    let result = state.market.apply(record);
                    timer.observe_duration();
                    match &result {
                        Ok(()) => state.metrics.messages_processed.inc(),
                        Err(_) => state.metrics.messages_rejected.inc(),
                    }
                    result
                },
                &task_cancel,
            );
            (run_result, consumer.latency)
        })
        .await;

        match result {
            Ok((Ok(stats), latency)) => {
                info!(applied = stats.applied, rejected = stats.rejected, "consumer stream ended");
                print_latency_report(stats.applied, &latency);
            }
            Ok((Err(err), latency)) => {
                error!(kind = err.kind(), %err, "consumer aborted");
                print_latency_report(0, &latency);
            }
            Err(join_err) => {
                error!(%join_err, "consumer task panicked");
            }
        }
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = Arc::new(RwLock::new(
        State::from_env().context("...while loading configuration from environment")?,
    ));

    let cancel = Arc::new(AtomicBool::new(false));
    let ingest = tokio::spawn(run_ingest(Arc::clone(&state), Arc::clone(&cancel)));

    let app = api::router(Arc::clone(&state));
    let addr = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("failed to bind to {addr}"))?;

    info!(addr, "starting HTTP server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cancel.store(true, Ordering::Relaxed);
    ingest.abort();
    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down gracefully...");
        },
    }
}
