//! Standalone Stream Consumer binary (spec §4.3, §6 CLI/exit behavior).
//!
//! Connects to a feed, applies every record to an in-memory `Market`, prints
//! aggregate latency statistics on exit, and on a fatal contract violation
//! exits non-zero with the offending record's error kind — grounded in
//! `original_source/mbo_tools/consumer.py`'s `__main__` block.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mbo::market::Market;
use mbo::stream::{Consumer, ViolationPolicy};

fn violation_policy_from_env() -> ViolationPolicy {
    // Unlike the library default (`LogAndSkip`, the policy `mbo`'s server
    // process uses), this CLI honors spec §6's documented three-way exit
    // contract by aborting on the first contract violation unless told
    // otherwise.
    match std::env::var("MBO_ON_VIOLATION").as_deref() {
        Ok("log_and_skip") => ViolationPolicy::LogAndSkip,
        _ => ViolationPolicy::Abort,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = std::env::var("MBO_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("MBO_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9001);
    let policy = violation_policy_from_env();

    let mut consumer = match Consumer::connect(&host, port, policy) {
        Ok(consumer) => consumer,
        Err(err) => {
            eprintln!("[consumer] failed to connect to {host}:{port}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let run_cancel = Arc::clone(&cancel);
    let run = tokio::task::spawn_blocking(move || {
        let mut market = Market::new();
        let run_result = consumer.run(|record| market.apply(record), &run_cancel);
        (run_result, consumer)
    });

    tokio::pin!(run);
    let (run_result, consumer) = tokio::select! {
        result = &mut run => result.expect("consumer thread panicked"),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n[consumer] interrupted, finishing current record...");
            cancel.store(true, Ordering::Relaxed);
            run.await.expect("consumer thread panicked")
        }
    };

    let pct = consumer.latency.percentiles(&[50, 90, 99]);
    let rendered: Vec<String> = pct
        .into_iter()
        .filter_map(|(p, v)| v.map(|us| format!("p{p}={us}us")))
        .collect();

    match run_result {
        Ok(stats) => {
            println!("[consumer] total applied messages: {}", stats.applied);
            println!("[consumer] total rejected messages: {}", stats.rejected);
            println!(
                "[consumer] latency percentiles (apply): {}",
                rendered.join(", ")
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("[consumer] fatal error ({}): {err}", err.kind());
            println!(
                "[consumer] latency percentiles (apply): {}",
                rendered.join(", ")
            );
            ExitCode::FAILURE
        }
    }
}
