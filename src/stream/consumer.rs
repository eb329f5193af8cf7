//! TCP client that decodes a DBN-encoded MBO feed and applies each record to
//! a [`crate::market::Market`] (spec §4.3).
//!
//! Grounded in `original_source/mbo_tools/consumer.py`'s `run_consumer`: a
//! blocking socket read loop driving a streaming decoder, with per-record
//! latency tracked in a bucketed histogram and reported as percentiles on
//! exit. The decode step itself is realized with `databento::dbn`'s own
//! `Decoder`, generalized from the teacher's `Decoder::from_file` to a
//! buffered `TcpStream` — `Decoder<R>` only needs `R: std::io::Read`.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use databento::dbn::decode::{dbn::Decoder, DecodeRecord};
use databento::dbn::{Action as DbAction, MboMsg, Side as DbSide};
use tracing::{error, info, warn};

use crate::error::{BookError, ConsumerError, ContractViolation};
use crate::mbo::{Action, MboRecord, Side, FLAG_LAST, FLAG_TOB};

/// Matches the teacher's own file-decoding chunk size
/// (`original_source/mbo_tools/consumer.py`'s `RECV_CHUNK_SIZE`), reused here
/// as the `BufReader` capacity over the socket.
const RECV_CHUNK_SIZE: usize = 81_920;

/// Read timeout on the underlying socket, so a blocking read can't park the
/// thread past a cancellation request on an otherwise idle feed (spec §5
/// "Cancellation"). A timeout here is not an error: `Consumer::run` treats
/// the resulting `WouldBlock`/`TimedOut` as "no record yet, recheck
/// cancellation" and keeps reading.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What to do when a record is rejected as a contract violation.
///
/// Defaults to `LogAndSkip`, matching `consumer.py`'s `handle_rec`, which
/// logs the `KeyError` and keeps consuming the feed rather than aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    #[default]
    LogAndSkip,
    Abort,
}

/// Microsecond latency histogram for `Market::apply` calls, bucketed by
/// exact microsecond value exactly as `consumer.py`'s `stats: Counter[int]`.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    buckets: BTreeMap<u64, u64>,
    total: u64,
}

impl LatencyHistogram {
    pub fn record(&mut self, micros: u64) {
        *self.buckets.entry(micros).or_default() += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// The smallest microsecond bucket whose cumulative count reaches the
    /// `p`th percentile of all recorded samples, per
    /// `consumer.py`'s `percentiles_from_stats`.
    pub fn percentile(&self, p: u64) -> Option<u64> {
        if self.total == 0 {
            return None;
        }
        let target = (self.total * p) as f64 / 100.0;
        let mut cumulative = 0u64;
        for (&micros, &count) in &self.buckets {
            cumulative += count;
            if cumulative as f64 >= target {
                return Some(micros);
            }
        }
        self.buckets.keys().next_back().copied()
    }

    pub fn percentiles(&self, levels: &[u64]) -> Vec<(u64, Option<u64>)> {
        levels.iter().map(|&p| (p, self.percentile(p))).collect()
    }
}

/// Walks an error's `source()` chain looking for an I/O error that means
/// "no data available within the read timeout" rather than a real failure.
fn is_read_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur = Some(err);
    while let Some(e) = cur {
        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io_err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            );
        }
        cur = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let hist = LatencyHistogram::default();
        assert_eq!(hist.total(), 0);
        assert_eq!(hist.percentile(50), None);
    }

    #[test]
    fn percentile_walks_cumulative_buckets() {
        let mut hist = LatencyHistogram::default();
        for micros in [1, 1, 1, 2, 3, 3, 5, 8, 13, 21] {
            hist.record(micros);
        }
        assert_eq!(hist.total(), 10);
        assert_eq!(hist.percentile(50), Some(3));
        assert_eq!(hist.percentile(100), Some(21));
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let mut hist = LatencyHistogram::default();
        hist.record(42);
        for p in [1, 50, 99, 100] {
            assert_eq!(hist.percentile(p), Some(42));
        }
    }

    #[derive(Debug)]
    struct WrappedIoError(std::io::Error);

    impl std::fmt::Display for WrappedIoError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "wrapped: {}", self.0)
        }
    }

    impl std::error::Error for WrappedIoError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn read_timeout_is_recognized_through_a_wrapped_source_chain() {
        let timed_out = WrappedIoError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "no data within read timeout",
        ));
        assert!(is_read_timeout(&timed_out));

        let would_block = WrappedIoError(std::io::Error::new(std::io::ErrorKind::WouldBlock, "wait"));
        assert!(is_read_timeout(&would_block));
    }

    #[test]
    fn other_io_errors_are_not_read_timeouts() {
        let broken_pipe = WrappedIoError(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "connection reset",
        ));
        assert!(!is_read_timeout(&broken_pipe));
    }
}

/// Translate a wire-decoded [`MboMsg`] into this crate's own [`MboRecord`].
///
/// This is the single point where an unrecognized action or side code is
/// turned into a fatal [`ContractViolation`] — `crate::mbo::Action`/`Side`
/// are closed enums, so `Book`/`Market` never see a value that doesn't map
/// onto one of spec §3's known codes.
pub fn convert(mbo: &MboMsg) -> Result<MboRecord, BookError> {
    let action = match mbo.action().map_err(|_| ContractViolation::UnknownAction)? {
        DbAction::Add => Action::Add,
        DbAction::Cancel => Action::Cancel,
        DbAction::Modify => Action::Modify,
        DbAction::Clear => Action::Clear,
        DbAction::Trade => Action::Trade,
        DbAction::Fill => Action::Fill,
        DbAction::None => Action::None,
    };
    let side = match mbo.side().unwrap_or(DbSide::None) {
        DbSide::Ask => Side::Ask,
        DbSide::Bid => Side::Bid,
        DbSide::None => Side::None,
    };
    let mut flags = 0u8;
    if mbo.flags.is_tob() {
        flags |= FLAG_TOB;
    }
    if mbo.flags.is_last() {
        flags |= FLAG_LAST;
    }
    Ok(MboRecord {
        action,
        side,
        price: mbo.price,
        size: mbo.size,
        order_id: mbo.order_id,
        flags,
        instrument_id: mbo.hd.instrument_id,
        publisher_id: mbo.hd.publisher_id,
        ts_event: mbo.hd.ts_event as i64,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsumerStats {
    pub applied: u64,
    pub rejected: u64,
    pub cancelled: bool,
}

/// A connected feed reader. Construct with [`Consumer::connect`], then drain
/// it with [`Consumer::run`].
pub struct Consumer {
    decoder: Decoder<BufReader<TcpStream>>,
    policy: ViolationPolicy,
    pub latency: LatencyHistogram,
    stats: ConsumerStats,
}

impl Consumer {
    pub fn connect(host: &str, port: u16, policy: ViolationPolicy) -> Result<Self, ConsumerError> {
        info!(host, port, "connecting to MBO feed");
        let stream = TcpStream::connect((host, port)).map_err(ConsumerError::Transport)?;
        stream
            .set_read_timeout(Some(CANCEL_POLL_INTERVAL))
            .map_err(ConsumerError::Transport)?;
        info!("connected");
        let reader = BufReader::with_capacity(RECV_CHUNK_SIZE, stream);
        let decoder = Decoder::new(reader).map_err(|e| ConsumerError::Decode(e.into()))?;
        Ok(Self {
            decoder,
            policy,
            latency: LatencyHistogram::default(),
            stats: ConsumerStats::default(),
        })
    }

    /// Consume records until the feed closes, dispatching each to `handler`
    /// (spec §4.3: "dispatch each decoded record to a handler"). Individual
    /// contract violations the handler returns are handled per
    /// `self.policy` rather than aborting the whole run, unless the policy
    /// is `Abort`.
    ///
    /// `cancel` is checked once per iteration, before blocking on the next
    /// record, and again every [`CANCEL_POLL_INTERVAL`] while the read is
    /// blocked on an idle feed (the socket's read timeout surfaces as a
    /// `WouldBlock`/`TimedOut` error, which is not treated as fatal — see
    /// [`is_read_timeout`]). A set flag ends the loop cleanly after the
    /// current record has finished applying (spec §5 "exit after finishing
    /// the current apply"), never mid-record.
    pub fn run(
        &mut self,
        mut handler: impl FnMut(MboRecord) -> Result<(), BookError>,
        cancel: &AtomicBool,
    ) -> Result<ConsumerStats, ConsumerError> {
        loop {
            if cancel.load(Ordering::Relaxed) {
                info!("consumer cancelled");
                self.stats.cancelled = true;
                break;
            }
            let mbo = match self.decoder.decode_record::<MboMsg>() {
                Ok(Some(mbo)) => mbo,
                Ok(None) => {
                    info!("feed closed by remote");
                    break;
                }
                Err(e) if is_read_timeout(&e) => continue,
                Err(e) => return Err(ConsumerError::Decode(e.into())),
            };
            let order_id = mbo.order_id;
            let record = convert(mbo);

            let start = Instant::now();
            let result = record.and_then(&mut handler);
            // Ceiling division: spec §9 "Latency hook" requires elapsed
            // microseconds rounded up, mirroring `consumer.py`'s
            // `(elapsed_ns + 1_000 - 1) // 1_000`.
            let elapsed_us = (start.elapsed().as_nanos() as u64 + 999) / 1000;
            self.latency.record(elapsed_us);

            match result {
                Ok(()) => self.stats.applied += 1,
                Err(err) => {
                    self.stats.rejected += 1;
                    match self.policy {
                        ViolationPolicy::LogAndSkip => {
                            warn!(order_id, kind = err.kind(), %err, "skipped record");
                        }
                        ViolationPolicy::Abort => {
                            error!(order_id, kind = err.kind(), %err, "aborting on contract violation");
                            return Err(err.into());
                        }
                    }
                }
            }
        }
        Ok(self.stats)
    }
}
