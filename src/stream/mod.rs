//! The Stream Consumer: a TCP client that reads a DBN-encoded MBO feed and
//! applies each record to a [`crate::market::Market`] (spec §4.3).

mod consumer;

pub use consumer::{convert, Consumer, ConsumerStats, LatencyHistogram, ViolationPolicy};
