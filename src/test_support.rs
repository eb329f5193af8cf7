//! Fixture helpers for constructing [`crate::mbo::MboRecord`] values in tests.

use crate::mbo::{Action, MboRecord, Side, FLAG_TOB};

#[allow(clippy::too_many_arguments)]
pub fn mbo(action: Action, side: Side, price: i64, size: u32, order_id: u64, flags: u8) -> MboRecord {
    MboRecord {
        action,
        side,
        price,
        size,
        order_id,
        flags,
        instrument_id: 1,
        publisher_id: 1,
        ts_event: 0,
    }
}

/// A top-of-book summary Add: no individual order id, just a size/price
/// replacement for the whole side.
pub fn mbo_tob(side: Side, price: i64, size: u32) -> MboRecord {
    mbo(Action::Add, side, price, size, 0, FLAG_TOB)
}
