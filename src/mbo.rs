//! The MBO record type this crate's core operates on.
//!
//! Spec §9 ("Dynamic record typing") calls for a tagged variant over record
//! kinds in a statically typed realization, with the book accepting only the
//! MBO variant. `MboRecord` is that tagged representation: a plain, safely
//! constructible struct the core engine (`Book`, `Market`, `PriceLevel`)
//! depends on directly. The external wire decoder (`databento::dbn::MboMsg`,
//! an out-of-scope collaborator per spec §1) is converted into this type
//! only at the ingestion boundary — see `stream::decode`.
//!
//! Because `Action` and `Side` are closed Rust enums, a value that doesn't
//! map to one of spec §3's known codes can't be represented here at all: the
//! "any other action code: fatal" contract violation is enforced at the
//! decode boundary (where the wire byte is validated) rather than as a
//! runtime catch-all deep inside `Book::apply`.

use std::collections::VecDeque;

use serde::Serialize;

/// Sentinel price value meaning "no price" (spec §3); paired with the TOB
/// flag it signals "remove this side entirely".
pub const UNDEF_PRICE: i64 = i64::MAX;

/// Top-of-book marker: this record is a summary level, not an individually
/// identifiable resting order (spec §3).
pub const FLAG_TOB: u8 = 1 << 7;

/// Last update of an event group; delimits consistent-snapshot boundaries
/// only, and does not affect book state transitions (spec §5).
pub const FLAG_LAST: u8 = 1 << 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Add,
    Cancel,
    Modify,
    Clear,
    Trade,
    Fill,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Ask,
    Bid,
    None,
}

/// One Market-By-Order feed event (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MboRecord {
    pub action: Action,
    pub side: Side,
    pub price: i64,
    pub size: u32,
    pub order_id: u64,
    pub flags: u8,
    pub instrument_id: u32,
    pub publisher_id: u16,
    pub ts_event: i64,
}

impl MboRecord {
    pub fn is_tob(&self) -> bool {
        self.flags & FLAG_TOB != 0
    }

    pub fn is_last(&self) -> bool {
        self.flags & FLAG_LAST != 0
    }
}

/// Insertion-ordered queue of resting orders at one price (spec §3
/// `LevelOrders`). Keyed by price in a `BTreeMap` this realizes the ordered
/// side index (spec §4.1 "Key algorithm"); the level itself only needs FIFO
/// push/remove-by-position, which `VecDeque` gives in O(1)/O(n).
pub type Level = VecDeque<MboRecord>;
