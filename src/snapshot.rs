//! Serializable snapshots of book/market state for the HTTP export surface
//! (spec §6), shaped after `original_source/order_book.py`'s
//! `Book.to_dict`/`Market.to_dict`.

use std::collections::HashMap;

use databento::dbn::pretty::Px;
use serde::Serialize;

use crate::book::Book;
use crate::mbo::{Action, MboRecord, Side};
use crate::market::Market;
use crate::price_level::PriceLevel;

/// One resting order within a snapshot level (spec §6 egress format).
#[derive(Debug, Clone, Serialize)]
pub struct OrderSnapshot {
    pub order_id: u64,
    pub price: i64,
    pub pretty_price: String,
    pub size: u32,
    pub side: Side,
    pub action: Action,
    pub flags: u8,
    pub instrument_id: u32,
    pub publisher_id: u16,
}

impl From<&MboRecord> for OrderSnapshot {
    fn from(o: &MboRecord) -> Self {
        OrderSnapshot {
            order_id: o.order_id,
            price: o.price,
            pretty_price: Px(o.price).to_string(),
            size: o.size,
            side: o.side,
            action: o.action,
            flags: o.flags,
            instrument_id: o.instrument_id,
            publisher_id: o.publisher_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelSnapshot {
    #[serde(flatten)]
    pub level: PriceLevel,
    /// Present only when the snapshot was requested with `include_orders`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<Vec<OrderSnapshot>>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct BookSnapshot {
    /// Best first: highest price first for bids, lowest first for asks.
    pub bids: Vec<LevelSnapshot>,
    pub asks: Vec<LevelSnapshot>,
}

/// `{instrument_id: {publisher_id: BookSnapshot}}` (spec §6).
#[derive(Debug, Clone, Serialize, Default)]
pub struct MarketSnapshot(pub HashMap<u32, HashMap<u16, BookSnapshot>>);

fn level_snapshots(
    book: &Book,
    side: Side,
    levels: impl Iterator<Item = PriceLevel>,
    include_orders: bool,
) -> Vec<LevelSnapshot> {
    levels
        .map(|level| LevelSnapshot {
            orders: include_orders.then(|| {
                book.orders_at(level.price, side)
                    .map(OrderSnapshot::from)
                    .collect()
            }),
            level,
        })
        .collect()
}

pub fn book_snapshot(book: &Book, include_orders: bool) -> BookSnapshot {
    BookSnapshot {
        bids: level_snapshots(book, Side::Bid, book.bid_levels(), include_orders),
        asks: level_snapshots(book, Side::Ask, book.ask_levels(), include_orders),
    }
}

pub fn market_snapshot(market: &Market, include_orders: bool) -> MarketSnapshot {
    let mut out: HashMap<u32, HashMap<u16, BookSnapshot>> = HashMap::new();
    for instrument_id in market.instrument_ids() {
        let Some(books_by_pub) = market.books_by_pub(instrument_id) else {
            continue;
        };
        let per_pub = books_by_pub
            .iter()
            .map(|(publisher_id, book)| (*publisher_id, book_snapshot(book, include_orders)))
            .collect();
        out.insert(instrument_id, per_pub);
    }
    MarketSnapshot(out)
}
