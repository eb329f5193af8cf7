//! Egress snapshot shape (spec §6).

use mbo::book::Book;
use mbo::mbo::{Action, MboRecord, Side};
use mbo::snapshot::book_snapshot;

fn add(side: Side, price: i64, size: u32, order_id: u64) -> MboRecord {
    MboRecord {
        action: Action::Add,
        side,
        price,
        size,
        order_id,
        flags: 0,
        instrument_id: 1,
        publisher_id: 1,
        ts_event: 0,
    }
}

#[test]
fn bids_descend_and_asks_ascend() {
    let mut book = Book::new();
    book.apply(add(Side::Bid, 100, 1, 1)).unwrap();
    book.apply(add(Side::Bid, 102, 1, 2)).unwrap();
    book.apply(add(Side::Bid, 101, 1, 3)).unwrap();
    book.apply(add(Side::Ask, 110, 1, 4)).unwrap();
    book.apply(add(Side::Ask, 108, 1, 5)).unwrap();

    let snap = book_snapshot(&book, false);
    let bid_prices: Vec<i64> = snap.bids.iter().map(|l| l.level.price).collect();
    let ask_prices: Vec<i64> = snap.asks.iter().map(|l| l.level.price).collect();

    assert_eq!(bid_prices, vec![102, 101, 100]);
    assert_eq!(ask_prices, vec![108, 110]);
    assert!(snap.bids.iter().all(|l| l.orders.is_none()));
}

#[test]
fn include_orders_attaches_per_order_detail() {
    let mut book = Book::new();
    book.apply(add(Side::Bid, 100, 3, 1)).unwrap();
    book.apply(add(Side::Bid, 100, 4, 2)).unwrap();

    let snap = book_snapshot(&book, true);
    let level = snap.bids.iter().find(|l| l.level.price == 100).unwrap();
    let orders = level.orders.as_ref().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order_id, 1);
    assert_eq!(orders[1].order_id, 2);
}
