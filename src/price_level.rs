use databento::dbn::pretty::Px;
use serde::Serialize;

use crate::mbo::MboRecord;

/// Aggregate view of a single price: total resting size and order count.
///
/// `count` excludes TOB summary records (they are not individually
/// identifiable resting orders, so they never contribute to the count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    pub price: i64,
    pub size: u32,
    pub count: u32,
}

impl PriceLevel {
    pub fn new<'a>(price: i64, orders: impl Iterator<Item = &'a MboRecord>) -> Self {
        orders.fold(
            PriceLevel {
                price,
                size: 0,
                count: 0,
            },
            |mut level, order| {
                if !order.is_tob() {
                    level.count += 1;
                }
                level.size += order.size;
                level
            },
        )
    }
}

impl std::fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:4} @ {:6.2} | {:2} order(s)",
            self.size,
            Px(self.price),
            self.count
        )
    }
}
