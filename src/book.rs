use std::collections::{BTreeMap, HashMap};

use crate::error::{BookError, ContractViolation};
use crate::mbo::{Action, Level, MboRecord, Side, UNDEF_PRICE};
use crate::price_level::PriceLevel;

/// The resting limit order book for a single (instrument, publisher) pair.
///
/// Holds every resting order by id plus two price-ordered level indices.
/// `apply` is all-or-nothing: either every invariant in spec §3 holds after
/// the call, or an error is returned and nothing was mutated.
#[derive(Debug, Default)]
pub struct Book {
    orders_by_id: HashMap<u64, (Side, i64)>,
    bids: BTreeMap<i64, Level>,
    offers: BTreeMap<i64, Level>,
    /// When set, a Modify for an order that isn't currently resting is
    /// rejected instead of being treated as an Add (spec §9 Open Question).
    strict_modify: bool,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject unknown-order Modify instead of falling back to Add.
    pub fn with_strict_modify(strict_modify: bool) -> Self {
        Self {
            strict_modify,
            ..Self::default()
        }
    }

    pub fn bbo(&self) -> (Option<PriceLevel>, Option<PriceLevel>) {
        (self.bid_level(0), self.ask_level(0))
    }

    pub fn bid_level(&self, idx: usize) -> Option<PriceLevel> {
        self.bids
            .iter()
            .rev() // highest price first
            .nth(idx)
            .map(|(price, orders)| PriceLevel::new(*price, orders.iter()))
    }

    pub fn ask_level(&self, idx: usize) -> Option<PriceLevel> {
        self.offers
            .iter() // lowest price first
            .nth(idx)
            .map(|(price, orders)| PriceLevel::new(*price, orders.iter()))
    }

    pub fn get_level_by_price(&self, price: i64, side: Side) -> Option<PriceLevel> {
        self.side_levels(side)?
            .get(&price)
            .map(|orders| PriceLevel::new(price, orders.iter()))
    }

    pub fn get_order(&self, order_id: u64) -> Option<&MboRecord> {
        let &(side, price) = self.orders_by_id.get(&order_id)?;
        let level = self.side_levels(side)?.get(&price)?;
        level.iter().find(|o| o.order_id == order_id)
    }

    /// Sum of sizes of orders resting ahead of `order_id` in its level,
    /// in insertion order. `None` if the id is not currently resting.
    pub fn get_queue_pos(&self, order_id: u64) -> Option<u32> {
        let &(side, price) = self.orders_by_id.get(&order_id)?;
        let level = self.side_levels(side)?.get(&price)?;
        Some(
            level
                .iter()
                .take_while(|o| o.order_id != order_id)
                .fold(0, |acc, o| acc + o.size),
        )
    }

    /// Top `depth` levels on each side, paired by rank. Missing levels on
    /// either side leave that entry `None` for the corresponding rank.
    pub fn get_snapshot(&self, depth: usize) -> Vec<(Option<PriceLevel>, Option<PriceLevel>)> {
        (0..depth)
            .map(|i| (self.bid_level(i), self.ask_level(i)))
            .collect()
    }

    /// Every resting bid level, best (highest price) first.
    pub fn bid_levels(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids
            .iter()
            .rev()
            .map(|(price, orders)| PriceLevel::new(*price, orders.iter()))
    }

    /// Every resting offer level, best (lowest price) first.
    pub fn ask_levels(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.offers
            .iter()
            .map(|(price, orders)| PriceLevel::new(*price, orders.iter()))
    }

    /// Orders resting at `price` on `side`, in queue (insertion) order.
    pub fn orders_at(&self, price: i64, side: Side) -> impl Iterator<Item = &MboRecord> {
        self.side_levels(side)
            .and_then(|levels| levels.get(&price))
            .into_iter()
            .flatten()
    }

    /// Apply one MBO record, per the dispatch rules in spec §4.1.
    #[tracing::instrument(skip(self, mbo), fields(order_id = mbo.order_id))]
    pub fn apply(&mut self, mbo: MboRecord) -> Result<(), BookError> {
        match mbo.action {
            Action::Trade | Action::Fill | Action::None => return Ok(()),
            Action::Clear => {
                self.clear();
                return Ok(());
            }
            Action::Add | Action::Cancel | Action::Modify => {}
        }

        if mbo.side != Side::Ask && mbo.side != Side::Bid {
            return Err(BookError::InvalidSide { side: mbo.side });
        }

        // TOB side-drop precedes action dispatch (spec §4.1).
        if mbo.price == UNDEF_PRICE && mbo.is_tob() {
            self.side_levels_mut(mbo.side).clear();
            return Ok(());
        }

        match mbo.action {
            Action::Add => self.add(mbo),
            Action::Cancel => self.cancel(mbo),
            Action::Modify => self.modify(mbo),
            Action::Trade | Action::Fill | Action::None | Action::Clear => {
                unreachable!("handled above")
            }
        }
    }

    fn clear(&mut self) {
        self.orders_by_id.clear();
        self.bids.clear();
        self.offers.clear();
    }

    fn add(&mut self, mbo: MboRecord) -> Result<(), BookError> {
        let side = mbo.side;
        if mbo.is_tob() {
            let levels = self.side_levels_mut(side);
            levels.clear();
            levels.insert(mbo.price, Level::from([mbo]));
            Ok(())
        } else {
            self.add_resting(mbo)
        }
    }

    /// The non-TOB Add path, also used by Modify's "not resting yet" fallback.
    fn add_resting(&mut self, mbo: MboRecord) -> Result<(), BookError> {
        let order_id = mbo.order_id;
        if self.orders_by_id.contains_key(&order_id) {
            return Err(ContractViolation::DuplicateAdd { order_id }.into());
        }
        let (side, price) = (mbo.side, mbo.price);
        self.side_levels_mut(side)
            .entry(price)
            .or_default()
            .push_back(mbo);
        self.orders_by_id.insert(order_id, (side, price));
        Ok(())
    }

    fn cancel(&mut self, mbo: MboRecord) -> Result<(), BookError> {
        let order_id = mbo.order_id;
        let &(side, price) = self
            .orders_by_id
            .get(&order_id)
            .ok_or(ContractViolation::UnknownOrder { order_id })?;

        let levels = self.side_levels_mut(side);
        let level = levels
            .get_mut(&price)
            .expect("invariant: orders_by_id and level index stay in sync");
        let idx = find_order(level, order_id);

        let resting_size = level[idx].size;
        if mbo.size > resting_size {
            return Err(ContractViolation::OverCancel {
                order_id,
                cancel_size: mbo.size,
                resting_size,
            }
            .into());
        }

        level[idx].size -= mbo.size;
        if level[idx].size == 0 {
            level.remove(idx);
            if level.is_empty() {
                levels.remove(&price);
            }
            self.orders_by_id.remove(&order_id);
        }
        Ok(())
    }

    fn modify(&mut self, mbo: MboRecord) -> Result<(), BookError> {
        let order_id = mbo.order_id;
        let side = mbo.side;
        let Some(&(prev_side, prev_price)) = self.orders_by_id.get(&order_id) else {
            if self.strict_modify {
                return Err(ContractViolation::UnknownOrder { order_id }.into());
            }
            return self.add_resting(mbo);
        };
        if prev_side != side {
            return Err(ContractViolation::SideMismatch { order_id }.into());
        }

        let prev_size = {
            let level = self.level(prev_side, prev_price);
            level[find_order(level, order_id)].size
        };
        let keep_priority = prev_price == mbo.price && mbo.size <= prev_size;

        if keep_priority {
            let level = self.level_mut(prev_side, prev_price);
            let idx = find_order(level, order_id);
            level[idx] = mbo.clone();
        } else {
            {
                let level = self.level_mut(prev_side, prev_price);
                let idx = find_order(level, order_id);
                level.remove(idx);
            }
            if self.level(prev_side, prev_price).is_empty() {
                self.side_levels_mut(prev_side).remove(&prev_price);
            }
            self.side_levels_mut(side)
                .entry(mbo.price)
                .or_default()
                .push_back(mbo.clone());
        }

        self.orders_by_id.insert(order_id, (side, mbo.price));
        Ok(())
    }

    fn level(&self, side: Side, price: i64) -> &Level {
        self.side_levels(side)
            .and_then(|levels| levels.get(&price))
            .expect("invariant: orders_by_id and level index stay in sync")
    }

    fn level_mut(&mut self, side: Side, price: i64) -> &mut Level {
        self.side_levels_mut(side)
            .get_mut(&price)
            .expect("invariant: orders_by_id and level index stay in sync")
    }

    fn side_levels(&self, side: Side) -> Option<&BTreeMap<i64, Level>> {
        match side {
            Side::Bid => Some(&self.bids),
            Side::Ask => Some(&self.offers),
            Side::None => None,
        }
    }

    fn side_levels_mut(&mut self, side: Side) -> &mut BTreeMap<i64, Level> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.offers,
            Side::None => unreachable!("side validated as Ask/Bid by Book::apply"),
        }
    }
}

fn find_order(level: &Level, order_id: u64) -> usize {
    level
        .iter()
        .position(|o| o.order_id == order_id)
        .expect("invariant: orders_by_id and level index stay in sync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContractViolation;
    use crate::test_support::{mbo, mbo_tob};

    #[test]
    fn add_bid_then_bbo() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 10_000, 5, 1, 0)).unwrap();

        let (bid, ask) = book.bbo();
        let bid = bid.unwrap();
        assert_eq!(bid.price, 10_000);
        assert_eq!(bid.size, 5);
        assert_eq!(bid.count, 1);
        assert!(ask.is_none());
    }

    #[test]
    fn cancel_to_zero_removes_level() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 10_000, 5, 1, 0)).unwrap();
        book.apply(mbo(Action::Cancel, Side::Bid, 10_000, 5, 1, 0))
            .unwrap();

        assert_eq!(book.bbo(), (None, None));
        assert!(book.get_order(1).is_none());
    }

    #[test]
    fn over_cancel_is_a_contract_violation_and_leaves_state_unchanged() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 10_000, 5, 1, 0)).unwrap();

        let err = book
            .apply(mbo(Action::Cancel, Side::Bid, 10_000, 6, 1, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            BookError::Contract(ContractViolation::OverCancel { .. })
        ));
        assert_eq!(book.get_order(1).unwrap().size, 5);
    }

    #[test]
    fn cancel_unknown_order_is_a_contract_violation() {
        let mut book = Book::new();
        let err = book
            .apply(mbo(Action::Cancel, Side::Bid, 10_000, 1, 999, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            BookError::Contract(ContractViolation::UnknownOrder { order_id: 999 })
        ));
    }

    #[test]
    fn modify_increase_size_loses_priority() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 3, 1, 0)).unwrap();
        book.apply(mbo(Action::Add, Side::Bid, 100, 4, 2, 0)).unwrap();
        book.apply(mbo(Action::Modify, Side::Bid, 100, 10, 1, 0))
            .unwrap();

        let ids: Vec<u64> = book.orders_at(100, Side::Bid).map(|o| o.order_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(book.get_queue_pos(1), Some(4));
        assert_eq!(book.get_queue_pos(2), Some(0));
    }

    #[test]
    fn modify_decrease_size_preserves_priority() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 1, 0)).unwrap();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 2, 0)).unwrap();
        book.apply(mbo(Action::Modify, Side::Bid, 100, 3, 1, 0))
            .unwrap();

        let ids: Vec<u64> = book.orders_at(100, Side::Bid).map(|o| o.order_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(book.get_queue_pos(2), Some(3));
    }

    #[test]
    fn modify_price_change_moves_to_new_level_and_drops_empty_old_level() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 1, 0)).unwrap();
        book.apply(mbo(Action::Modify, Side::Bid, 101, 5, 1, 0))
            .unwrap();

        assert!(book.get_level_by_price(100, Side::Bid).is_none());
        let level = book.get_level_by_price(101, Side::Bid).unwrap();
        assert_eq!(level.size, 5);
        assert_eq!(book.get_queue_pos(1), Some(0));
    }

    #[test]
    fn modify_changing_side_is_a_contract_violation() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 1, 0)).unwrap();
        let err = book
            .apply(mbo(Action::Modify, Side::Ask, 100, 5, 1, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            BookError::Contract(ContractViolation::SideMismatch { order_id: 1 })
        ));
    }

    #[test]
    fn modify_unknown_order_is_treated_as_add_by_default() {
        let mut book = Book::new();
        book.apply(mbo(Action::Modify, Side::Bid, 100, 5, 1, 0))
            .unwrap();
        assert_eq!(book.get_order(1).unwrap().size, 5);
    }

    #[test]
    fn strict_modify_rejects_unknown_order() {
        let mut book = Book::with_strict_modify(true);
        let err = book
            .apply(mbo(Action::Modify, Side::Bid, 100, 5, 1, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            BookError::Contract(ContractViolation::UnknownOrder { order_id: 1 })
        ));
    }

    #[test]
    fn clear_empties_book() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 1, 0)).unwrap();
        book.apply(mbo(Action::Add, Side::Ask, 101, 5, 2, 0)).unwrap();
        book.apply(mbo(Action::Clear, Side::None, 0, 0, 0, 0))
            .unwrap();

        assert_eq!(book.bbo(), (None, None));
        assert!(book.get_order(1).is_none());
        assert!(book.get_order(2).is_none());
    }

    #[test]
    fn trade_fill_none_are_no_ops() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 1, 0)).unwrap();
        book.apply(mbo(Action::Trade, Side::Bid, 100, 5, 1, 0))
            .unwrap();
        book.apply(mbo(Action::Fill, Side::Bid, 100, 5, 1, 0))
            .unwrap();
        book.apply(mbo(Action::None, Side::Bid, 100, 5, 1, 0))
            .unwrap();

        assert_eq!(book.get_order(1).unwrap().size, 5);
    }

    #[test]
    fn tob_add_replaces_side_without_entering_orders_by_id() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 1, 0)).unwrap();
        book.apply(mbo_tob(Side::Bid, 200, 9)).unwrap();

        let (bid, _) = book.bbo();
        let bid = bid.unwrap();
        assert_eq!(bid.price, 200);
        assert_eq!(bid.size, 9);
        assert_eq!(bid.count, 0);
        assert!(book.get_order(1).is_none());
    }

    #[test]
    fn tob_undef_price_clears_side() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 1, 0)).unwrap();
        book.apply(mbo_tob(Side::Bid, UNDEF_PRICE, 0)).unwrap();

        assert_eq!(book.bbo(), (None, None));
    }

    #[test]
    fn crossed_book_is_not_rejected_or_auto_matched() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 101, 5, 1, 0)).unwrap();
        book.apply(mbo(Action::Add, Side::Ask, 100, 5, 2, 0)).unwrap();

        let (bid, ask) = book.bbo();
        assert_eq!(bid.unwrap().price, 101);
        assert_eq!(ask.unwrap().price, 100);
    }

    #[test]
    fn bbo_is_idempotent_between_applies() {
        let mut book = Book::new();
        book.apply(mbo(Action::Add, Side::Bid, 100, 5, 1, 0)).unwrap();
        assert_eq!(book.bbo(), book.bbo());
    }
}
