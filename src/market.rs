use std::collections::HashMap;

use crate::book::Book;
use crate::error::BookError;
use crate::mbo::MboRecord;
use crate::price_level::PriceLevel;

/// Routes MBO records to the right per-(instrument, publisher) [`Book`] and
/// aggregates across publishers (spec §4.2).
///
/// A `Vec` rather than a nested map for the per-instrument publisher list:
/// the number of publishers quoting a given instrument is small (low single
/// digits in practice), so a linear scan is both simpler and faster than a
/// second hash map.
#[derive(Debug, Default)]
pub struct Market {
    books: HashMap<u32, Vec<(u16, Book)>>,
}

impl Market {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instrument_count(&self) -> usize {
        self.books.len()
    }

    pub fn instrument_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.books.keys().copied()
    }

    pub fn books_by_pub(&self, instrument_id: u32) -> Option<&[(u16, Book)]> {
        self.books
            .get(&instrument_id)
            .map(|pub_books| pub_books.as_slice())
    }

    pub fn book(&self, instrument_id: u32, publisher_id: u16) -> Option<&Book> {
        let books = self.books.get(&instrument_id)?;
        books
            .iter()
            .find(|(book_pub, _)| *book_pub == publisher_id)
            .map(|(_, book)| book)
    }

    pub fn bbo(
        &self,
        instrument_id: u32,
        publisher_id: u16,
    ) -> (Option<PriceLevel>, Option<PriceLevel>) {
        self.book(instrument_id, publisher_id)
            .map(|book| book.bbo())
            .unwrap_or_default()
    }

    /// Best bid / best ask across every publisher quoting this instrument.
    /// On a price tie between two publishers, sizes and counts are summed
    /// (spec §4.2).
    #[tracing::instrument(skip(self))]
    pub fn aggregated_bbo(&self, instrument_id: u32) -> (Option<PriceLevel>, Option<PriceLevel>) {
        let mut agg_bid: Option<PriceLevel> = None;
        let mut agg_ask: Option<PriceLevel> = None;
        let Some(books_by_pub) = self.books_by_pub(instrument_id) else {
            return (None, None);
        };
        for (_, book) in books_by_pub.iter() {
            let (bid, ask) = book.bbo();
            if let Some(bid) = bid {
                match &mut agg_bid {
                    None => agg_bid = Some(bid),
                    Some(ab) if bid.price > ab.price => agg_bid = Some(bid),
                    Some(ab) if bid.price == ab.price => {
                        ab.size += bid.size;
                        ab.count += bid.count;
                    }
                    Some(_) => {}
                }
            }
            if let Some(ask) = ask {
                match &mut agg_ask {
                    None => agg_ask = Some(ask),
                    Some(aa) if ask.price < aa.price => agg_ask = Some(ask),
                    Some(aa) if ask.price == aa.price => {
                        aa.size += ask.size;
                        aa.count += ask.count;
                    }
                    Some(_) => {}
                }
            }
        }
        (agg_bid, agg_ask)
    }

    #[tracing::instrument(
        skip(self, mbo),
        fields(instrument_id = mbo.instrument_id, publisher_id = mbo.publisher_id, order_id = mbo.order_id)
    )]
    pub fn apply(&mut self, mbo: MboRecord) -> Result<(), BookError> {
        let books = self.books.entry(mbo.instrument_id).or_default();
        let book = match books
            .iter_mut()
            .find(|(book_pub, _)| *book_pub == mbo.publisher_id)
        {
            Some((_, book)) => book,
            None => {
                books.push((mbo.publisher_id, Book::new()));
                &mut books
                    .last_mut()
                    .expect("just pushed")
                    .1
            }
        };
        book.apply(mbo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbo::{Action, Side};
    use crate::test_support::mbo;

    fn rec(instrument_id: u32, publisher_id: u16, side: Side, price: i64, size: u32, order_id: u64) -> MboRecord {
        let mut r = mbo(Action::Add, side, price, size, order_id, 0);
        r.instrument_id = instrument_id;
        r.publisher_id = publisher_id;
        r
    }

    #[test]
    fn routes_by_instrument_and_publisher() {
        let mut market = Market::new();
        market.apply(rec(1, 10, Side::Bid, 100, 5, 1)).unwrap();
        market.apply(rec(1, 20, Side::Bid, 200, 5, 2)).unwrap();
        market.apply(rec(2, 10, Side::Bid, 999, 5, 3)).unwrap();

        assert_eq!(market.bbo(1, 10).0.unwrap().price, 100);
        assert_eq!(market.bbo(1, 20).0.unwrap().price, 200);
        assert_eq!(market.bbo(2, 10).0.unwrap().price, 999);
        assert_eq!(market.instrument_count(), 2);
    }

    #[test]
    fn aggregated_bbo_sums_ties_and_picks_best_across_publishers() {
        let mut market = Market::new();
        market.apply(rec(1, 10, Side::Bid, 100, 5, 1)).unwrap();
        market.apply(rec(1, 20, Side::Bid, 101, 3, 2)).unwrap();
        market.apply(rec(1, 30, Side::Bid, 101, 2, 3)).unwrap();
        market.apply(rec(1, 10, Side::Ask, 110, 4, 4)).unwrap();
        market.apply(rec(1, 20, Side::Ask, 105, 6, 5)).unwrap();

        let (bid, ask) = market.aggregated_bbo(1);
        let bid = bid.unwrap();
        assert_eq!(bid.price, 101);
        assert_eq!(bid.size, 5);
        assert_eq!(bid.count, 2);

        let ask = ask.unwrap();
        assert_eq!(ask.price, 105);
        assert_eq!(ask.size, 6);
    }

    #[test]
    fn unknown_instrument_has_no_aggregated_bbo() {
        let market = Market::new();
        assert_eq!(market.aggregated_bbo(999), (None, None));
    }

    #[test]
    fn contract_violation_on_one_book_does_not_affect_others() {
        let mut market = Market::new();
        market.apply(rec(1, 10, Side::Bid, 100, 5, 1)).unwrap();

        let err = market.apply(rec(1, 10, Side::Bid, 100, 5, 1));
        assert!(err.is_err());

        assert_eq!(market.bbo(1, 10).0.unwrap().size, 5);
    }
}
