//! Buy and sell books over the repository.
//!
//! Canonical orderings: sell book ascending `(price, _id)`, buy book descending price then
//! ascending `_id`, so equal prices fill oldest-first. Matching reads the books one page
//! at a time through [`OrderBook::page`].

use crate::error::StoreError;
use crate::store::{Filter, Repository, SortSpec, TableId};
use crate::types::{Order, Side};
use rust_decimal::Decimal;

/// Indexes created for both book tables.
pub const BOOK_INDEXES: &[&str] = &["symbol", "account", "price", "expiration", "txId"];

const BUY_PRIORITY: [SortSpec; 2] = [SortSpec::desc("price"), SortSpec::asc("_id")];
const SELL_PRIORITY: [SortSpec; 2] = [SortSpec::asc("price"), SortSpec::asc("_id")];

/// One side's book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderBook {
    side: Side,
}

impl OrderBook {
    pub fn new(side: Side) -> Self {
        Self { side }
    }

    pub fn table(&self) -> TableId {
        self.side.book()
    }

    /// Price-time priority sort for this side.
    pub fn priority(&self) -> &'static [SortSpec] {
        match self.side {
            Side::Buy => &BUY_PRIORITY,
            Side::Sell => &SELL_PRIORITY,
        }
    }

    /// Orders for `symbol` in priority order. With `crossing`, only orders an incoming
    /// order at that price can trade with: asks at or below it, bids at or above it.
    pub fn page<R: Repository>(
        &self,
        repo: &R,
        symbol: &str,
        crossing: Option<Decimal>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let mut filter = Filter::new().eq("symbol", symbol);
        if let Some(price) = crossing {
            filter = match self.side {
                Side::Sell => filter.lte("price", price),
                Side::Buy => filter.gte("price", price),
            };
        }
        repo.find(self.table(), &filter, limit, offset, self.priority())
    }

    /// Every resting order for `symbol`, in priority order.
    pub fn orders<R: Repository>(
        &self,
        repo: &R,
        symbol: &str,
        page_size: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let mut all = Vec::new();
        loop {
            let page = self.page(repo, symbol, None, page_size, all.len())?;
            let done = page.len() < page_size;
            all.extend(page);
            if done {
                return Ok(all);
            }
        }
    }

    /// Best price on this side for `symbol`, or `None` if the side is empty.
    pub fn best_price<R: Repository>(&self, repo: &R, symbol: &str) -> Result<Option<Decimal>, StoreError> {
        Ok(self
            .page(repo, symbol, None, 1, 0)?
            .into_iter()
            .next()
            .map(|o| o.price))
    }

    /// Orders of any symbol with `expiration <= now`, oldest first.
    pub fn expired<R: Repository>(&self, repo: &R, now: u64, limit: usize) -> Result<Vec<Order>, StoreError> {
        let filter = Filter::new().lte("expiration", now);
        repo.find(self.table(), &filter, limit, 0, &[SortSpec::asc("_id")])
    }

    pub fn find_by_tx_id<R: Repository>(&self, repo: &R, tx_id: &str) -> Result<Option<Order>, StoreError> {
        repo.find_one(self.table(), &Filter::new().eq("txId", tx_id))
    }

    pub fn insert<R: Repository>(&self, repo: &mut R, order: Order) -> Result<Order, StoreError> {
        repo.insert(self.table(), order)
    }

    pub fn update<R: Repository>(&self, repo: &mut R, order: &Order) -> Result<(), StoreError> {
        repo.update(self.table(), order)
    }

    pub fn remove<R: Repository>(&self, repo: &mut R, order: &Order) -> Result<(), StoreError> {
        repo.remove(self.table(), order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::str::FromStr;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.create_table(Side::Buy.book(), BOOK_INDEXES).unwrap();
        store.create_table(Side::Sell.book(), BOOK_INDEXES).unwrap();
        store
    }

    fn order(tx: &str, symbol: &str, qty: i64, price: &str) -> Order {
        Order {
            row_id: None,
            tx_id: tx.into(),
            timestamp: 0,
            account: "alice".into(),
            symbol: symbol.into(),
            quantity: Decimal::from(qty),
            price: Decimal::from_str(price).unwrap(),
            tokens_locked: None,
            expiration: 100,
        }
    }

    fn ids(orders: &[Order]) -> Vec<&str> {
        orders.iter().map(|o| o.tx_id.as_str()).collect()
    }

    #[test]
    fn sell_book_is_ascending_price_then_time() {
        let mut repo = store();
        let book = OrderBook::new(Side::Sell);
        book.insert(&mut repo, order("a", "ABC", 1, "2.0")).unwrap();
        book.insert(&mut repo, order("b", "ABC", 1, "1.5")).unwrap();
        book.insert(&mut repo, order("c", "ABC", 1, "2.0")).unwrap();
        book.insert(&mut repo, order("d", "XYZ", 1, "0.1")).unwrap();
        let page = book.page(&repo, "ABC", None, 10, 0).unwrap();
        assert_eq!(ids(&page), ["b", "a", "c"]);
        assert_eq!(book.best_price(&repo, "ABC").unwrap(), Some(Decimal::from_str("1.5").unwrap()));
    }

    #[test]
    fn buy_book_is_descending_price_then_time() {
        let mut repo = store();
        let book = OrderBook::new(Side::Buy);
        book.insert(&mut repo, order("a", "ABC", 1, "1.0")).unwrap();
        book.insert(&mut repo, order("b", "ABC", 1, "3.0")).unwrap();
        book.insert(&mut repo, order("c", "ABC", 1, "1.0")).unwrap();
        let page = book.page(&repo, "ABC", None, 10, 0).unwrap();
        assert_eq!(ids(&page), ["b", "a", "c"]);
    }

    #[test]
    fn crossing_filter_depends_on_side() {
        let mut repo = store();
        let asks = OrderBook::new(Side::Sell);
        asks.insert(&mut repo, order("a", "ABC", 1, "1.0")).unwrap();
        asks.insert(&mut repo, order("b", "ABC", 1, "2.0")).unwrap();
        asks.insert(&mut repo, order("c", "ABC", 1, "3.0")).unwrap();
        let crossing = asks.page(&repo, "ABC", Some(Decimal::from(2)), 10, 0).unwrap();
        assert_eq!(ids(&crossing), ["a", "b"]);

        let bids = OrderBook::new(Side::Buy);
        bids.insert(&mut repo, order("d", "ABC", 1, "1.0")).unwrap();
        bids.insert(&mut repo, order("e", "ABC", 1, "2.0")).unwrap();
        let crossing = bids.page(&repo, "ABC", Some(Decimal::from(2)), 10, 0).unwrap();
        assert_eq!(ids(&crossing), ["e"]);
    }

    #[test]
    fn orders_reads_across_pages_in_priority_order() {
        let mut repo = store();
        let book = OrderBook::new(Side::Sell);
        for (i, price) in ["5", "1", "4", "2", "3"].iter().enumerate() {
            book.insert(&mut repo, order(&format!("o{}", i), "ABC", 1, price)).unwrap();
        }
        let all = book.orders(&repo, "ABC", 2).unwrap();
        let prices: Vec<String> = all.iter().map(|o| o.price.to_string()).collect();
        assert_eq!(prices, ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn expired_ignores_symbol_and_finds_by_tx_id() {
        let mut repo = store();
        let book = OrderBook::new(Side::Buy);
        let mut old = order("old", "ABC", 1, "1");
        old.expiration = 10;
        book.insert(&mut repo, old).unwrap();
        let mut other = order("other", "XYZ", 1, "1");
        other.expiration = 10;
        book.insert(&mut repo, other).unwrap();
        book.insert(&mut repo, order("fresh", "ABC", 1, "1")).unwrap();
        assert_eq!(ids(&book.expired(&repo, 10, 100).unwrap()), ["old", "other"]);
        assert!(book.find_by_tx_id(&repo, "fresh").unwrap().is_some());
        assert!(book.find_by_tx_id(&repo, "missing").unwrap().is_none());
    }
}
