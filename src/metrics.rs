//! Trade history and per-symbol metrics.
//!
//! Metrics are a cache over the books and the trade history. `highestBid` and `lowestAsk`
//! are always re-read from the top of the book; volume and price change roll over a
//! window anchored to the block time of the transaction that touches them.

use crate::config::MarketConfig;
use crate::context::MarketContext;
use crate::decimal::to_fixed;
use crate::error::StoreError;
use crate::execution::TradeRecord;
use crate::ledger::TokenLedger;
use crate::order_book::OrderBook;
use crate::store::{tables, FieldValue, Filter, Record, Repository, RowId, SortSpec, DEFAULT_LIMIT};
use crate::types::Side;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Indexes created for `tradesHistory` and `metrics`.
pub const SYMBOL_INDEX: &[&str] = &["symbol"];

/// Cached market statistics for one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<RowId>,
    pub symbol: String,
    /// Settlement volume traded inside the current window.
    pub volume: Decimal,
    pub volume_expiration: u64,
    pub last_price: Decimal,
    /// `0` when the sell book is empty.
    pub lowest_ask: Decimal,
    /// `0` when the buy book is empty.
    pub highest_bid: Decimal,
    pub last_day_price: Decimal,
    pub last_day_price_expiration: u64,
    pub price_change_steem: Decimal,
    pub price_change_percent: String,
}

impl Metric {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            row_id: None,
            symbol: symbol.into(),
            volume: Decimal::ZERO,
            volume_expiration: 0,
            last_price: Decimal::ZERO,
            lowest_ask: Decimal::ZERO,
            highest_bid: Decimal::ZERO,
            last_day_price: Decimal::ZERO,
            last_day_price_expiration: 0,
            price_change_steem: Decimal::ZERO,
            price_change_percent: "0".into(),
        }
    }
}

impl Record for Metric {
    fn row_id(&self) -> Option<RowId> {
        self.row_id
    }

    fn set_row_id(&mut self, id: RowId) {
        self.row_id = Some(id);
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "symbol" => Some(self.symbol.as_str().into()),
            _ => None,
        }
    }
}

/// Metric row for `symbol`, inserted with zeros on first use.
pub fn get_metric<R: Repository>(repo: &mut R, symbol: &str) -> Result<Metric, StoreError> {
    let filter = Filter::new().eq("symbol", symbol);
    match repo.find_one::<Metric>(tables::METRICS, &filter)? {
        Some(metric) => Ok(metric),
        None => repo.insert(tables::METRICS, Metric::new(symbol)),
    }
}

/// Adds traded volume (resetting an expired window first) or subtracts purged volume.
/// Never goes below zero.
pub fn update_volume<R: Repository>(
    repo: &mut R,
    config: &MarketConfig,
    now: u64,
    symbol: &str,
    amount: Decimal,
    add: bool,
) -> Result<(), StoreError> {
    let mut metric = get_metric(repo, symbol)?;
    if add {
        if metric.volume_expiration < now {
            metric.volume = Decimal::ZERO;
        }
        metric.volume = to_fixed(metric.volume + amount, config.peg_precision);
        metric.volume_expiration = now + config.window_secs;
    } else {
        metric.volume = to_fixed(metric.volume - amount, config.peg_precision);
    }
    if metric.volume.is_sign_negative() {
        metric.volume = Decimal::ZERO;
    }
    debug!("volume symbol={} volume={} add={}", symbol, metric.volume, add);
    repo.update(tables::METRICS, &metric)
}

/// Records `price` as the last trade price and recomputes the change against the price
/// of roughly one window ago.
pub fn update_price<R: Repository>(
    repo: &mut R,
    config: &MarketConfig,
    now: u64,
    symbol: &str,
    price: Decimal,
) -> Result<(), StoreError> {
    let mut metric = get_metric(repo, symbol)?;
    metric.last_price = price;
    if metric.last_day_price_expiration < now {
        metric.last_day_price = price;
        metric.last_day_price_expiration = now + config.window_secs;
        metric.price_change_steem = Decimal::ZERO;
        metric.price_change_percent = "0%".into();
    } else {
        let change = to_fixed(price - metric.last_day_price, config.peg_precision);
        let percent = change
            .checked_div(metric.last_day_price)
            .map(|r| to_fixed(r * Decimal::ONE_HUNDRED, 2))
            .unwrap_or(Decimal::ZERO);
        metric.price_change_steem = change;
        metric.price_change_percent = format!("{}%", percent);
    }
    repo.update(tables::METRICS, &metric)
}

/// Re-reads the best bid for `symbol`.
pub fn update_bid<R: Repository>(repo: &mut R, symbol: &str) -> Result<(), StoreError> {
    let mut metric = get_metric(repo, symbol)?;
    metric.highest_bid = OrderBook::new(Side::Buy)
        .best_price(repo, symbol)?
        .unwrap_or(Decimal::ZERO);
    debug!("bid symbol={} highest_bid={}", symbol, metric.highest_bid);
    repo.update(tables::METRICS, &metric)
}

/// Re-reads the best ask for `symbol`.
pub fn update_ask<R: Repository>(repo: &mut R, symbol: &str) -> Result<(), StoreError> {
    let mut metric = get_metric(repo, symbol)?;
    metric.lowest_ask = OrderBook::new(Side::Sell)
        .best_price(repo, symbol)?
        .unwrap_or(Decimal::ZERO);
    debug!("ask symbol={} lowest_ask={}", symbol, metric.lowest_ask);
    repo.update(tables::METRICS, &metric)
}

/// Re-reads the best price of one side.
pub fn update_best<R: Repository>(repo: &mut R, side: Side, symbol: &str) -> Result<(), StoreError> {
    match side {
        Side::Buy => update_bid(repo, symbol),
        Side::Sell => update_ask(repo, symbol),
    }
}

/// Appends a fill to the trade history after purging that symbol's rows older than the
/// window (their volume leaves the metric with them), then updates the price metrics.
pub fn record_trade<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    trade: TradeRecord,
) -> Result<(), StoreError> {
    let cutoff = ctx.now.saturating_sub(ctx.config.window_secs);
    let stale = Filter::new()
        .eq("symbol", trade.symbol.as_str())
        .lt("timestamp", cutoff);
    loop {
        let expired: Vec<TradeRecord> =
            ctx.repo
                .find(tables::TRADES_HISTORY, &stale, DEFAULT_LIMIT, 0, &[])?;
        if expired.is_empty() {
            break;
        }
        debug!("purging {} trades symbol={}", expired.len(), trade.symbol);
        for old in &expired {
            update_volume(ctx.repo, ctx.config, ctx.now, &old.symbol, old.volume, false)?;
            ctx.repo.remove(tables::TRADES_HISTORY, old)?;
        }
    }

    let trade = ctx.repo.insert(tables::TRADES_HISTORY, trade)?;
    update_price(ctx.repo, ctx.config, ctx.now, &trade.symbol, trade.price)?;
    ctx.report.trades.push(trade);
    Ok(())
}

/// Trades of `symbol` still in the history, oldest first.
pub fn trades<R: Repository>(repo: &R, symbol: &str) -> Result<Vec<TradeRecord>, StoreError> {
    let filter = Filter::new().eq("symbol", symbol);
    let mut all = Vec::new();
    loop {
        let page: Vec<TradeRecord> = repo.find(
            tables::TRADES_HISTORY,
            &filter,
            DEFAULT_LIMIT,
            all.len(),
            &[SortSpec::asc("_id")],
        )?;
        let done = page.len() < DEFAULT_LIMIT;
        all.extend(page);
        if done {
            return Ok(all);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::order_book::BOOK_INDEXES;
    use crate::store::MemoryStore;
    use crate::types::{Action, CancelPayload, Order, SigningTier, Transaction};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.create_table(tables::BUY_BOOK, BOOK_INDEXES).unwrap();
        store.create_table(tables::SELL_BOOK, BOOK_INDEXES).unwrap();
        store.create_table(tables::TRADES_HISTORY, SYMBOL_INDEX).unwrap();
        store.create_table(tables::METRICS, SYMBOL_INDEX).unwrap();
        store
    }

    fn tx(now: u64) -> Transaction {
        Transaction {
            id: "tx".into(),
            sender: "alice".into(),
            block_timestamp: now,
            signing: SigningTier::Active,
            payload: Action::Cancel(CancelPayload {
                side: Side::Buy,
                id: "x".into(),
            }),
        }
    }

    fn trade(price: &str, volume: &str, timestamp: u64) -> TradeRecord {
        TradeRecord {
            row_id: None,
            side: Side::Buy,
            buyer: "alice".into(),
            seller: "bob".into(),
            symbol: "ABC".into(),
            quantity: Decimal::ONE,
            price: d(price),
            volume: d(volume),
            timestamp,
        }
    }

    fn metric(repo: &mut MemoryStore) -> Metric {
        get_metric(repo, "ABC").unwrap()
    }

    #[test]
    fn get_metric_inserts_zeroed_row_once() {
        let mut repo = store();
        let first = metric(&mut repo);
        let second = metric(&mut repo);
        assert_eq!(first.row_id, second.row_id);
        assert_eq!(first.highest_bid, Decimal::ZERO);
        assert_eq!(repo.len(tables::METRICS), 1);
    }

    #[test]
    fn volume_resets_after_window_and_clamps_at_zero() {
        let mut repo = store();
        let config = MarketConfig::default();
        update_volume(&mut repo, &config, 1_000, "ABC", d("5"), true).unwrap();
        update_volume(&mut repo, &config, 2_000, "ABC", d("1"), true).unwrap();
        assert_eq!(metric(&mut repo).volume, d("6"));
        assert_eq!(metric(&mut repo).volume_expiration, 2_000 + 86_400);

        update_volume(&mut repo, &config, 100_000, "ABC", d("2"), true).unwrap();
        assert_eq!(metric(&mut repo).volume, d("2"));

        update_volume(&mut repo, &config, 100_001, "ABC", d("3"), false).unwrap();
        assert_eq!(metric(&mut repo).volume, Decimal::ZERO);
    }

    #[test]
    fn price_change_is_relative_to_window_start() {
        let mut repo = store();
        let config = MarketConfig::default();
        update_price(&mut repo, &config, 1_000, "ABC", d("2")).unwrap();
        let m = metric(&mut repo);
        assert_eq!(m.last_day_price, d("2"));
        assert_eq!(m.price_change_percent, "0%");

        update_price(&mut repo, &config, 2_000, "ABC", d("2.5")).unwrap();
        let m = metric(&mut repo);
        assert_eq!(m.last_price, d("2.5"));
        assert_eq!(m.price_change_steem, d("0.5"));
        assert_eq!(m.price_change_percent, "25.00%");

        update_price(&mut repo, &config, 1_000 + 86_401, "ABC", d("3")).unwrap();
        let m = metric(&mut repo);
        assert_eq!(m.last_day_price, d("3"));
        assert_eq!(m.price_change_steem, Decimal::ZERO);
    }

    #[test]
    fn bid_and_ask_follow_top_of_book_and_are_idempotent() {
        let mut repo = store();
        let order = |price: &str| Order {
            row_id: None,
            tx_id: format!("tx-{}", price),
            timestamp: 0,
            account: "alice".into(),
            symbol: "ABC".into(),
            quantity: Decimal::ONE,
            price: d(price),
            tokens_locked: Some(d(price)),
            expiration: 10,
        };
        let bids = OrderBook::new(Side::Buy);
        bids.insert(&mut repo, order("1.5")).unwrap();
        let best = bids.insert(&mut repo, order("1.75")).unwrap();

        update_bid(&mut repo, "ABC").unwrap();
        let once = metric(&mut repo);
        update_bid(&mut repo, "ABC").unwrap();
        assert_eq!(metric(&mut repo), once);
        assert_eq!(once.highest_bid, d("1.75"));

        bids.remove(&mut repo, &best).unwrap();
        update_best(&mut repo, Side::Buy, "ABC").unwrap();
        assert_eq!(metric(&mut repo).highest_bid, d("1.5"));

        update_ask(&mut repo, "ABC").unwrap();
        assert_eq!(metric(&mut repo).lowest_ask, Decimal::ZERO);
    }

    #[test]
    fn record_trade_purges_stale_history_and_its_volume() {
        let mut repo = store();
        let mut ledger = MemoryLedger::new();
        let config = MarketConfig::default();
        let now = 200_000;
        update_volume(&mut repo, &config, now, "ABC", d("7"), true).unwrap();
        repo.insert(tables::TRADES_HISTORY, trade("1", "3", now - 86_401))
            .unwrap();
        repo.insert(tables::TRADES_HISTORY, trade("1", "4", now - 10))
            .unwrap();

        let tx = tx(now);
        let mut ctx = MarketContext::new(&mut repo, &mut ledger, &config, &tx);
        record_trade(&mut ctx, trade("2", "2", now)).unwrap();
        assert_eq!(ctx.report.trades.len(), 1);
        drop(ctx);

        let history = trades(&repo, "ABC").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|t| t.timestamp >= now - 86_400));
        let m = metric(&mut repo);
        assert_eq!(m.volume, d("4"));
        assert_eq!(m.last_price, d("2"));
    }
}
