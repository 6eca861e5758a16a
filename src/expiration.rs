//! Expiration sweeper.
//!
//! Runs before every matching pass against a book. Drains every order of that book, of
//! any symbol, whose `expiration <= now`: refunds its escrow, deletes it and re-reads
//! the best price of that side for its symbol.

use crate::context::MarketContext;
use crate::error::StoreError;
use crate::ledger::TokenLedger;
use crate::metrics;
use crate::order_book::OrderBook;
use crate::store::Repository;
use crate::types::Side;
use log::debug;
use rust_decimal::Decimal;

/// Removes every expired order from `side`'s book. Returns how many were removed.
pub fn sweep_expired<R: Repository, L: TokenLedger>(
    ctx: &mut MarketContext<'_, R, L>,
    side: Side,
) -> Result<usize, StoreError> {
    let book = OrderBook::new(side);
    let peg = ctx.peg();
    let mut swept = 0;
    loop {
        let expired = book.expired(ctx.repo, ctx.now, ctx.config.page_size)?;
        if expired.is_empty() {
            break;
        }
        for order in expired {
            let (symbol, quantity) = order.escrow(side, peg);
            if quantity > Decimal::ZERO {
                ctx.pay(&order.account, &symbol, quantity);
            }
            book.remove(ctx.repo, &order)?;
            metrics::update_best(ctx.repo, side, &order.symbol)?;
            debug!(
                "expired {} order tx_id={} account={} symbol={} refund={} {}",
                side.as_str(),
                order.tx_id,
                order.account,
                order.symbol,
                quantity,
                symbol
            );
            swept += 1;
        }
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MarketConfig, CONTRACT_NAME};
    use crate::ledger::MemoryLedger;
    use crate::metrics::{get_metric, SYMBOL_INDEX};
    use crate::order_book::BOOK_INDEXES;
    use crate::store::{tables, MemoryStore};
    use crate::types::{Action, CancelPayload, Order, SigningTier, Transaction};

    fn init_log() {
        let _ = env_logger::try_init();
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.create_table(tables::BUY_BOOK, BOOK_INDEXES).unwrap();
        store.create_table(tables::SELL_BOOK, BOOK_INDEXES).unwrap();
        store.create_table(tables::TRADES_HISTORY, SYMBOL_INDEX).unwrap();
        store.create_table(tables::METRICS, SYMBOL_INDEX).unwrap();
        store
    }

    fn buy(tx: &str, symbol: &str, price: i64, expiration: u64) -> Order {
        Order {
            row_id: None,
            tx_id: tx.into(),
            timestamp: 0,
            account: "alice".into(),
            symbol: symbol.into(),
            quantity: Decimal::from(2),
            price: Decimal::from(price),
            tokens_locked: Some(Decimal::from(2 * price)),
            expiration,
        }
    }

    fn tx(now: u64) -> Transaction {
        Transaction {
            id: "sweep".into(),
            sender: "carol".into(),
            block_timestamp: now,
            signing: SigningTier::Active,
            payload: Action::Cancel(CancelPayload {
                side: Side::Buy,
                id: "x".into(),
            }),
        }
    }

    #[test]
    fn sweeps_all_symbols_refunds_and_updates_bid() {
        init_log();
        let mut repo = store();
        let mut ledger = MemoryLedger::new();
        ledger.credit("alice", "STEEMP", Decimal::from(100));
        let res = ledger.transfer_to_contract("alice", "STEEMP", Decimal::from(12), CONTRACT_NAME);
        assert!(res.is_ok());

        let book = OrderBook::new(Side::Buy);
        book.insert(&mut repo, buy("a", "ABC", 3, 50)).unwrap();
        book.insert(&mut repo, buy("b", "XYZ", 1, 100)).unwrap();
        book.insert(&mut repo, buy("c", "ABC", 2, 500)).unwrap();

        let config = MarketConfig::default();
        let tx = tx(100);
        let mut ctx = MarketContext::new(&mut repo, &mut ledger, &config, &tx);
        assert_eq!(sweep_expired(&mut ctx, Side::Buy).unwrap(), 2);
        assert_eq!(ctx.report.payouts.len(), 2);
        assert_eq!(sweep_expired(&mut ctx, Side::Buy).unwrap(), 0);
        drop(ctx);

        assert_eq!(ledger.balance("alice", "STEEMP"), Decimal::from(96));
        assert_eq!(ledger.contract_balance(CONTRACT_NAME, "STEEMP"), Decimal::from(4));
        let remaining = book.orders(&repo, "ABC", 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].tx_id, "c");
        assert_eq!(get_metric(&mut repo, "ABC").unwrap().highest_bid, Decimal::from(2));
        assert_eq!(get_metric(&mut repo, "XYZ").unwrap().highest_bid, Decimal::ZERO);
    }

    #[test]
    fn swept_sell_order_returns_its_quantity() {
        let mut repo = store();
        let mut ledger = MemoryLedger::new();
        ledger.credit("bob", "ABC", Decimal::from(5));
        assert!(ledger
            .transfer_to_contract("bob", "ABC", Decimal::from(5), CONTRACT_NAME)
            .is_ok());
        let mut order = buy("s", "ABC", 1, 10);
        order.account = "bob".into();
        order.quantity = Decimal::from(5);
        order.tokens_locked = None;
        OrderBook::new(Side::Sell).insert(&mut repo, order).unwrap();

        let config = MarketConfig::default();
        let tx = tx(10);
        let mut ctx = MarketContext::new(&mut repo, &mut ledger, &config, &tx);
        assert_eq!(sweep_expired(&mut ctx, Side::Sell).unwrap(), 1);
        drop(ctx);
        assert_eq!(ledger.balance("bob", "ABC"), Decimal::from(5));
        assert!(repo.is_empty(tables::SELL_BOOK));
    }
}
