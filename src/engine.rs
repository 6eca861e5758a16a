//! Contract entry point.
//!
//! [`Market`] validates and dispatches one [`Transaction`] at a time against a repository
//! and a token ledger. It holds only configuration; all market state lives in the
//! repository, so any number of replicas running the same transactions agree on it.

use crate::audit::{AuditEvent, AuditSink};
use crate::config::{MarketConfig, CONTRACT_NAME, TOKENS_CONTRACT};
use crate::context::MarketContext;
use crate::decimal::{count_decimals, notional, parse_amount, to_fixed};
use crate::error::{
    MarketError, MSG_ACTIVE_KEY, MSG_CANNOT_BE_PLACED, MSG_INVALID_PARAMS, MSG_ORDER_NOT_FOUND,
};
use crate::execution::{ActionReport, TradeRecord};
use crate::ledger::{TokenLedger, EVENT_TRANSFER_TO_CONTRACT};
use crate::market_order::{market_buy, market_sell};
use crate::matching::{match_buy_order, match_sell_order};
use crate::metrics::{self, Metric, SYMBOL_INDEX};
use crate::order_book::{OrderBook, BOOK_INDEXES};
use crate::store::{tables, Filter, Repository};
use crate::types::{
    Action, CancelPayload, LimitOrderPayload, MarketOrderPayload, Order, Side, SigningTier,
    TokenInfo, Transaction,
};
use log::{info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Longest order id a cancel may reference.
const MAX_ORDER_ID_LEN: usize = 50;

/// The market contract.
///
/// Use [`Market::install`] once to create its tables, then [`Market::execute`] for every
/// transaction in ledger order. [`Market::orders`], [`Market::metric`] and
/// [`Market::trades`] read state back without changing it.
#[derive(Clone)]
pub struct Market {
    config: MarketConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Market {
    pub fn new(config: MarketConfig) -> Self {
        Self { config, audit: None }
    }

    /// Emit one audit event per executed transaction to `sink`.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Creates the market tables unless `buyBook` already exists. Returns whether it did.
    pub fn install<R: Repository>(&self, repo: &mut R) -> Result<bool, MarketError> {
        if repo.table_exists(tables::BUY_BOOK) {
            return Ok(false);
        }
        repo.create_table(tables::BUY_BOOK, BOOK_INDEXES)?;
        repo.create_table(tables::SELL_BOOK, BOOK_INDEXES)?;
        repo.create_table(tables::TRADES_HISTORY, SYMBOL_INDEX)?;
        repo.create_table(tables::METRICS, SYMBOL_INDEX)?;
        info!("market tables installed");
        Ok(true)
    }

    /// Runs one transaction to completion.
    ///
    /// `Err` means the action was rejected before any escrow and changed nothing, except
    /// for `Store` errors, which may surface mid-action.
    pub fn execute<R: Repository, L: TokenLedger>(
        &self,
        repo: &mut R,
        ledger: &mut L,
        tx: &Transaction,
    ) -> Result<ActionReport, MarketError> {
        info!(
            "action received tx_id={} sender={} action={} block_timestamp={}",
            tx.id,
            tx.sender,
            tx.payload.name(),
            tx.block_timestamp
        );
        let result = self.dispatch(repo, ledger, tx);
        match &result {
            Ok(report) => info!(
                "action applied tx_id={} trades={} payouts={} resting={} assertions={}",
                tx.id,
                report.trades.len(),
                report.payouts.len(),
                report.resting.is_some(),
                report.errors.len()
            ),
            Err(e) => warn!("action rejected tx_id={} action={} error={}", tx.id, tx.payload.name(), e),
        }
        self.audit(tx, &result);
        result
    }

    fn dispatch<R: Repository, L: TokenLedger>(
        &self,
        repo: &mut R,
        ledger: &mut L,
        tx: &Transaction,
    ) -> Result<ActionReport, MarketError> {
        if tx.signing != SigningTier::Active {
            return Err(MarketError::Unauthorized(MSG_ACTIVE_KEY.into()));
        }
        match &tx.payload {
            Action::Buy(p) => self.limit_order(repo, ledger, tx, Side::Buy, p),
            Action::Sell(p) => self.limit_order(repo, ledger, tx, Side::Sell, p),
            Action::MarketBuy(p) => self.market_order(repo, ledger, tx, Side::Buy, p),
            Action::MarketSell(p) => self.market_order(repo, ledger, tx, Side::Sell, p),
            Action::Cancel(p) => self.cancel(repo, ledger, tx, p),
        }
    }

    fn audit(&self, tx: &Transaction, result: &Result<ActionReport, MarketError>) {
        let Some(sink) = &self.audit else {
            return;
        };
        let mut resource = serde_json::json!({ "txId": tx.id });
        if let Some(symbol) = tx.payload.symbol() {
            resource["symbol"] = symbol.into();
        }
        if let Action::Cancel(p) = &tx.payload {
            resource["orderId"] = p.id.as_str().into();
        }
        let outcome = match result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        sink.emit(&AuditEvent::at(
            tx.block_timestamp,
            tx.sender.as_str(),
            tx.payload.name(),
            Some(resource),
            outcome,
        ));
    }

    /// Registered token for a tradable symbol. The settlement token itself is not tradable.
    fn tradable_token<R: Repository>(&self, repo: &R, symbol: &str) -> Result<TokenInfo, MarketError> {
        if symbol.is_empty() || symbol == self.config.peg_symbol {
            return Err(MarketError::invalid_params());
        }
        repo.find_one_in_table(tables::TOKENS, &Filter::new().eq("symbol", symbol))?
            .ok_or_else(|| MarketError::NotFound(MSG_INVALID_PARAMS.into()))
    }

    /// Moves `quantity` of `symbol` from the sender into market custody and checks the
    /// ledger reported exactly that transfer.
    fn escrow<L: TokenLedger>(
        &self,
        ledger: &mut L,
        sender: &str,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<(), MarketError> {
        let res = ledger.transfer_to_contract(sender, symbol, quantity, CONTRACT_NAME);
        if !res.is_ok() {
            return Err(MarketError::EscrowRejected(res.errors.join(", ")));
        }
        let confirmed = res.events.iter().any(|e| {
            e.contract == TOKENS_CONTRACT
                && e.event == EVENT_TRANSFER_TO_CONTRACT
                && e.from == sender
                && e.to == CONTRACT_NAME
                && e.symbol == symbol
                && e.quantity == quantity
        });
        if !confirmed {
            return Err(MarketError::EscrowRejected(format!(
                "no {} event for {} {}",
                EVENT_TRANSFER_TO_CONTRACT, quantity, symbol
            )));
        }
        Ok(())
    }

    fn limit_order<R: Repository, L: TokenLedger>(
        &self,
        repo: &mut R,
        ledger: &mut L,
        tx: &Transaction,
        side: Side,
        p: &LimitOrderPayload,
    ) -> Result<ActionReport, MarketError> {
        let peg_dp = self.config.peg_precision;
        let price = parse_amount(&p.price).ok_or_else(MarketError::invalid_params)?;
        let quantity = parse_amount(&p.quantity).ok_or_else(MarketError::invalid_params)?;
        if p.expiration == Some(0) {
            return Err(MarketError::invalid_params());
        }
        let token = self.tradable_token(repo, &p.symbol)?;
        if price <= Decimal::ZERO
            || count_decimals(price) > peg_dp
            || count_decimals(quantity) > token.precision
        {
            return Err(MarketError::invalid_params());
        }

        let lock = notional(price, quantity)
            .map(|v| to_fixed(v, peg_dp))
            .ok_or_else(MarketError::invalid_params)?;
        if lock < self.config.dust_threshold() {
            return Err(MarketError::Unfillable(MSG_CANNOT_BE_PLACED.into()));
        }

        let quantity = to_fixed(quantity, token.precision);
        match side {
            Side::Buy => self.escrow(ledger, &tx.sender, &self.config.peg_symbol, lock)?,
            Side::Sell => self.escrow(ledger, &tx.sender, &p.symbol, quantity)?,
        }

        let order = Order {
            row_id: None,
            tx_id: tx.id.clone(),
            timestamp: tx.block_timestamp,
            account: tx.sender.clone(),
            symbol: p.symbol.clone(),
            quantity,
            price: to_fixed(price, peg_dp),
            tokens_locked: (side == Side::Buy).then_some(lock),
            expiration: self.config.expiration_from(tx.block_timestamp, p.expiration),
        };
        info!(
            "limit {} placed tx_id={} account={} symbol={} quantity={} price={} expiration={}",
            side.as_str(),
            order.tx_id,
            order.account,
            order.symbol,
            order.quantity,
            order.price,
            order.expiration
        );
        let order = OrderBook::new(side).insert(repo, order)?;

        let mut ctx = MarketContext::new(repo, ledger, &self.config, tx);
        match side {
            Side::Buy => match_buy_order(&mut ctx, order, token.precision)?,
            Side::Sell => match_sell_order(&mut ctx, order, token.precision)?,
        }
        Ok(ctx.report)
    }

    fn market_order<R: Repository, L: TokenLedger>(
        &self,
        repo: &mut R,
        ledger: &mut L,
        tx: &Transaction,
        side: Side,
        p: &MarketOrderPayload,
    ) -> Result<ActionReport, MarketError> {
        let quantity = parse_amount(&p.quantity)
            .filter(|q| *q > Decimal::ZERO)
            .ok_or_else(MarketError::invalid_params)?;
        let token = self.tradable_token(repo, &p.symbol)?;
        let (escrow_symbol, max_dp) = match side {
            Side::Buy => (self.config.peg_symbol.as_str(), self.config.peg_precision),
            Side::Sell => (p.symbol.as_str(), token.precision),
        };
        if count_decimals(quantity) > max_dp {
            return Err(MarketError::invalid_params());
        }
        let quantity = to_fixed(quantity, max_dp);
        self.escrow(ledger, &tx.sender, escrow_symbol, quantity)?;
        info!(
            "market {} placed tx_id={} account={} symbol={} quantity={}",
            side.as_str(),
            tx.id,
            tx.sender,
            p.symbol,
            quantity
        );

        let mut ctx = MarketContext::new(repo, ledger, &self.config, tx);
        match side {
            Side::Buy => market_buy(&mut ctx, &p.symbol, quantity, token.precision)?,
            Side::Sell => market_sell(&mut ctx, &p.symbol, quantity, token.precision)?,
        }
        Ok(ctx.report)
    }

    fn cancel<R: Repository, L: TokenLedger>(
        &self,
        repo: &mut R,
        ledger: &mut L,
        tx: &Transaction,
        p: &CancelPayload,
    ) -> Result<ActionReport, MarketError> {
        if p.id.is_empty() {
            return Err(MarketError::invalid_params());
        }
        if p.id.len() >= MAX_ORDER_ID_LEN {
            return Err(MarketError::NotFound(MSG_ORDER_NOT_FOUND.into()));
        }
        let book = OrderBook::new(p.side);
        let order = book
            .find_by_tx_id(repo, &p.id)?
            .ok_or_else(|| MarketError::NotFound(MSG_ORDER_NOT_FOUND.into()))?;
        if order.account != tx.sender {
            return Err(MarketError::Unauthorized(MSG_ORDER_NOT_FOUND.into()));
        }

        let mut ctx = MarketContext::new(repo, ledger, &self.config, tx);
        let (symbol, quantity) = order.escrow(p.side, ctx.peg());
        if quantity > Decimal::ZERO {
            ctx.pay(&order.account, &symbol, quantity);
        }
        book.remove(ctx.repo, &order)?;
        metrics::update_best(ctx.repo, p.side, &order.symbol)?;
        info!(
            "order canceled tx_id={} order={} side={} refund={} {}",
            tx.id,
            order.tx_id,
            p.side.as_str(),
            quantity,
            symbol
        );
        Ok(ctx.report)
    }

    /// Resting orders of one side for `symbol`, in matching priority.
    pub fn orders<R: Repository>(&self, repo: &R, side: Side, symbol: &str) -> Result<Vec<Order>, MarketError> {
        Ok(OrderBook::new(side).orders(repo, symbol, self.config.page_size)?)
    }

    /// Metric row for `symbol`, if any action has touched it yet.
    pub fn metric<R: Repository>(&self, repo: &R, symbol: &str) -> Result<Option<Metric>, MarketError> {
        Ok(repo.find_one(tables::METRICS, &Filter::new().eq("symbol", symbol))?)
    }

    /// Trade history of `symbol` still inside the rolling window, oldest first.
    pub fn trades<R: Repository>(&self, repo: &R, symbol: &str) -> Result<Vec<TradeRecord>, MarketError> {
        Ok(metrics::trades(repo, symbol)?)
    }
}
