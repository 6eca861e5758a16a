//! Per-transaction execution context.
//!
//! Bundles the repository and ledger handles with what the running transaction knows
//! about itself (sender, id, block time). Passed explicitly to every operation; the
//! market keeps no state of its own between transactions.

use crate::config::{MarketConfig, CONTRACT_NAME};
use crate::execution::{ActionReport, Payout};
use crate::ledger::{TokenLedger, TransferKind};
use crate::store::Repository;
use crate::types::Transaction;
use log::warn;
use rust_decimal::Decimal;

pub struct MarketContext<'a, R: Repository, L: TokenLedger> {
    pub repo: &'a mut R,
    pub ledger: &'a mut L,
    pub config: &'a MarketConfig,
    pub sender: &'a str,
    pub tx_id: &'a str,
    /// Block time in seconds. The only clock the market reads.
    pub now: u64,
    pub report: ActionReport,
}

impl<'a, R: Repository, L: TokenLedger> MarketContext<'a, R, L> {
    pub fn new(repo: &'a mut R, ledger: &'a mut L, config: &'a MarketConfig, tx: &'a Transaction) -> Self {
        Self {
            repo,
            ledger,
            config,
            sender: &tx.sender,
            tx_id: &tx.id,
            now: tx.block_timestamp,
            report: ActionReport::default(),
        }
    }

    pub fn peg(&self) -> &'a str {
        &self.config.peg_symbol
    }

    pub fn peg_dp(&self) -> u32 {
        self.config.peg_precision
    }

    pub fn dust(&self) -> Decimal {
        self.config.dust_threshold()
    }

    /// Pays out of market custody. A refused payout is logged and recorded but not
    /// compensated; effects already applied by this action stay applied.
    pub fn pay(&mut self, to: &str, symbol: &str, quantity: Decimal) {
        let res = self
            .ledger
            .transfer_tokens(CONTRACT_NAME, to, symbol, quantity, TransferKind::User);
        if !res.is_ok() {
            warn!(
                "payout failed tx_id={} to={} symbol={} quantity={} errors={:?}",
                self.tx_id, to, symbol, quantity, res.errors
            );
        }
        self.report.payouts.push(Payout {
            to: to.to_string(),
            symbol: symbol.to_string(),
            quantity,
            settled: res.is_ok(),
        });
    }

    /// Records a non-fatal assertion failure and lets the action continue.
    pub fn assert_failed(&mut self, message: &str) {
        warn!("assertion failed tx_id={} message={}", self.tx_id, message);
        self.report.errors.push(message.to_string());
    }
}
