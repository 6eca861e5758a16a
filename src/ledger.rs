//! Token ledger the market settles through.
//!
//! The market never holds balances itself: escrow moves caller funds into the market
//! contract's custody with [`TokenLedger::transfer_to_contract`], and every fill, refund
//! and unlock pays out of that custody with [`TokenLedger::transfer_tokens`].
//! [`MemoryLedger`] is the in-process ledger used by the replay binary and the tests.

use crate::config::TOKENS_CONTRACT;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event name emitted when funds enter a contract's custody.
pub const EVENT_TRANSFER_TO_CONTRACT: &str = "transferToContract";
/// Event name emitted when a contract pays out of its custody.
pub const EVENT_TRANSFER_FROM_CONTRACT: &str = "transferFromContract";

/// Recipient kind of a payout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    User,
    Contract,
}

/// Event emitted by the ledger for a completed transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub contract: String,
    pub event: String,
    pub from: String,
    pub to: String,
    pub symbol: String,
    pub quantity: Decimal,
}

/// Outcome of a ledger call: errors if it was refused, events if it went through.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransferResult {
    pub errors: Vec<String>,
    pub events: Vec<LedgerEvent>,
}

impl TransferResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn refused(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            events: Vec::new(),
        }
    }
}

/// Settlement collaborator.
pub trait TokenLedger {
    /// Pays `quantity` of `symbol` out of `contract`'s custody to `to`.
    fn transfer_tokens(
        &mut self,
        contract: &str,
        to: &str,
        symbol: &str,
        quantity: Decimal,
        kind: TransferKind,
    ) -> TransferResult;

    /// Moves `quantity` of `symbol` from `from` into `to_contract`'s custody.
    fn transfer_to_contract(
        &mut self,
        from: &str,
        symbol: &str,
        quantity: Decimal,
        to_contract: &str,
    ) -> TransferResult;
}

type Balances = BTreeMap<String, BTreeMap<String, Decimal>>;

/// In-memory ledger: account balances and contract custody balances.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryLedger {
    accounts: Balances,
    contracts: Balances,
}

fn get(balances: &Balances, owner: &str, symbol: &str) -> Decimal {
    balances
        .get(owner)
        .and_then(|by_symbol| by_symbol.get(symbol))
        .copied()
        .unwrap_or(Decimal::ZERO)
}

fn add(balances: &mut Balances, owner: &str, symbol: &str, delta: Decimal) {
    let slot = balances
        .entry(owner.to_string())
        .or_default()
        .entry(symbol.to_string())
        .or_insert(Decimal::ZERO);
    *slot += delta;
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues `quantity` of `symbol` to `account` (genesis and tests).
    pub fn credit(&mut self, account: &str, symbol: &str, quantity: Decimal) {
        add(&mut self.accounts, account, symbol, quantity);
    }

    pub fn balance(&self, account: &str, symbol: &str) -> Decimal {
        get(&self.accounts, account, symbol)
    }

    pub fn contract_balance(&self, contract: &str, symbol: &str) -> Decimal {
        get(&self.contracts, contract, symbol)
    }

    /// Sum of every account and contract balance of `symbol`.
    pub fn supply(&self, symbol: &str) -> Decimal {
        self.accounts
            .values()
            .chain(self.contracts.values())
            .filter_map(|by_symbol| by_symbol.get(symbol))
            .copied()
            .sum()
    }
}

impl TokenLedger for MemoryLedger {
    fn transfer_tokens(
        &mut self,
        contract: &str,
        to: &str,
        symbol: &str,
        quantity: Decimal,
        kind: TransferKind,
    ) -> TransferResult {
        if quantity <= Decimal::ZERO {
            return TransferResult::refused("invalid quantity");
        }
        if get(&self.contracts, contract, symbol) < quantity {
            return TransferResult::refused("overdrawn balance");
        }
        add(&mut self.contracts, contract, symbol, -quantity);
        match kind {
            TransferKind::User => add(&mut self.accounts, to, symbol, quantity),
            TransferKind::Contract => add(&mut self.contracts, to, symbol, quantity),
        }
        TransferResult {
            errors: Vec::new(),
            events: vec![LedgerEvent {
                contract: TOKENS_CONTRACT.into(),
                event: EVENT_TRANSFER_FROM_CONTRACT.into(),
                from: contract.into(),
                to: to.into(),
                symbol: symbol.into(),
                quantity,
            }],
        }
    }

    fn transfer_to_contract(
        &mut self,
        from: &str,
        symbol: &str,
        quantity: Decimal,
        to_contract: &str,
    ) -> TransferResult {
        if quantity <= Decimal::ZERO {
            return TransferResult::refused("invalid quantity");
        }
        if get(&self.accounts, from, symbol) < quantity {
            return TransferResult::refused("overdrawn balance");
        }
        add(&mut self.accounts, from, symbol, -quantity);
        add(&mut self.contracts, to_contract, symbol, quantity);
        TransferResult {
            errors: Vec::new(),
            events: vec![LedgerEvent {
                contract: TOKENS_CONTRACT.into(),
                event: EVENT_TRANSFER_TO_CONTRACT.into(),
                from: from.into(),
                to: to_contract.into(),
                symbol: symbol.into(),
                quantity,
            }],
        }
    }
}
