//! Trade history rows and per-action reports.
//!
//! A [`TradeRecord`] is appended to `tradesHistory` for every fill. An [`ActionReport`]
//! is what one executed transaction produced: its fills, every payout made from
//! contract custody, non-fatal assertion failures, and the order it left resting.

use crate::store::{FieldValue, Record, RowId};
use crate::types::{Order, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One fill in the rolling trade history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<RowId>,
    /// Taker side.
    #[serde(rename = "type")]
    pub side: Side,
    pub buyer: String,
    pub seller: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Settlement tokens exchanged.
    pub volume: Decimal,
    pub timestamp: u64,
}

impl Record for TradeRecord {
    fn row_id(&self) -> Option<RowId> {
        self.row_id
    }

    fn set_row_id(&mut self, id: RowId) {
        self.row_id = Some(id);
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "symbol" => Some(self.symbol.as_str().into()),
            "timestamp" => Some(self.timestamp.into()),
            "buyer" => Some(self.buyer.as_str().into()),
            "seller" => Some(self.seller.as_str().into()),
            "price" => Some(self.price.into()),
            _ => None,
        }
    }
}

/// A transfer out of contract custody made while executing an action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub to: String,
    pub symbol: String,
    pub quantity: Decimal,
    /// False if the ledger refused it. Refused payouts are not retried.
    pub settled: bool,
}

/// Result of one executed action.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub trades: Vec<TradeRecord>,
    pub payouts: Vec<Payout>,
    /// Assertion failures that did not abort the action.
    pub errors: Vec<String>,
    /// The taker order, if part of it was left resting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resting: Option<Order>,
}

impl ActionReport {
    /// Total of `symbol` paid to `account` by this action.
    pub fn paid_to(&self, account: &str, symbol: &str) -> Decimal {
        self.payouts
            .iter()
            .filter(|p| p.settled && p.to == account && p.symbol == symbol)
            .map(|p| p.quantity)
            .sum()
    }

    /// Settlement volume of all fills.
    pub fn volume(&self) -> Decimal {
        self.trades.iter().map(|t| t.volume).sum()
    }
}
