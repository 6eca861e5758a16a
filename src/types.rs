//! Core rows and transaction payloads.
//!
//! [`Order`] is one resting row of `buyBook` or `sellBook`; [`Transaction`] is one
//! action invocation as delivered by the ledger, carrying the sender, the transaction id
//! the order will be known by, and the block time every time-dependent rule uses.

use crate::store::{tables, FieldValue, Record, RowId, TableId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side. For trades, the taker's side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Book table holding resting orders of this side.
    pub fn book(self) -> TableId {
        match self {
            Side::Buy => tables::BUY_BOOK,
            Side::Sell => tables::SELL_BOOK,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Key tier a transaction was signed with. Market actions require `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningTier {
    Posting,
    Active,
}

/// Resting order.
///
/// Sell orders escrow exactly `quantity` of `symbol`. Buy orders escrow the settlement
/// token and track what is left of it in `tokens_locked`, which is refunded as-is on
/// cancel or expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<RowId>,
    pub tx_id: String,
    pub timestamp: u64,
    pub account: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_locked: Option<Decimal>,
    pub expiration: u64,
}

impl Order {
    /// Symbol and amount still escrowed for this order.
    pub fn escrow(&self, side: Side, peg_symbol: &str) -> (String, Decimal) {
        match side {
            Side::Buy => (
                peg_symbol.to_string(),
                self.tokens_locked.unwrap_or(Decimal::ZERO),
            ),
            Side::Sell => (self.symbol.clone(), self.quantity),
        }
    }
}

impl Record for Order {
    fn row_id(&self) -> Option<RowId> {
        self.row_id
    }

    fn set_row_id(&mut self, id: RowId) {
        self.row_id = Some(id);
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "txId" => Some(self.tx_id.as_str().into()),
            "account" => Some(self.account.as_str().into()),
            "symbol" => Some(self.symbol.as_str().into()),
            "price" => Some(self.price.into()),
            "quantity" => Some(self.quantity.into()),
            "expiration" => Some(self.expiration.into()),
            "timestamp" => Some(self.timestamp.into()),
            _ => None,
        }
    }
}

/// Registered token, as stored by the token contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<RowId>,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub precision: u32,
}

impl TokenInfo {
    pub fn new(symbol: impl Into<String>, precision: u32) -> Self {
        let symbol = symbol.into();
        Self {
            row_id: None,
            name: symbol.clone(),
            symbol,
            precision,
        }
    }
}

impl Record for TokenInfo {
    fn row_id(&self) -> Option<RowId> {
        self.row_id
    }

    fn set_row_id(&mut self, id: RowId) {
        self.row_id = Some(id);
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "symbol" => Some(self.symbol.as_str().into()),
            "precision" => Some(u64::from(self.precision).into()),
            _ => None,
        }
    }
}

/// `buy` / `sell` payload. Amounts arrive as decimal strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderPayload {
    pub symbol: String,
    pub quantity: String,
    pub price: String,
    /// Lifetime in seconds; capped at 30 days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
}

/// `marketBuy` / `marketSell` payload. For a market buy `quantity` is settlement tokens
/// to spend; for a market sell it is units of `symbol` to sell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketOrderPayload {
    pub symbol: String,
    pub quantity: String,
}

/// `cancel` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CancelPayload {
    #[serde(rename = "type")]
    pub side: Side,
    pub id: String,
}

/// Contract action entry points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    Buy(LimitOrderPayload),
    Sell(LimitOrderPayload),
    MarketBuy(MarketOrderPayload),
    MarketSell(MarketOrderPayload),
    Cancel(CancelPayload),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Buy(_) => "buy",
            Action::Sell(_) => "sell",
            Action::MarketBuy(_) => "marketBuy",
            Action::MarketSell(_) => "marketSell",
            Action::Cancel(_) => "cancel",
        }
    }

    /// Traded symbol, if the action names one.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Action::Buy(p) | Action::Sell(p) => Some(&p.symbol),
            Action::MarketBuy(p) | Action::MarketSell(p) => Some(&p.symbol),
            Action::Cancel(_) => None,
        }
    }
}

/// One action invocation, in the order the ledger sequenced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction id; becomes the id of any order it creates.
    pub id: String,
    pub sender: String,
    /// Timestamp of the containing block, seconds since the epoch.
    pub block_timestamp: u64,
    pub signing: SigningTier,
    pub payload: Action,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_json_round_trips_with_camel_case_action() {
        let json = r#"{
            "id": "tx1",
            "sender": "alice",
            "blockTimestamp": 1000,
            "signing": "active",
            "payload": {"action": "marketBuy", "symbol": "ABC", "quantity": "15"}
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.payload.name(), "marketBuy");
        assert_eq!(tx.payload.symbol(), Some("ABC"));
        assert_eq!(tx.signing, SigningTier::Active);
    }

    #[test]
    fn cancel_payload_uses_type_field() {
        let action: Action =
            serde_json::from_str(r#"{"action":"cancel","type":"sell","id":"tx9"}"#).unwrap();
        assert_eq!(
            action,
            Action::Cancel(CancelPayload {
                side: Side::Sell,
                id: "tx9".into()
            })
        );
    }

    #[test]
    fn escrow_depends_on_side() {
        let order = Order {
            row_id: None,
            tx_id: "tx1".into(),
            timestamp: 0,
            account: "alice".into(),
            symbol: "ABC".into(),
            quantity: Decimal::from(10),
            price: Decimal::from(2),
            tokens_locked: Some(Decimal::from(20)),
            expiration: 1,
        };
        assert_eq!(order.escrow(Side::Buy, "STEEMP"), ("STEEMP".into(), Decimal::from(20)));
        assert_eq!(order.escrow(Side::Sell, "STEEMP"), ("ABC".into(), Decimal::from(10)));
        assert_eq!(Side::Buy.book(), tables::BUY_BOOK);
    }
}
