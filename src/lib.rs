//! # Peg Market
//!
//! Deterministic limit-order market between a pegged settlement token and registered
//! tokens: per-symbol buy and sell books, price-time priority matching, market orders,
//! an expiration sweeper, rolling trade history and per-symbol metrics.
//!
//! Every replica that executes the same transactions in the same order reaches the same
//! books, balances, history and metrics. The only clock is the block timestamp carried
//! by each [`Transaction`].
//!
//! ## Entry point
//!
//! Use [`Market`] as the single entry point: create with [`Market::new`], call
//! [`Market::install`] once, then [`Market::execute`] for every transaction. State lives
//! in a [`Repository`] and balances in a [`TokenLedger`]; [`MemoryStore`] and
//! [`MemoryLedger`] are the in-process implementations.
//!
//! ## Example
//!
//! ```rust
//! use peg_market::{
//!     register_token, Action, LimitOrderPayload, Market, MarketConfig, MemoryLedger,
//!     MemoryStore, SigningTier, TokenInfo, Transaction,
//! };
//! use rust_decimal::Decimal;
//!
//! let market = Market::new(MarketConfig::default());
//! let mut repo = MemoryStore::new();
//! let mut ledger = MemoryLedger::new();
//! market.install(&mut repo).unwrap();
//! register_token(&mut repo, TokenInfo::new("ABC", 3)).unwrap();
//! ledger.credit("alice", "STEEMP", Decimal::from(100));
//!
//! let tx = Transaction {
//!     id: "tx1".into(),
//!     sender: "alice".into(),
//!     block_timestamp: 1_000,
//!     signing: SigningTier::Active,
//!     payload: Action::Buy(LimitOrderPayload {
//!         symbol: "ABC".into(),
//!         quantity: "10".into(),
//!         price: "2".into(),
//!         expiration: None,
//!     }),
//! };
//! let report = market.execute(&mut repo, &mut ledger, &tx).unwrap();
//! assert!(report.trades.is_empty());
//! assert_eq!(report.resting.unwrap().tokens_locked, Some(Decimal::new(2000000000, 8)));
//! ```
//!
//! ## Lower-level API
//!
//! [`OrderBook`], [`match_buy_order`], [`match_sell_order`], [`market_buy`] and
//! [`market_sell`] can be driven directly through a [`MarketContext`] when escrow is
//! handled by the caller.

pub mod audit;
pub mod config;
pub mod context;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod execution;
pub mod expiration;
pub mod ledger;
pub mod market_order;
pub mod matching;
pub mod metrics;
pub mod order_book;
pub mod persistence;
pub mod store;
pub mod tx_gen;
pub mod types;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, StderrAuditSink};
pub use config::MarketConfig;
pub use context::MarketContext;
pub use engine::Market;
pub use error::{MarketError, PersistenceError, StoreError};
pub use execution::{ActionReport, Payout, TradeRecord};
pub use ledger::{MemoryLedger, TokenLedger};
pub use market_order::{market_buy, market_sell};
pub use matching::{match_buy_order, match_sell_order};
pub use metrics::Metric;
pub use order_book::OrderBook;
pub use persistence::{register_token, FilePersistence, Genesis, GenesisBalance, PersistedState};
pub use store::{Filter, MemoryStore, Repository, SortSpec, TableId};
pub use tx_gen::{replay_into_market, Generator, GeneratorConfig, ReplaySummary};
pub use types::{
    Action, CancelPayload, LimitOrderPayload, MarketOrderPayload, Order, Side, SigningTier,
    TokenInfo, Transaction,
};
