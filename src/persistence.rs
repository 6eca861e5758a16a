//! Persistence: save and load node state to a file, and seed a fresh node from genesis.
//!
//! A snapshot holds the whole document store and the token ledger, so a replay can be
//! stopped and resumed from the last applied block.

use crate::error::{PersistenceError, StoreError};
use crate::ledger::MemoryLedger;
use crate::store::{tables, Filter, MemoryStore, Repository};
use crate::types::TokenInfo;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Full persisted state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub store: MemoryStore,
    pub ledger: MemoryLedger,
    /// Block timestamp of the last applied transaction.
    #[serde(default)]
    pub last_block_timestamp: u64,
    /// Set once genesis balances have been credited.
    #[serde(default)]
    pub genesis_applied: bool,
}

impl PersistedState {
    /// Applies `genesis` unless this state already has it. Returns whether it did.
    pub fn apply_genesis(&mut self, genesis: &Genesis) -> Result<bool, StoreError> {
        if self.genesis_applied {
            return Ok(false);
        }
        genesis.apply(&mut self.store, &mut self.ledger)?;
        self.genesis_applied = true;
        Ok(true)
    }
}

/// One initial balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub account: String,
    pub symbol: String,
    pub quantity: Decimal,
}

/// Token registry and balances a fresh node starts from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
}

impl Genesis {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Registers the tokens and credits the balances.
    pub fn apply(&self, store: &mut MemoryStore, ledger: &mut MemoryLedger) -> Result<(), StoreError> {
        for token in &self.tokens {
            register_token(store, token.clone())?;
        }
        for b in &self.balances {
            ledger.credit(&b.account, &b.symbol, b.quantity);
        }
        Ok(())
    }
}

/// Adds `token` to the token contract's registry, creating the table on first use.
/// A symbol that is already registered is left untouched.
pub fn register_token<R: Repository>(repo: &mut R, token: TokenInfo) -> Result<(), StoreError> {
    if !repo.table_exists(tables::TOKENS) {
        repo.create_table(tables::TOKENS, &["symbol"])?;
    }
    let existing: Option<TokenInfo> =
        repo.find_one(tables::TOKENS, &Filter::new().eq("symbol", token.symbol.as_str()))?;
    if existing.is_none() {
        repo.insert(tables::TOKENS, token)?;
    }
    Ok(())
}

/// File-based persistence: one JSON file. Save after applying a batch; load on startup.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Save state to file. Overwrites existing file.
    pub fn save(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Load state from file. `None` if the file does not exist.
    pub fn load(&self) -> Result<Option<PersistedState>, PersistenceError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("peg_market_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn save_then_load_restores_store_and_ledger() {
        let mut state = PersistedState::default();
        register_token(&mut state.store, TokenInfo::new("ABC", 3)).unwrap();
        state.ledger.credit("alice", "STEEMP", Decimal::from(5));
        state.last_block_timestamp = 42;

        let path = temp_path("roundtrip");
        let persistence = FilePersistence::new(&path);
        persistence.save(&state).unwrap();
        let loaded = persistence.load().unwrap().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, state);
        assert_eq!(loaded.ledger.balance("alice", "STEEMP"), Decimal::from(5));
    }

    #[test]
    fn genesis_is_credited_once_across_restarts() {
        let genesis = Genesis {
            tokens: vec![TokenInfo::new("ABC", 3)],
            balances: vec![GenesisBalance {
                account: "alice".into(),
                symbol: "STEEMP".into(),
                quantity: Decimal::from(100),
            }],
        };
        let path = temp_path("genesis_once");
        let persistence = FilePersistence::new(&path);

        let mut state = PersistedState::default();
        assert!(state.apply_genesis(&genesis).unwrap());
        persistence.save(&state).unwrap();

        let mut restarted = persistence.load().unwrap().unwrap();
        assert!(!restarted.apply_genesis(&genesis).unwrap());
        std::fs::remove_file(&path).ok();

        assert_eq!(restarted.last_block_timestamp, 0);
        assert_eq!(restarted.ledger.supply("STEEMP"), Decimal::from(100));
        assert_eq!(restarted.store.len(tables::TOKENS), 1);
    }

    #[test]
    fn load_missing_file_is_none() {
        let persistence = FilePersistence::new(temp_path("missing"));
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn genesis_registers_tokens_once_and_credits_balances() {
        let genesis: Genesis = serde_json::from_str(
            r#"{
                "tokens": [{"symbol": "ABC", "precision": 3}, {"symbol": "ABC", "precision": 8}],
                "balances": [{"account": "alice", "symbol": "STEEMP", "quantity": "100"}]
            }"#,
        )
        .unwrap();
        let mut store = MemoryStore::new();
        let mut ledger = MemoryLedger::new();
        genesis.apply(&mut store, &mut ledger).unwrap();

        assert_eq!(store.len(tables::TOKENS), 1);
        let token: TokenInfo = store
            .find_one(tables::TOKENS, &Filter::new().eq("symbol", "ABC"))
            .unwrap()
            .unwrap();
        assert_eq!(token.precision, 3);
        assert_eq!(ledger.balance("alice", "STEEMP"), Decimal::from(100));
    }
}
