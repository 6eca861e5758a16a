//! Indexed document store the contract persists its state through.
//!
//! [`Repository`] is the collaborator interface: contract-scoped tables addressed by a
//! typed [`TableId`], rows that implement [`Record`], range filters, multi-key sorts and
//! limit/offset paging. [`MemoryStore`] is the in-process implementation used by the
//! replay binary and the tests; rows are kept as JSON documents keyed by an
//! auto-incremented `_id`, so insertion order doubles as time priority.

use crate::config::{CONTRACT_NAME, TOKENS_CONTRACT};
use crate::error::StoreError;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Store-assigned row identifier, increasing with insertion order.
pub type RowId = u64;

/// Page size used when a caller has no reason to pick another.
pub const DEFAULT_LIMIT: usize = 1000;

/// A table owned by one contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId {
    pub contract: &'static str,
    pub name: &'static str,
}

impl TableId {
    pub const fn new(contract: &'static str, name: &'static str) -> Self {
        Self { contract, name }
    }

    /// Storage key, `<contract>_<table>`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.contract, self.name)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.contract, self.name)
    }
}

/// Tables the market reads and writes.
pub mod tables {
    use super::{TableId, CONTRACT_NAME, TOKENS_CONTRACT};

    pub const BUY_BOOK: TableId = TableId::new(CONTRACT_NAME, "buyBook");
    pub const SELL_BOOK: TableId = TableId::new(CONTRACT_NAME, "sellBook");
    pub const TRADES_HISTORY: TableId = TableId::new(CONTRACT_NAME, "tradesHistory");
    pub const METRICS: TableId = TableId::new(CONTRACT_NAME, "metrics");
    /// Token registry, owned by the token contract and read-only here.
    pub const TOKENS: TableId = TableId::new(TOKENS_CONTRACT, "tokens");
}

/// Comparable value of an indexed field.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Str(String),
    Int(u64),
    Dec(Decimal),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Str(a), FieldValue::Str(b)) => a.partial_cmp(b),
            (FieldValue::Int(a), FieldValue::Int(b)) => a.partial_cmp(b),
            (FieldValue::Dec(a), FieldValue::Dec(b)) => a.partial_cmp(b),
            (FieldValue::Int(a), FieldValue::Dec(b)) => Decimal::from(*a).partial_cmp(b),
            (FieldValue::Dec(a), FieldValue::Int(b)) => a.partial_cmp(&Decimal::from(*b)),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Dec(v)
    }
}

/// One filter condition (`$eq`, `$lt`, `$lte`, `$gt`, `$gte`, `$in`).
#[derive(Clone, Debug, PartialEq)]
pub enum Cond {
    Eq(FieldValue),
    Lt(FieldValue),
    Lte(FieldValue),
    Gt(FieldValue),
    Gte(FieldValue),
    In(Vec<FieldValue>),
}

impl Cond {
    fn test(&self, value: &FieldValue) -> bool {
        match self {
            Cond::Eq(v) => value == v,
            Cond::Lt(v) => value.partial_cmp(v) == Some(Ordering::Less),
            Cond::Lte(v) => matches!(
                value.partial_cmp(v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Cond::Gt(v) => value.partial_cmp(v) == Some(Ordering::Greater),
            Cond::Gte(v) => matches!(
                value.partial_cmp(v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Cond::In(values) => values.iter().any(|v| value == v),
        }
    }
}

/// Conjunction of field conditions. An empty filter matches every row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Cond)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, cond: Cond) -> Self {
        self.clauses.push((field.to_string(), cond));
        self
    }

    pub fn eq(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.with(field, Cond::Eq(value.into()))
    }

    pub fn lt(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.with(field, Cond::Lt(value.into()))
    }

    pub fn lte(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.with(field, Cond::Lte(value.into()))
    }

    pub fn gt(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.with(field, Cond::Gt(value.into()))
    }

    pub fn gte(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.with(field, Cond::Gte(value.into()))
    }

    pub fn is_in<V: Into<FieldValue>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.with(field, Cond::In(values.into_iter().map(Into::into).collect()))
    }

    /// True if every clause holds. A row without the field fails its clause.
    pub fn matches<R: Record>(&self, row: &R) -> bool {
        self.clauses
            .iter()
            .all(|(field, cond)| lookup(row, field).is_some_and(|v| cond.test(&v)))
    }
}

/// One sort key; `_id` sorts by insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub index: &'static str,
    pub descending: bool,
}

impl SortSpec {
    pub const fn asc(index: &'static str) -> Self {
        Self {
            index,
            descending: false,
        }
    }

    pub const fn desc(index: &'static str) -> Self {
        Self {
            index,
            descending: true,
        }
    }
}

/// A row type stored in a table.
pub trait Record: Clone + Serialize + DeserializeOwned {
    fn row_id(&self) -> Option<RowId>;
    fn set_row_id(&mut self, id: RowId);
    /// Value of a filterable/sortable field, by its stored name.
    fn field(&self, name: &str) -> Option<FieldValue>;
}

fn lookup<R: Record>(row: &R, field: &str) -> Option<FieldValue> {
    if field == "_id" {
        row.row_id().map(FieldValue::Int)
    } else {
        row.field(field)
    }
}

/// Collection store consumed by the contract.
pub trait Repository {
    fn table_exists(&self, table: TableId) -> bool;

    fn create_table(&mut self, table: TableId, indexes: &[&str]) -> Result<(), StoreError>;

    /// Rows matching `filter`, ordered by `sort` (insertion order breaks ties), then paged.
    fn find<R: Record>(
        &self,
        table: TableId,
        filter: &Filter,
        limit: usize,
        offset: usize,
        sort: &[SortSpec],
    ) -> Result<Vec<R>, StoreError>;

    fn find_one<R: Record>(&self, table: TableId, filter: &Filter) -> Result<Option<R>, StoreError> {
        Ok(self.find(table, filter, 1, 0, &[])?.into_iter().next())
    }

    /// Inserts `row` and returns it with its assigned `_id`.
    fn insert<R: Record>(&mut self, table: TableId, row: R) -> Result<R, StoreError>;

    fn update<R: Record>(&mut self, table: TableId, row: &R) -> Result<(), StoreError>;

    fn remove<R: Record>(&mut self, table: TableId, row: &R) -> Result<(), StoreError>;

    /// Read-only lookup in a table owned by another contract.
    fn find_one_in_table<R: Record>(&self, table: TableId, filter: &Filter) -> Result<Option<R>, StoreError> {
        self.find_one(table, filter)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct StoredTable {
    indexes: Vec<String>,
    last_id: RowId,
    rows: BTreeMap<RowId, serde_json::Value>,
}

/// In-memory [`Repository`]. Serializable so whole-state snapshots can be written to disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    tables: BTreeMap<String, StoredTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `table` (0 if it does not exist).
    pub fn len(&self, table: TableId) -> usize {
        self.tables.get(&table.key()).map_or(0, |t| t.rows.len())
    }

    pub fn is_empty(&self, table: TableId) -> bool {
        self.len(table) == 0
    }

    fn table(&self, table: TableId) -> Result<&StoredTable, StoreError> {
        self.tables
            .get(&table.key())
            .ok_or_else(|| StoreError::TableNotFound(table.key()))
    }

    fn table_mut(&mut self, table: TableId) -> Result<&mut StoredTable, StoreError> {
        self.tables
            .get_mut(&table.key())
            .ok_or_else(|| StoreError::TableNotFound(table.key()))
    }
}

fn encode<R: Record>(row: &R) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(row).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode<R: Record>(id: RowId, value: &serde_json::Value) -> Result<R, StoreError> {
    let mut row: R =
        serde_json::from_value(value.clone()).map_err(|e| StoreError::Encoding(e.to_string()))?;
    row.set_row_id(id);
    Ok(row)
}

fn compare<R: Record>(a: &R, b: &R, sort: &[SortSpec]) -> Ordering {
    for spec in sort {
        let ord = match (lookup(a, spec.index), lookup(b, spec.index)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ord = if spec.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl Repository for MemoryStore {
    fn table_exists(&self, table: TableId) -> bool {
        self.tables.contains_key(&table.key())
    }

    fn create_table(&mut self, table: TableId, indexes: &[&str]) -> Result<(), StoreError> {
        let key = table.key();
        if self.tables.contains_key(&key) {
            return Err(StoreError::TableExists(key));
        }
        self.tables.insert(
            key,
            StoredTable {
                indexes: indexes.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn find<R: Record>(
        &self,
        table: TableId,
        filter: &Filter,
        limit: usize,
        offset: usize,
        sort: &[SortSpec],
    ) -> Result<Vec<R>, StoreError> {
        let stored = self.table(table)?;
        let mut rows = Vec::new();
        for (id, value) in &stored.rows {
            let row: R = decode(*id, value)?;
            if filter.matches(&row) {
                rows.push(row);
            }
        }
        // stable: rows arrive in _id order, so equal keys keep insertion order
        rows.sort_by(|a, b| compare(a, b, sort));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    fn insert<R: Record>(&mut self, table: TableId, mut row: R) -> Result<R, StoreError> {
        let stored = self.table_mut(table)?;
        let id = stored.last_id + 1;
        row.set_row_id(id);
        let value = encode(&row)?;
        stored.last_id = id;
        stored.rows.insert(id, value);
        Ok(row)
    }

    fn update<R: Record>(&mut self, table: TableId, row: &R) -> Result<(), StoreError> {
        let id = row.row_id().ok_or(StoreError::MissingId)?;
        let value = encode(row)?;
        let stored = self.table_mut(table)?;
        match stored.rows.get_mut(&id) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StoreError::RowNotFound {
                table: table.key(),
                id,
            }),
        }
    }

    fn remove<R: Record>(&mut self, table: TableId, row: &R) -> Result<(), StoreError> {
        let id = row.row_id().ok_or(StoreError::MissingId)?;
        let stored = self.table_mut(table)?;
        stored
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.key(),
                id,
            })
    }
}
