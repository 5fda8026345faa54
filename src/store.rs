//! Embedded transactional storage.
//!
//! Each table is its own sled tree. Engine operations run inside a single
//! multi-tree transaction through [`Store::transaction`]: sled transactions are
//! serializable and transparently retried on conflict, so a row read inside the
//! closure is effectively locked for the rest of it. Any abort discards every
//! write made by the closure.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::Transactional;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{RegoError, RegoResult, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Providers,
    Consumers,
    Plants,
    PowerGenerations,
    GenerationPeriods,
    CarriedAmounts,
    RegoGroups,
    Regos,
    IdentificationNumbers,
    TradeInfos,
    BuyingRegos,
    Confirmations,
    CertificationIssueRegos,
    ProviderDirectory,
}

impl Table {
    pub const ALL: [Table; 14] = [
        Table::Providers,
        Table::Consumers,
        Table::Plants,
        Table::PowerGenerations,
        Table::GenerationPeriods,
        Table::CarriedAmounts,
        Table::RegoGroups,
        Table::Regos,
        Table::IdentificationNumbers,
        Table::TradeInfos,
        Table::BuyingRegos,
        Table::Confirmations,
        Table::CertificationIssueRegos,
        Table::ProviderDirectory,
    ];

    pub fn tree_name(&self) -> &'static str {
        match self {
            Table::Providers => "provider",
            Table::Consumers => "consumer",
            Table::Plants => "plant",
            Table::PowerGenerations => "power_generation",
            Table::GenerationPeriods => "power_generation_period_idx",
            Table::CarriedAmounts => "provider_plant_carried_amount",
            Table::RegoGroups => "rego_group",
            Table::Regos => "rego",
            Table::IdentificationNumbers => "identification_number_idx",
            Table::TradeInfos => "rego_trade_info",
            Table::BuyingRegos => "buying_rego",
            Table::Confirmations => "rego_confirmation",
            Table::CertificationIssueRegos => "certification_issue_rego",
            Table::ProviderDirectory => "provider_directory",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A row type stored in exactly one table.
pub trait Record: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    const TABLE: Table;
    /// Name used in not-found messages.
    const ENTITY: &'static str;
    fn key(&self) -> Vec<u8>;
}

pub fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub fn pair_key(a: u64, b: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&a.to_be_bytes());
    key.extend_from_slice(&b.to_be_bytes());
    key
}

pub type TxResult<T> = ConflictableTransactionResult<T, RegoError>;

/// Abort the surrounding transaction with a domain error.
pub fn abort<T>(err: impl Into<RegoError>) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

impl From<ValidationError> for ConflictableTransactionError<RegoError> {
    fn from(value: ValidationError) -> Self {
        ConflictableTransactionError::Abort(value.into())
    }
}

#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    trees: Vec<sled::Tree>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> RegoResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Store that lives only as long as the process, used by tests and dry runs.
    pub fn temporary() -> RegoResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> RegoResult<Self> {
        let trees = Table::ALL
            .iter()
            .map(|table| db.open_tree(table.tree_name()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { db, trees })
    }

    pub fn flush(&self) -> RegoResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, table: Table) -> &sled::Tree {
        &self.trees[table.index()]
    }

    /// Run `f` atomically over every table.
    pub fn transaction<A, F>(&self, f: F) -> RegoResult<A>
    where
        F: Fn(&Tx<'_>) -> TxResult<A>,
    {
        let result = self
            .trees
            .as_slice()
            .transaction(|views| f(&Tx { views: &views[..] }));
        result.map_err(RegoError::from)
    }

    pub fn fetch<R: Record>(&self, key: &[u8]) -> RegoResult<Option<R>> {
        match self.tree(R::TABLE).get(key)? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn scan<R: Record>(&self) -> RegoResult<Vec<R>> {
        self.scan_prefix(&[])
    }

    pub fn scan_prefix<R: Record>(&self, prefix: &[u8]) -> RegoResult<Vec<R>> {
        let mut rows = Vec::new();
        for item in self.tree(R::TABLE).scan_prefix(prefix) {
            let (_, value) = item?;
            rows.push(minicbor::decode(&value)?);
        }
        Ok(rows)
    }

    /// Raw lookup on an index table.
    pub fn lookup(&self, table: Table, key: &[u8]) -> RegoResult<Option<u64>> {
        Ok(self.tree(table).get(key)?.and_then(|v| decode_id(&v)))
    }
}

fn decode_id(bytes: &[u8]) -> Option<u64> {
    <[u8; 8]>::try_from(bytes).ok().map(u64::from_be_bytes)
}

/// The view of every table inside one transaction.
pub struct Tx<'a> {
    views: &'a [TransactionalTree],
}

impl Tx<'_> {
    fn view(&self, table: Table) -> &TransactionalTree {
        &self.views[table.index()]
    }

    pub fn get<R: Record>(&self, key: &[u8]) -> TxResult<Option<R>> {
        match self.view(R::TABLE).get(key)? {
            Some(bytes) => match minicbor::decode(&bytes) {
                Ok(row) => Ok(Some(row)),
                Err(e) => abort(e),
            },
            None => Ok(None),
        }
    }

    /// Fetch a row by id or abort with a not-found error.
    pub fn require<R: Record>(&self, id: u64) -> TxResult<R> {
        match self.get(&id_key(id))? {
            Some(row) => Ok(row),
            None => abort(RegoError::not_found(R::ENTITY, id)),
        }
    }

    pub fn put<R: Record>(&self, row: &R) -> TxResult<()> {
        let bytes = match minicbor::to_vec(row) {
            Ok(bytes) => bytes,
            Err(e) => return abort(e),
        };
        self.view(R::TABLE).insert(row.key(), bytes)?;
        Ok(())
    }

    pub fn lookup(&self, table: Table, key: &[u8]) -> TxResult<Option<u64>> {
        Ok(self.view(table).get(key)?.and_then(|v| decode_id(&v)))
    }

    pub fn link(&self, table: Table, key: &[u8], id: u64) -> TxResult<()> {
        self.view(table).insert(key, id_key(id))?;
        Ok(())
    }

    /// Fresh row id, never zero. Ids are unique across tables and not rolled back.
    pub fn next_id(&self) -> TxResult<u64> {
        self.view(Table::Providers)
            .generate_id()
            .map(|id| id + 1)
            .map_err(ConflictableTransactionError::Storage)
    }
}

/// Bounded set of concurrent write sessions.
///
/// Stands in for a connection pool: a request that cannot get a session before
/// the timeout fails with [`RegoError::ResourceExhausted`].
#[derive(Clone)]
pub struct SessionPool {
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

pub struct Session {
    _permit: OwnedSemaphorePermit,
}

impl SessionPool {
    pub fn new(max_sessions: usize, acquire_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_sessions)),
            acquire_timeout,
        }
    }

    pub async fn acquire(&self) -> RegoResult<Session> {
        let acquire = self.permits.clone().acquire_owned();
        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => Ok(Session { _permit: permit }),
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(timeout_ms = self.acquire_timeout.as_millis() as u64, "session pool saturated");
                Err(RegoError::ResourceExhausted)
            }
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
