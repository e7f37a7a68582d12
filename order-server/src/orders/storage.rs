//! redb-based storage layer for order records
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `OrderSnapshot` | Authoritative record (JSON) |
//! | `pending_orders` | `order_id` | `created_at` | Pending index for the escalation scan |
//! | `escalated_orders` | `order_id` | `escalated_at` | Escalated index for the manager view |
//!
//! # Concurrency
//!
//! redb serializes write transactions, so reading the stored revision and
//! writing the replacement inside one write transaction is an atomic
//! compare-and-swap. The index tables are maintained in the same
//! transaction as the record and can never drift from it.

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use shared::order::OrderSnapshot;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Table for order records: key = order_id, value = JSON-serialized OrderSnapshot
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Pending index: key = order_id, value = created_at (ms)
const PENDING_TABLE: TableDefinition<&str, i64> = TableDefinition::new("pending_orders");

/// Escalated index: key = order_id, value = escalated_at (ms)
const ESCALATED_TABLE: TableDefinition<&str, i64> = TableDefinition::new("escalated_orders");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order already exists: {0}")]
    AlreadyExists(String),

    #[error("Revision conflict: expected {expected}, actual {actual}")]
    RevisionConflict { expected: u64, actual: u64 },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Order storage backed by redb
#[derive(Clone)]
pub struct OrderStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for OrderStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStorage").finish_non_exhaustive()
    }
}

impl OrderStorage {
    /// Open or create the database at the given path
    ///
    /// redb commits with `Durability::Immediate` by default: a record is on
    /// disk as soon as `commit()` returns, and the copy-on-write pages keep
    /// the file consistent across power loss.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and ephemeral runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(PENDING_TABLE)?;
            let _ = write_txn.open_table(ESCALATED_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Writes ==========

    /// Store a freshly created order; fails if the id is taken
    pub fn insert_new(&self, order: &OrderSnapshot) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            if table.get(order.order_id.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(order.order_id.clone()));
            }
            let value = serde_json::to_vec(order)?;
            table.insert(order.order_id.as_str(), value.as_slice())?;
        }
        Self::write_indexes(&txn, order)?;
        txn.commit()?;
        Ok(())
    }

    /// Replace a record only if its stored revision still equals `read_revision`
    ///
    /// Exactly one of several writers that read the same revision succeeds;
    /// the others get `RevisionConflict` carrying the winning revision.
    pub fn compare_and_swap(
        &self,
        order: &OrderSnapshot,
        read_revision: u64,
    ) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;

            // Read and drop the guard before inserting
            let current = match table.get(order.order_id.as_str())? {
                Some(value) => serde_json::from_slice::<OrderSnapshot>(value.value())?,
                None => return Err(StorageError::OrderNotFound(order.order_id.clone())),
            };
            if current.revision != read_revision {
                return Err(StorageError::RevisionConflict {
                    expected: read_revision,
                    actual: current.revision,
                });
            }

            let value = serde_json::to_vec(order)?;
            table.insert(order.order_id.as_str(), value.as_slice())?;
        }
        Self::write_indexes(&txn, order)?;
        txn.commit()?;
        Ok(())
    }

    /// Keep both index tables in step with `order` (within transaction)
    fn write_indexes(txn: &WriteTransaction, order: &OrderSnapshot) -> StorageResult<()> {
        let id = order.order_id.as_str();

        let mut pending = txn.open_table(PENDING_TABLE)?;
        if order.is_pending() {
            pending.insert(id, order.created_at())?;
        } else {
            pending.remove(id)?;
        }

        let mut escalated = txn.open_table(ESCALATED_TABLE)?;
        match order.escalated_at.filter(|_| order.escalated) {
            Some(at) => {
                escalated.insert(id, at)?;
            }
            None => {
                escalated.remove(id)?;
            }
        }
        Ok(())
    }

    // ========== Reads ==========

    /// Get an order by id
    pub fn get(&self, order_id: &str) -> StorageResult<Option<OrderSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;

        match table.get(order_id)? {
            Some(value) => {
                let order: OrderSnapshot = serde_json::from_slice(value.value())?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    /// Pending, not yet escalated orders created at or before `cutoff`
    ///
    /// Oldest first, so a capped sweep handles the longest waits.
    pub fn find_stale_pending(&self, cutoff: i64) -> StorageResult<Vec<OrderSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING_TABLE)?;
        let escalated = read_txn.open_table(ESCALATED_TABLE)?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;

        let mut stale = Vec::new();
        for result in pending.iter()? {
            let (key, created_at) = result?;
            if created_at.value() > cutoff {
                continue;
            }
            let order_id = key.value();
            if escalated.get(order_id)?.is_some() {
                continue;
            }
            if let Some(value) = orders.get(order_id)? {
                let order: OrderSnapshot = serde_json::from_slice(value.value())?;
                stale.push(order);
            }
        }

        stale.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        Ok(stale)
    }

    /// Escalated orders of a restaurant, oldest escalation first
    pub fn escalated(&self, restaurant_id: &str) -> StorageResult<Vec<OrderSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let escalated = read_txn.open_table(ESCALATED_TABLE)?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;

        let mut result_orders = Vec::new();
        for result in escalated.iter()? {
            let (key, _) = result?;
            if let Some(value) = orders.get(key.value())? {
                let order: OrderSnapshot = serde_json::from_slice(value.value())?;
                if order.restaurant_id == restaurant_id {
                    result_orders.push(order);
                }
            }
        }

        result_orders.sort_by_key(|o| o.escalated_at);
        Ok(result_orders)
    }

    /// Pending orders of a restaurant, optionally narrowed to one waiter
    pub fn pending_for(
        &self,
        restaurant_id: &str,
        responsible_party: Option<&str>,
    ) -> StorageResult<Vec<OrderSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING_TABLE)?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;

        let mut result_orders = Vec::new();
        for result in pending.iter()? {
            let (key, _) = result?;
            let Some(value) = orders.get(key.value())? else {
                continue;
            };
            let order: OrderSnapshot = serde_json::from_slice(value.value())?;
            if order.restaurant_id != restaurant_id {
                continue;
            }
            if let Some(party) = responsible_party
                && !order.is_responsible(party)
            {
                continue;
            }
            result_orders.push(order);
        }

        result_orders.sort_by_key(|o| o.created_at());
        Ok(result_orders)
    }

    // ========== Statistics ==========

    /// Total number of stored orders
    pub fn count(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        Ok(table.len()?)
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> StorageResult<StorageStats> {
        let read_txn = self.db.begin_read()?;

        let orders = read_txn.open_table(ORDERS_TABLE)?;
        let pending = read_txn.open_table(PENDING_TABLE)?;
        let escalated = read_txn.open_table(ESCALATED_TABLE)?;

        Ok(StorageStats {
            order_count: orders.len()?,
            pending_count: pending.len()?,
            escalated_count: escalated.len()?,
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    pub order_count: u64,
    pub pending_count: u64,
    pub escalated_count: u64,
}
