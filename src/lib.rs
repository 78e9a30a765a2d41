//! RustyDB core: columnar storage & compression engine (C1) plus the
//! vectorized join-probe execution core (C2). The SQL-like parser,
//! binder, logical planner, CLI, and extension/plugin system are
//! collaborators out of scope for this crate (spec §1); what's here is
//! the storage/execution substrate they're built on, plus a thin
//! embedding facade (`Database`/`Connection`/`QueryResult`) matching
//! spec §6's external interface contract so the core can be exercised
//! end to end without a real parser/binder/planner.

pub mod catalog;
pub mod common;
pub mod error;
pub mod exec;
pub mod index;
pub mod storage;
pub mod transaction;
pub mod vector;

pub use error::{DbError, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use catalog::{ColumnDef, StorageStructureId};
use common::TableId;
use storage::buffer::BufferManager;
use storage::disk::FileHandle;
use transaction::wal::WriteAheadLog;
use transaction::{Transaction, TransactionManager, TransactionMode};
use vector::value_vector::ValueVector;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Database-wide configuration: where files live and how big the page
/// cache / node groups are allowed to get. Mirrors the teacher's
/// `Config`/`DatabaseConfig` shape, narrowed to what the storage core
/// actually reads (the network/server fields are a collaborator
/// concern).
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub page_size: usize,
    pub buffer_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            page_size: common::PAGE_SIZE,
            buffer_pool_size: 1000,
        }
    }
}

/// Table registration: enough identity for storage to key WAL records
/// and allocate a column data file per column (spec §4.1, §4.5).
pub struct TableHandle {
    pub table_id: TableId,
    pub columns: Vec<ColumnDef>,
}

/// An open database: the buffer manager (page cache + WAL) and the
/// transaction manager that enforces "at most one write transaction
/// system-wide" (spec §5). Collaborator state (catalog contents beyond
/// `StorageStructureId` routing, statistics, extension registry) lives
/// outside this crate's scope.
pub struct Database {
    data_dir: PathBuf,
    buffer: Arc<BufferManager>,
    txn_manager: TransactionManager,
}

impl Database {
    /// Opens (creating if necessary) a database rooted at `path`,
    /// replaying any committed-but-not-checkpointed WAL records left
    /// over from a prior crash (spec §8 invariant 8).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let data_dir = path.as_ref().to_path_buf();
        tracing::info!(data_dir = %data_dir.display(), "opening database");
        std::fs::create_dir_all(&data_dir)?;
        let wal = WriteAheadLog::open(data_dir.join("wal"))?;
        let buffer = Arc::new(BufferManager::new(wal));
        buffer.recover()?;
        Ok(Self {
            data_dir,
            buffer,
            txn_manager: TransactionManager::new(),
        })
    }

    /// Registers a column's on-disk file so the buffer manager can route
    /// pins for it; a real catalog would do this from persisted DDL, but
    /// that persistence format is a collaborator concern (spec §1).
    pub fn register_column_file(&self, table_id: TableId, column_id: u32) -> Result<()> {
        let sid = StorageStructureId::Column { table_id, column_id };
        let file = Arc::new(FileHandle::open(
            self.data_dir.join(format!("t{table_id}_c{column_id}.col")),
        )?);
        self.buffer.register_file(sid, file);
        Ok(())
    }

    pub fn register_overflow_file(&self, table_id: TableId, column_id: u32) -> Result<()> {
        let sid = StorageStructureId::Overflow { table_id, column_id };
        let file = Arc::new(FileHandle::open(
            self.data_dir.join(format!("t{table_id}_c{column_id}.ovf")),
        )?);
        self.buffer.register_file(sid, file);
        Ok(())
    }

    pub fn buffer(&self) -> &BufferManager {
        &self.buffer
    }

    /// Opens a new connection; each connection owns at most one
    /// in-flight transaction at a time (spec §6).
    pub fn connection(&self) -> Connection<'_> {
        Connection { db: self, txn: None }
    }
}

/// Transaction-scoped handle consumed by the binder/planner (spec §6's
/// `connection` contract: `beginRead | beginWrite | commit |
/// commitSkipCheckpoint | rollback | rollbackSkipCheckpoint`).
pub struct Connection<'a> {
    db: &'a Database,
    txn: Option<Transaction>,
}

impl<'a> Connection<'a> {
    pub fn begin_read(&mut self) -> Result<()> {
        self.txn = Some(self.db.txn_manager.begin_read());
        Ok(())
    }

    pub fn begin_write(&mut self) -> Result<()> {
        self.txn = Some(self.db.txn_manager.begin_write()?);
        Ok(())
    }

    fn take_txn(&mut self) -> Result<Transaction> {
        self.txn
            .take()
            .ok_or_else(|| DbError::Transaction("no active transaction on this connection".into()))
    }

    pub fn commit(&mut self) -> Result<()> {
        let txn = self.take_txn()?;
        self.db.txn_manager.commit(txn, &self.db.buffer, false)
    }

    pub fn commit_skip_checkpoint(&mut self) -> Result<()> {
        let txn = self.take_txn()?;
        self.db.txn_manager.commit(txn, &self.db.buffer, true)
    }

    pub fn rollback(&mut self) -> Result<()> {
        let txn = self.take_txn()?;
        self.db.txn_manager.rollback(txn, &self.db.buffer)
    }

    /// Rollback that skips the normal post-rollback checkpoint pass; the
    /// storage layer's rollback has no separate checkpoint step today (it
    /// just discards shadow pages), so this is currently equivalent to
    /// `rollback` — kept as a distinct method so callers coded against
    /// the full action set (spec §4.1) don't need a special case.
    pub fn rollback_skip_checkpoint(&mut self) -> Result<()> {
        self.rollback()
    }

    pub fn mode(&self) -> Option<TransactionMode> {
        self.txn.as_ref().map(|t| t.mode)
    }

    /// Executes a prepared statement and returns its result. The real
    /// implementation requires a binder and logical planner, both out of
    /// scope for this crate (spec §1); callers embedding this core supply
    /// their own statement execution on top of the storage/exec APIs in
    /// `storage`, `index`, and `exec` directly.
    pub fn execute_statement(&mut self, _prepared_statement: &str) -> Result<QueryResult> {
        Err(DbError::NotImplemented(
            "execute_statement requires a binder/planner, which are collaborators out of this crate's scope".into(),
        ))
    }
}

/// Query result surface consumed by the embedding API (spec §6). Carries
/// the compiling/execution timings and plan text a profiled query
/// reports, plus a human-readable failure message on the error path
/// (spec §7: "no exception escapes the embedding API").
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub column_names: Vec<String>,
    pub column_types: Vec<common::LogicalType>,
    pub rows: Vec<Vec<i64>>,
    pub is_success: bool,
    pub error_message: Option<String>,
    pub compiling_time_sec: f64,
    pub execution_time_sec: f64,
    pub is_profile: bool,
    pub plan_text: String,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            column_names: Vec::new(),
            column_types: Vec::new(),
            rows: Vec::new(),
            is_success: true,
            error_message: None,
            compiling_time_sec: 0.0,
            execution_time_sec: 0.0,
            is_profile: false,
            plan_text: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            error_message: Some(message.into()),
            ..Self::empty()
        }
    }
}

/// Timer helper mirroring how the teacher's executor stamps
/// `compilingTimeSec`/`executionTimeSec` on a `QueryResult`.
pub struct StageTimer(Instant);

impl StageTimer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed_sec(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

/// Binds a call's argument logical types to its result logical type,
/// erroring if the call site doesn't match any overload this function
/// supports.
pub type ScalarBindFn = fn(&[common::LogicalType]) -> Result<common::LogicalType>;

/// Evaluates one scalar function call over its already-bound argument
/// vectors, writing one value per selected row into `out`.
pub type ScalarExecFn = fn(&[&ValueVector], &mut ValueVector);

/// A scalar function descriptor, the dispatch contract the planner
/// consumes from the execution core (spec §6's `{name,
/// paramPhysicalTypes, resultLogicalType, execFn, bindFn}`). `exec_fn`/
/// `bind_fn` are represented as plain function pointers rather than trait
/// objects, since every registration is known at startup (spec §9's
/// tagged dispatch preference over virtual dispatch).
pub struct ScalarFunctionDescriptor {
    pub name: &'static str,
    pub param_physical_types: Vec<common::PhysicalTypeId>,
    pub result_logical_type: common::LogicalType,
    pub exec_fn: ScalarExecFn,
    pub bind_fn: ScalarBindFn,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn connect_creates_data_dir_and_recovers_cleanly_on_empty_wal() {
        let dir = tempdir().unwrap();
        let db = Database::connect(dir.path().join("db1")).unwrap();
        let mut conn = db.connection();
        conn.begin_write().unwrap();
        conn.commit().unwrap();
    }

    #[test]
    fn only_one_write_transaction_across_connections() {
        let dir = tempdir().unwrap();
        let db = Database::connect(dir.path()).unwrap();
        let mut conn_a = db.connection();
        let mut conn_b = db.connection();
        conn_a.begin_write().unwrap();
        assert!(conn_b.begin_write().is_err());
        conn_a.commit().unwrap();
        assert!(conn_b.begin_write().is_ok());
    }

    #[test]
    fn committing_without_a_transaction_is_an_error() {
        let dir = tempdir().unwrap();
        let db = Database::connect(dir.path()).unwrap();
        let mut conn = db.connection();
        assert!(conn.commit().is_err());
    }

    #[test]
    fn execute_statement_reports_not_implemented_without_a_planner() {
        let dir = tempdir().unwrap();
        let db = Database::connect(dir.path()).unwrap();
        let mut conn = db.connection();
        let err = conn.execute_statement("MATCH (n) RETURN n").unwrap_err();
        assert!(matches!(err, DbError::NotImplemented(_)));
    }
}
