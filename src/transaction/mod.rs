//! Transaction lifecycle: begin/commit/rollback actions over the WAL and
//! buffer manager (spec §4.1, §5). Grounded on the teacher's
//! `transaction::manager::TransactionManager` (single-writer enforcement
//! via a mutex-guarded "active writer" slot, monotonic transaction ids).

pub mod wal;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{DbError, Result};
use crate::storage::buffer::BufferManager;
use wal::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    Read,
    Write,
}

pub struct Transaction {
    pub id: TransactionId,
    pub mode: TransactionMode,
}

/// Enforces spec §5's "at most one write transaction system-wide" rule and
/// assigns monotonically increasing transaction ids.
pub struct TransactionManager {
    next_id: AtomicU64,
    active_writer: Mutex<Option<TransactionId>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active_writer: Mutex::new(None),
        }
    }

    pub fn begin_read(&self) -> Transaction {
        Transaction {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            mode: TransactionMode::Read,
        }
    }

    pub fn begin_write(&self) -> Result<Transaction> {
        let mut active = self.active_writer.lock().unwrap();
        if let Some(existing) = *active {
            tracing::warn!(existing_txn_id = existing, "rejected concurrent write transaction");
            return Err(DbError::Transaction(
                "a write transaction is already active".into(),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        *active = Some(id);
        tracing::debug!(txn_id = id, "begin write transaction");
        Ok(Transaction {
            id,
            mode: TransactionMode::Write,
        })
    }

    pub fn commit(&self, txn: Transaction, buffer: &BufferManager, skip_checkpoint: bool) -> Result<()> {
        if txn.mode == TransactionMode::Write {
            buffer.commit(txn.id, skip_checkpoint)?;
            *self.active_writer.lock().unwrap() = None;
        }
        Ok(())
    }

    pub fn rollback(&self, txn: Transaction, buffer: &BufferManager) -> Result<()> {
        if txn.mode == TransactionMode::Write {
            buffer.rollback()?;
            *self.active_writer.lock().unwrap() = None;
        }
        Ok(())
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StorageStructureId;
    use crate::common::PAGE_SIZE;
    use crate::storage::disk::FileHandle;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn only_one_write_transaction_at_a_time() {
        let mgr = TransactionManager::new();
        let txn1 = mgr.begin_write().unwrap();
        assert!(mgr.begin_write().is_err());
        let dir = tempdir().unwrap();
        let wal = wal::WriteAheadLog::open(dir.path()).unwrap();
        let buffer = BufferManager::new(wal);
        mgr.commit(txn1, &buffer, false).unwrap();
        assert!(mgr.begin_write().is_ok());
    }

    #[test]
    fn read_transactions_do_not_contend() {
        let mgr = TransactionManager::new();
        let _a = mgr.begin_read();
        let _b = mgr.begin_read();
        assert!(mgr.begin_write().is_ok());
    }

    #[test]
    fn rollback_clears_writer_slot_and_discards_shadow() {
        let mgr = TransactionManager::new();
        let dir = tempdir().unwrap();
        let wal = wal::WriteAheadLog::open(dir.path().join("wal")).unwrap();
        let buffer = BufferManager::new(wal);
        let sid = StorageStructureId::Column {
            table_id: 1,
            column_id: 0,
        };
        let file = Arc::new(FileHandle::open(dir.path().join("col.bin")).unwrap());
        file.append_page(&[0u8; PAGE_SIZE]).unwrap();
        buffer.register_file(sid, file);

        let txn = mgr.begin_write().unwrap();
        let mut frame = buffer
            .pin(sid, 0, crate::storage::buffer::PinMode::Write)
            .unwrap();
        frame.data_mut()[0] = 5;
        buffer.unpin_and_release_lock(frame).unwrap();
        mgr.rollback(txn, &buffer).unwrap();

        assert!(mgr.begin_write().is_ok());
        assert_eq!(buffer.read_committed(sid, 0).unwrap()[0], 0);
    }
}
