//! Write-ahead log and recovery (spec §4.1, §4.4, §8 invariant 8).
//!
//! Grounded on the teacher's `transaction::wal::LogRecord` (tagged enum of
//! record kinds, `Commit`/`Abort` framing, CRC-checked frames) narrowed to
//! the kind list spec §4.1 actually names, and generalized from ARIES
//! before/after images to the page-shadowing scheme spec §4.1 describes:
//! a write transaction's page mutations live in shadow pages until commit,
//! and `pin()` routes reads to the shadow image for the writer's own
//! transaction (§5's snapshot isolation).
//!
//! At most one write transaction exists system-wide (§5), so the WAL only
//! ever tracks the *current* writer's uncommitted shadow mapping; there is
//! no need to key records by transaction id beyond the `Commit` marker.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::catalog::StorageStructureId;
use crate::common::{PageIdx, PAGE_SIZE};
use crate::error::{DbError, Result};
use crate::storage::disk::FileHandle;

pub type TransactionId = u64;

/// WAL record kinds, per spec §4.1's taxonomy. Byte layout is not
/// compatibility-fixed (only the 1-byte kind tag + length-prefixed body is,
/// per spec §6), so this is encoded with bincode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalRecord {
    PageUpdateOrInsert {
        sid: StorageStructureId,
        original_page_idx: PageIdx,
        wal_page_idx: PageIdx,
    },
    Commit {
        txn_id: TransactionId,
    },
    Catalog,
    NodeTable {
        table_id: u32,
    },
    RelTable {
        table_id: u32,
    },
    OverflowNextBytePos {
        sid: StorageStructureId,
        prev_page_idx: PageIdx,
        prev_offset: u32,
    },
    CopyNode {
        table_id: u32,
    },
    CopyRel {
        table_id: u32,
    },
    TableStatistics {
        is_node: bool,
    },
    DropTable {
        is_node: bool,
        table_id: u32,
    },
}

/// Routes reads through shadow pages created by the current write
/// transaction, and drives commit/rollback/checkpoint (spec §4.1).
pub struct WriteAheadLog {
    record_log: FileHandle,
    shadow_pages: FileHandle,
    next_shadow_idx: AtomicU32,
    /// (structure, original page) -> shadow page, for the in-flight writer.
    page_mapping: RwLock<HashMap<(StorageStructureId, PageIdx), PageIdx>>,
    /// First-write-wins cursor snapshot per structure, used to roll back
    /// overflow-file appends (spec §4.4).
    overflow_snapshots: RwLock<HashMap<StorageStructureId, (PageIdx, u32)>>,
}

impl WriteAheadLog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            record_log: FileHandle::open(dir.join("wal.log"))?,
            shadow_pages: FileHandle::open(dir.join("wal.shadow"))?,
            next_shadow_idx: AtomicU32::new(0),
            page_mapping: RwLock::new(HashMap::new()),
            overflow_snapshots: RwLock::new(HashMap::new()),
        })
    }

    fn append_record(&self, record: &WalRecord) -> Result<()> {
        let body = bincode::serde::encode_to_vec(record, bincode::config::standard())?;
        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);
        // The record log is a flat byte stream, not page-granular; we still
        // route it through FileHandle's page primitives by writing whole
        // pages at a time via a simple append buffer on disk.
        append_bytes(&self.record_log, &framed)
    }

    /// Equivalent of `createWALVersion`: allocate a fresh shadow page for
    /// `(sid, original_page_idx)` if one doesn't already exist for this
    /// writer, recording the mapping in the WAL before returning it.
    pub fn create_wal_version(
        &self,
        sid: StorageStructureId,
        original_page_idx: PageIdx,
        current_bytes: &[u8; PAGE_SIZE],
    ) -> Result<PageIdx> {
        let key = (sid, original_page_idx);
        if let Some(&existing) = self.page_mapping.read().unwrap().get(&key) {
            return Ok(existing);
        }
        let shadow_idx = self.next_shadow_idx.fetch_add(1, Ordering::SeqCst);
        self.shadow_pages.write_page(shadow_idx, current_bytes)?;
        self.append_record(&WalRecord::PageUpdateOrInsert {
            sid,
            original_page_idx,
            wal_page_idx: shadow_idx,
        })?;
        self.page_mapping.write().unwrap().insert(key, shadow_idx);
        Ok(shadow_idx)
    }

    /// Returns the shadow page backing `(sid, page_idx)` if the current
    /// writer has already created a WAL version of it (§4.1 `pin`).
    pub fn lookup_wal_version(&self, sid: StorageStructureId, page_idx: PageIdx) -> Option<PageIdx> {
        self.page_mapping
            .read()
            .unwrap()
            .get(&(sid, page_idx))
            .copied()
    }

    pub fn read_shadow(&self, idx: PageIdx) -> Result<[u8; PAGE_SIZE]> {
        self.shadow_pages.read_page(idx)
    }

    pub fn write_shadow(&self, idx: PageIdx, bytes: &[u8; PAGE_SIZE]) -> Result<()> {
        self.shadow_pages.write_page(idx, bytes)
    }

    /// Records the pre-write cursor for an overflow file so rollback can
    /// restore it (spec §4.4). Only the first call per structure per
    /// transaction is kept (first-write-wins).
    pub fn record_overflow_next_byte_pos(
        &self,
        sid: StorageStructureId,
        prev_page_idx: PageIdx,
        prev_offset: u32,
    ) -> Result<()> {
        let mut snapshots = self.overflow_snapshots.write().unwrap();
        if snapshots.contains_key(&sid) {
            return Ok(());
        }
        self.append_record(&WalRecord::OverflowNextBytePos {
            sid,
            prev_page_idx,
            prev_offset,
        })?;
        snapshots.insert(sid, (prev_page_idx, prev_offset));
        Ok(())
    }

    pub fn overflow_rollback_cursor(&self, sid: StorageStructureId) -> Option<(PageIdx, u32)> {
        self.overflow_snapshots.read().unwrap().get(&sid).copied()
    }

    /// Applies every shadowed page to its base file via `apply`, fsyncs,
    /// then clears WAL state. `apply` receives `(sid, original_page_idx,
    /// bytes)` and is responsible for writing to the right base file.
    pub fn commit(
        &self,
        txn_id: TransactionId,
        skip_checkpoint: bool,
        mut apply: impl FnMut(StorageStructureId, PageIdx, &[u8; PAGE_SIZE]) -> Result<()>,
    ) -> Result<()> {
        tracing::debug!(txn_id, skip_checkpoint, "committing write transaction");
        self.append_record(&WalRecord::Commit { txn_id })?;
        if skip_checkpoint {
            return Ok(());
        }
        self.checkpoint(&mut apply)
    }

    fn checkpoint(
        &self,
        apply: &mut impl FnMut(StorageStructureId, PageIdx, &[u8; PAGE_SIZE]) -> Result<()>,
    ) -> Result<()> {
        let mapping = self.page_mapping.read().unwrap().clone();
        for ((sid, original_idx), shadow_idx) in mapping {
            let bytes = self.shadow_pages.read_page(shadow_idx)?;
            apply(sid, original_idx, &bytes)?;
        }
        self.clear()
    }

    /// Discards WAL pages for the current writer without applying them;
    /// the caller is expected to have already restored overflow cursors
    /// via `overflow_rollback_cursor` before calling this.
    pub fn rollback(&self) -> Result<()> {
        tracing::debug!("rolling back write transaction, discarding shadow pages");
        self.clear()
    }

    fn clear(&self) -> Result<()> {
        self.page_mapping.write().unwrap().clear();
        self.overflow_snapshots.write().unwrap().clear();
        self.next_shadow_idx.store(0, Ordering::SeqCst);
        self.shadow_pages.truncate(0)?;
        self.record_log.truncate(0)?;
        Ok(())
    }

    /// Replays the record log forward at database-open time: every
    /// page-update record belonging to a prefix that ends in `Commit` is
    /// reapplied to base files; anything after the last `Commit` (a torn
    /// write) is discarded. Implements spec §8 invariant 8.
    pub fn recover(
        &self,
        mut apply: impl FnMut(StorageStructureId, PageIdx, &[u8; PAGE_SIZE]) -> Result<()>,
    ) -> Result<()> {
        let records = read_framed_records(&self.record_log)?;
        let mut pending: HashMap<(StorageStructureId, PageIdx), PageIdx> = HashMap::new();
        let mut committed: Vec<((StorageStructureId, PageIdx), PageIdx)> = Vec::new();
        for record in records {
            match record {
                WalRecord::PageUpdateOrInsert {
                    sid,
                    original_page_idx,
                    wal_page_idx,
                } => {
                    pending.insert((sid, original_page_idx), wal_page_idx);
                }
                WalRecord::Commit { .. } => {
                    committed.extend(pending.drain());
                }
                _ => {}
            }
        }
        if !committed.is_empty() {
            tracing::info!(pages = committed.len(), "replaying committed WAL records at open");
        }
        for ((sid, original_idx), shadow_idx) in committed {
            let bytes = self.shadow_pages.read_page(shadow_idx)?;
            apply(sid, original_idx, &bytes)?;
        }
        self.clear()
    }
}

fn append_bytes(handle: &FileHandle, bytes: &[u8]) -> Result<()> {
    // The record log is treated as an unstructured byte stream; we grow it
    // page-at-a-time but allow records to span page boundaries by tracking
    // the logical length via the file's current size.
    let cur_len = handle.num_pages()? * PAGE_SIZE as u64;
    let mut offset = 0usize;
    let mut page_idx = (cur_len / PAGE_SIZE as u64) as PageIdx;
    let mut within = (cur_len % PAGE_SIZE as u64) as usize;
    while offset < bytes.len() {
        let mut page = handle.read_page(page_idx)?;
        let n = (PAGE_SIZE - within).min(bytes.len() - offset);
        page[within..within + n].copy_from_slice(&bytes[offset..offset + n]);
        handle.write_page(page_idx, &page)?;
        offset += n;
        within += n;
        if within == PAGE_SIZE {
            within = 0;
            page_idx += 1;
        }
    }
    handle.sync()
}

fn read_framed_records(handle: &FileHandle) -> Result<Vec<WalRecord>> {
    let total_len = handle.num_pages()? * PAGE_SIZE as u64;
    let mut all_bytes = Vec::with_capacity(total_len as usize);
    for idx in 0..handle.num_pages()? as PageIdx {
        all_bytes.extend_from_slice(&handle.read_page(idx)?);
    }
    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos + 4 <= all_bytes.len() {
        let len = u32::from_le_bytes(all_bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if len == 0 || pos + len > all_bytes.len() {
            break;
        }
        let (record, _): (WalRecord, usize) =
            bincode::serde::decode_from_slice(&all_bytes[pos..pos + len], bincode::config::standard())
                .map_err(|e| DbError::Corruption(format!("WAL decode failed: {e}")))?;
        records.push(record);
        pos += len;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sid() -> StorageStructureId {
        StorageStructureId::Column {
            table_id: 1,
            column_id: 0,
        }
    }

    #[test]
    fn crash_before_commit_leaves_pre_txn_state() {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(dir.path()).unwrap();
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 7;
        wal.create_wal_version(sid(), 0, &page).unwrap();
        // Simulate a crash: reopen without ever calling commit.
        drop(wal);
        let wal2 = WriteAheadLog::open(dir.path()).unwrap();
        let mut applied = false;
        wal2.recover(|_, _, _| {
            applied = true;
            Ok(())
        })
        .unwrap();
        assert!(!applied, "uncommitted page update must not be replayed");
    }

    #[test]
    fn crash_after_commit_yields_post_txn_state() {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(dir.path()).unwrap();
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 7;
        wal.create_wal_version(sid(), 0, &page).unwrap();
        wal.append_record(&WalRecord::Commit { txn_id: 1 }).unwrap();
        drop(wal);
        let wal2 = WriteAheadLog::open(dir.path()).unwrap();
        let mut applied_bytes = None;
        wal2.recover(|_, _, bytes| {
            applied_bytes = Some(bytes[0]);
            Ok(())
        })
        .unwrap();
        assert_eq!(applied_bytes, Some(7));
    }

    #[test]
    fn commit_applies_and_clears_mapping() {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(dir.path()).unwrap();
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 9;
        wal.create_wal_version(sid(), 3, &page).unwrap();
        let mut seen = Vec::new();
        wal.commit(1, false, |s, idx, bytes| {
            seen.push((s, idx, bytes[0]));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(sid(), 3, 9)]);
        assert!(wal.lookup_wal_version(sid(), 3).is_none());
    }
}
