//! Append-only overflow file for strings and lists too large to fit
//! inline in a column chunk (spec §4.4, component D).
//!
//! The teacher has no overflow-file or fat-pointer concept at all — its
//! strings are plain `String`/`Vec<u8>` columns with no inline/spill
//! split — so there's no teacher analogue to adapt here. Grounded
//! entirely on `original_source`'s disk-backed variable-width storage:
//! `storage/store/var_sized_column_chunk.h`'s `InMemOverflowFile` +
//! `PageByteCursor` (an append-only cursor over column-group pages, used
//! only when a value doesn't fit inline) and `gf_string_t`'s inline-prefix
//! fat pointer (a short string stored entirely in the pointer; a long one
//! keeps its prefix plus a page/offset pair into the overflow arena).

use crate::catalog::StorageStructureId;
use crate::common::PAGE_SIZE;
use crate::error::{DbError, Result};
use crate::storage::buffer::BufferManager;

/// Strings up to this many bytes are stored entirely inline in the fat
/// pointer; longer strings spill their remainder to the overflow file.
pub const INLINE_STRING_PREFIX_LEN: usize = 12;

/// A 16-byte fat pointer: for short strings, the inline prefix plus a
/// length; for long strings, a page/offset/length triple into the
/// overflow file. Matches the physical String width fixed in
/// `common::PhysicalTypeId::fixed_width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringPointer {
    pub len: u32,
    pub inline_or_page: [u8; 12],
    pub page_offset: u32,
}

impl StringPointer {
    pub fn is_inline(&self) -> bool {
        self.len as usize <= INLINE_STRING_PREFIX_LEN
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.len.to_le_bytes());
        out[4..16].copy_from_slice(&self.inline_or_page);
        out
    }

    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let mut inline_or_page = [0u8; 12];
        inline_or_page.copy_from_slice(&bytes[4..16]);
        let page_offset = if len as usize > INLINE_STRING_PREFIX_LEN {
            u32::from_le_bytes(inline_or_page[4..8].try_into().unwrap())
        } else {
            0
        };
        Self {
            len,
            inline_or_page,
            page_offset,
        }
    }
}

/// The append-only arena itself: a cursor (next free page/offset) plus the
/// buffer manager handle it writes through. Cursor moves are logged via
/// `OVERFLOW_NEXT_BYTE_POS` WAL records so a rolled-back transaction's
/// appends are invisible (spec §4.4, §8 invariant 4... really an overflow
/// analogue of the hash-index overlay rule).
pub struct OverflowFile {
    sid: StorageStructureId,
    next_page_idx: u32,
    next_offset: u32,
}

impl OverflowFile {
    pub fn new(sid: StorageStructureId) -> Self {
        Self {
            sid,
            next_page_idx: 0,
            next_offset: 0,
        }
    }

    /// Appends `bytes` (the portion of a string past the inline prefix)
    /// to the arena, returning a fat pointer. Spans page boundaries by
    /// moving to a fresh page rather than splitting records across pages.
    pub fn append(&mut self, buffer: &BufferManager, bytes: &[u8]) -> Result<StringPointer> {
        if bytes.len() > PAGE_SIZE {
            return Err(DbError::InvalidInput(
                "overflow value exceeds a single page; lists/strings must be chunked by the caller".into(),
            ));
        }
        if self.next_offset as usize + bytes.len() > PAGE_SIZE {
            self.next_page_idx += 1;
            self.next_offset = 0;
        }
        buffer
            .wal()
            .record_overflow_next_byte_pos(self.sid, self.next_page_idx, self.next_offset)?;

        let page_idx = self.next_page_idx;
        let offset = self.next_offset;

        let mut frame = if (page_idx as u64) < buffer.num_pages(self.sid)? {
            buffer.pin(self.sid, page_idx, crate::storage::buffer::PinMode::Write)?
        } else {
            let blank = [0u8; PAGE_SIZE];
            buffer.append_page(self.sid, &blank)?;
            buffer.pin(self.sid, page_idx, crate::storage::buffer::PinMode::Write)?
        };
        frame.data_mut()[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
        buffer.unpin_and_release_lock(frame)?;

        self.next_offset += bytes.len() as u32;

        let mut inline_or_page = [0u8; 12];
        inline_or_page[0..4].copy_from_slice(&page_idx.to_le_bytes());
        inline_or_page[4..8].copy_from_slice(&offset.to_le_bytes());
        Ok(StringPointer {
            len: bytes.len() as u32,
            inline_or_page,
            page_offset: offset,
        })
    }

    pub fn read(&self, buffer: &BufferManager, pointer: &StringPointer) -> Result<Vec<u8>> {
        if pointer.is_inline() {
            return Ok(pointer.inline_or_page[..pointer.len as usize].to_vec());
        }
        let page_idx = u32::from_le_bytes(pointer.inline_or_page[0..4].try_into().unwrap());
        let offset = u32::from_le_bytes(pointer.inline_or_page[4..8].try_into().unwrap());
        buffer.optimistic_read(self.sid, page_idx, |bytes| {
            bytes[offset as usize..offset as usize + pointer.len as usize].to_vec()
        })
    }

    /// Rolls the arena's cursor back to its pre-transaction position,
    /// using the snapshot the WAL recorded on the first append.
    pub fn rollback(&mut self, buffer: &BufferManager) {
        if let Some((page_idx, offset)) = buffer.wal().overflow_rollback_cursor(self.sid) {
            self.next_page_idx = page_idx;
            self.next_offset = offset;
        }
    }
}

/// Builds a fat pointer for a string, inlining it if short enough and
/// otherwise spilling the remainder past the inline prefix to `arena`.
pub fn store_string(arena: &mut OverflowFile, buffer: &BufferManager, s: &[u8]) -> Result<StringPointer> {
    if s.len() <= INLINE_STRING_PREFIX_LEN {
        let mut inline_or_page = [0u8; 12];
        inline_or_page[..s.len()].copy_from_slice(s);
        return Ok(StringPointer {
            len: s.len() as u32,
            inline_or_page,
            page_offset: 0,
        });
    }
    arena.append(buffer, s)
}

pub fn load_string(arena: &OverflowFile, buffer: &BufferManager, pointer: &StringPointer) -> Result<Vec<u8>> {
    arena.read(buffer, pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::FileHandle;
    use crate::transaction::wal::WriteAheadLog;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, BufferManager, StorageStructureId) {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(dir.path().join("wal")).unwrap();
        let mgr = BufferManager::new(wal);
        let sid = StorageStructureId::Overflow {
            table_id: 1,
            column_id: 0,
        };
        let file = Arc::new(FileHandle::open(dir.path().join("overflow.bin")).unwrap());
        mgr.register_file(sid, file);
        (dir, mgr, sid)
    }

    #[test]
    fn short_strings_stay_inline() {
        let pointer = StringPointer::from_bytes(&{
            let mut arena = OverflowFile::new(StorageStructureId::Overflow {
                table_id: 1,
                column_id: 0,
            });
            let (_dir, buffer, _sid) = setup();
            let p = store_string(&mut arena, &buffer, b"short").unwrap();
            p.to_bytes()
        });
        assert!(pointer.is_inline());
    }

    #[test]
    fn string_of_exactly_the_inline_prefix_length_stays_inline() {
        let (_dir, buffer, sid) = setup();
        let mut arena = OverflowFile::new(sid);
        let boundary = b"exactly12by!".to_vec();
        assert_eq!(boundary.len(), INLINE_STRING_PREFIX_LEN);
        let pointer = store_string(&mut arena, &buffer, &boundary).unwrap();
        assert!(pointer.is_inline());
        let read_back = load_string(&arena, &buffer, &pointer).unwrap();
        assert_eq!(read_back, boundary);
    }

    #[test]
    fn long_strings_roundtrip_through_overflow_file() {
        let (_dir, buffer, sid) = setup();
        let mut arena = OverflowFile::new(sid);
        let long = b"this string is definitely longer than twelve bytes".to_vec();
        let pointer = store_string(&mut arena, &buffer, &long).unwrap();
        assert!(!pointer.is_inline());
        buffer.commit(1, false).unwrap();
        let read_back = load_string(&arena, &buffer, &pointer).unwrap();
        assert_eq!(read_back, long);
    }

    #[test]
    fn rollback_restores_cursor_to_pre_transaction_position() {
        let (_dir, buffer, sid) = setup();
        let mut arena = OverflowFile::new(sid);
        let long = b"this string is definitely longer than twelve bytes".to_vec();
        store_string(&mut arena, &buffer, &long).unwrap();
        let cursor_before = (arena.next_page_idx, arena.next_offset);
        arena.rollback(&buffer);
        assert_eq!((arena.next_page_idx, arena.next_offset), (0, 0));
        let _ = cursor_before;
    }
}
