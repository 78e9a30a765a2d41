//! Per-file page I/O. One `FileHandle` owns one on-disk file (a column's
//! data file, an overflow file, a hash-index file, or the WAL file) and
//! exposes page-granular reads/writes. Grounded on the teacher's
//! `storage::disk::DiskManager` (page-indexed file access over
//! `std::fs::File`), narrowed to the page-cache's needs.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::common::{PageIdx, PAGE_SIZE};
use crate::error::{DbError, Result};

pub struct FileHandle {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of whole pages currently in the file.
    pub fn num_pages(&self) -> Result<u64> {
        let file = self.file.lock().unwrap();
        Ok(file.metadata()?.len() / PAGE_SIZE as u64)
    }

    pub fn read_page(&self, idx: PageIdx) -> Result<[u8; PAGE_SIZE]> {
        let mut buf = [0u8; PAGE_SIZE];
        let mut file = self.file.lock().unwrap();
        let offset = idx as u64 * PAGE_SIZE as u64;
        let len = file.metadata()?.len();
        if offset >= len {
            // Reading an unwritten page returns zeros, matching a
            // freshly-allocated page (spec §3's invariant only constrains
            // dirty pages, not sparse reads of never-written ones).
            return Ok(buf);
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf).map_err(DbError::Io)?;
        Ok(buf)
    }

    pub fn write_page(&self, idx: PageIdx, bytes: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(idx as u64 * PAGE_SIZE as u64))?;
        file.write_all(bytes)?;
        Ok(())
    }

    pub fn append_page(&self, bytes: &[u8; PAGE_SIZE]) -> Result<PageIdx> {
        let next = self.num_pages()? as PageIdx;
        self.write_page(next, bytes)?;
        Ok(next)
    }

    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock().unwrap();
        file.sync_data()?;
        Ok(())
    }

    pub fn truncate(&self, num_pages: u64) -> Result<()> {
        let file = self.file.lock().unwrap();
        file.set_len(num_pages * PAGE_SIZE as u64)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_roundtrip() {
        let dir = tempdir().unwrap();
        let handle = FileHandle::open(dir.path().join("data.bin")).unwrap();
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 42;
        let idx = handle.append_page(&page).unwrap();
        assert_eq!(idx, 0);
        let read_back = handle.read_page(idx).unwrap();
        assert_eq!(read_back[0], 42);
    }

    #[test]
    fn unwritten_page_reads_as_zero() {
        let dir = tempdir().unwrap();
        let handle = FileHandle::open(dir.path().join("data.bin")).unwrap();
        let page = handle.read_page(5).unwrap();
        assert!(page.iter().all(|&b| b == 0));
    }
}
