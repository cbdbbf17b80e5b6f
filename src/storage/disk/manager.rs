use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use log::debug;

use crate::storage::page::page::{page_constants::PAGE_SIZE, PageId};

/// Synchronous page-granular access to a single database file.
///
/// The file is a flat array of `PAGE_SIZE` byte pages; page `p` lives at
/// offset `p * PAGE_SIZE`. Page 0 is reserved by convention for manager
/// metadata; the layers above treat it like any other page id they never
/// allocate themselves.
pub struct DiskManager {
    db_io: File,
    db_file_name: PathBuf,

    // Ids handed back through deallocate_page. Advisory only; the file is
    // never shrunk.
    free_pages: VecDeque<PageId>,

    num_writes: u32,
    num_flushes: u32,
    num_deletes: u32,
}

impl DiskManager {
    /// Opens the page file at `path`, creating it if missing. Reopening an
    /// existing file sees every previously flushed page.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db_io = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("opening page file {}", path.display()))?;

        Ok(DiskManager {
            db_io,
            db_file_name: path.to_path_buf(),
            free_pages: VecDeque::new(),
            num_writes: 0,
            num_flushes: 0,
            num_deletes: 0,
        })
    }

    pub fn write_page(&mut self, page_id: PageId, page_data: &[u8]) -> Result<()> {
        let offset = Self::page_offset(page_id)?;

        if page_data.len() != PAGE_SIZE {
            bail!(
                "write of {} bytes to page {} (expected {})",
                page_data.len(),
                page_id,
                PAGE_SIZE
            );
        }

        self.db_io
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seeking page {}", page_id))?;
        self.db_io
            .write_all(page_data)
            .with_context(|| format!("writing page {}", page_id))?;
        self.db_io
            .flush()
            .with_context(|| format!("flushing page {}", page_id))?;

        self.num_writes += 1;
        self.num_flushes += 1;
        Ok(())
    }

    /// Fills `page_data` with the page's contents. A page past the end of
    /// the file, or one never written, reads as zeros.
    pub fn read_page(&mut self, page_id: PageId, page_data: &mut [u8]) -> Result<()> {
        let offset = Self::page_offset(page_id)?;

        if page_data.len() != PAGE_SIZE {
            bail!(
                "read of {} bytes from page {} (expected {})",
                page_data.len(),
                page_id,
                PAGE_SIZE
            );
        }

        let file_len = self
            .db_io
            .metadata()
            .context("reading page file metadata")?
            .len();

        if offset >= file_len {
            page_data.fill(0);
            return Ok(());
        }

        self.db_io
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seeking page {}", page_id))?;

        // A partially written tail page yields a short read; the remainder
        // is zeros.
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = self
                .db_io
                .read(&mut page_data[filled..])
                .with_context(|| format!("reading page {}", page_id))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        page_data[filled..].fill(0);

        Ok(())
    }

    /// Marks `page_id` reusable. Advisory: the pages above allocate ids
    /// monotonically and only consult this list for statistics.
    pub fn deallocate_page(&mut self, page_id: PageId) {
        debug!("deallocating page {}", page_id);
        self.free_pages.push_back(page_id);
        self.num_deletes += 1;
    }

    /// Number of pages the file currently covers. A partially written tail
    /// page counts as a whole page.
    pub fn capacity_pages(&self) -> PageId {
        let file_len = self.db_io.metadata().map(|meta| meta.len()).unwrap_or(0);
        file_len.div_ceil(PAGE_SIZE as u64) as PageId
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes
    }

    pub fn num_flushes(&self) -> u32 {
        self.num_flushes
    }

    pub fn num_deletes(&self) -> u32 {
        self.num_deletes
    }

    /// Ids released through `deallocate_page`, oldest first.
    pub fn deallocated_pages(&self) -> impl Iterator<Item = PageId> + '_ {
        self.free_pages.iter().copied()
    }

    pub fn file_name(&self) -> &Path {
        &self.db_file_name
    }

    fn page_offset(page_id: PageId) -> Result<u64> {
        if page_id < 0 {
            bail!("invalid page id {}", page_id);
        }
        Ok(page_id as u64 * PAGE_SIZE as u64)
    }
}

#[cfg(test)]
pub mod test {
    use tempfile::TempDir;

    use super::DiskManager;
    use crate::storage::page::page::page_constants::PAGE_SIZE;

    #[test]
    fn db_io_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut manager = DiskManager::new(dir.path().join("base.db")).unwrap();

        let data = [7u8; PAGE_SIZE];
        let mut buffer = [0u8; PAGE_SIZE];

        manager.write_page(3, &data).unwrap();
        manager.read_page(3, &mut buffer).unwrap();
        assert_eq!(data, buffer, "page read mismatch");

        // Hole between written pages reads as zeros.
        manager.read_page(1, &mut buffer).unwrap();
        assert_eq!([0u8; PAGE_SIZE], buffer);

        // Past end of file reads as zeros.
        manager.read_page(64, &mut buffer).unwrap();
        assert_eq!([0u8; PAGE_SIZE], buffer);
    }

    #[test]
    fn reopen_preserves_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.db");

        let data = [42u8; PAGE_SIZE];
        {
            let mut manager = DiskManager::new(&path).unwrap();
            manager.write_page(0, &data).unwrap();
        }

        let mut reopened = DiskManager::new(&path).unwrap();
        let mut buffer = [0u8; PAGE_SIZE];
        reopened.read_page(0, &mut buffer).unwrap();
        assert_eq!(data, buffer);
    }

    #[test]
    fn rejects_negative_page_id() {
        let dir = TempDir::new().unwrap();
        let mut manager = DiskManager::new(dir.path().join("base.db")).unwrap();

        let mut buffer = [0u8; PAGE_SIZE];
        assert!(manager.read_page(-1, &mut buffer).is_err());
        assert!(manager.write_page(-1, &buffer).is_err());
    }

    #[test]
    fn deallocation_is_advisory() {
        let dir = TempDir::new().unwrap();
        let mut manager = DiskManager::new(dir.path().join("base.db")).unwrap();

        let data = [3u8; PAGE_SIZE];
        manager.write_page(2, &data).unwrap();
        manager.deallocate_page(2);

        assert_eq!(1, manager.num_deletes());
        assert_eq!(vec![2], manager.deallocated_pages().collect::<Vec<_>>());

        // The bytes stay readable; deallocation only marks the id.
        let mut buffer = [0u8; PAGE_SIZE];
        manager.read_page(2, &mut buffer).unwrap();
        assert_eq!(data, buffer);
    }
}
