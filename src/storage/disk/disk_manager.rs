//! The disk-manager contract (spec §6): raw page allocation and byte I/O,
//! plus the file-name → head-page directory that lets a [`HeapFile`] be
//! reopened by name.
//!
//! [`HeapFile`]: crate::storage::heap::heap_file::HeapFile

use crate::common::constants::PAGE_SIZE;
use crate::common::error::{Error, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// An opaque 32-bit disk-page identifier. Copy, plain-value semantics —
/// no `copyPageId`-style explicit-copy method, ordinary assignment suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub i32);

impl PageId {
    pub const INVALID: PageId = PageId(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Header page (page 0) layout, kept deliberately simple: there is no WAL,
/// so every mutation to allocator/free-list/name-directory state is synced
/// to disk immediately (`sync_header`).
struct Header {
    next_page_id: i32,
    free_list: Vec<i32>,
    name_directory: HashMap<String, i32>,
}

impl Header {
    fn new() -> Self {
        Header {
            // page 0 is reserved for the header itself.
            next_page_id: 1,
            free_list: Vec::new(),
            name_directory: HashMap::new(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        buf.extend_from_slice(&self.next_page_id.to_be_bytes());
        buf.extend_from_slice(&(self.free_list.len() as u32).to_be_bytes());
        for id in &self.free_list {
            buf.extend_from_slice(&id.to_be_bytes());
        }
        buf.extend_from_slice(&(self.name_directory.len() as u32).to_be_bytes());
        for (name, id) in &self.name_directory {
            let name_bytes = name.as_bytes();
            buf.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
            buf.extend_from_slice(name_bytes);
            buf.extend_from_slice(&id.to_be_bytes());
        }
        assert!(
            buf.len() <= PAGE_SIZE,
            "disk manager header overflowed one page; too many files/free ids"
        );
        buf.resize(PAGE_SIZE, 0);
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        let mut cursor = 0usize;
        let mut read_i32 = |buf: &[u8], cursor: &mut usize| {
            let v = i32::from_be_bytes(buf[*cursor..*cursor + 4].try_into().unwrap());
            *cursor += 4;
            v
        };
        let mut read_u32 = |buf: &[u8], cursor: &mut usize| {
            let v = u32::from_be_bytes(buf[*cursor..*cursor + 4].try_into().unwrap());
            *cursor += 4;
            v
        };

        let next_page_id = read_i32(buf, &mut cursor);
        let free_count = read_u32(buf, &mut cursor) as usize;
        let mut free_list = Vec::with_capacity(free_count);
        for _ in 0..free_count {
            free_list.push(read_i32(buf, &mut cursor));
        }
        let name_count = read_u32(buf, &mut cursor) as usize;
        let mut name_directory = HashMap::with_capacity(name_count);
        for _ in 0..name_count {
            let len = read_u32(buf, &mut cursor) as usize;
            let name = String::from_utf8_lossy(&buf[cursor..cursor + len]).into_owned();
            cursor += len;
            let id = read_i32(buf, &mut cursor);
            name_directory.insert(name, id);
        }

        Header {
            next_page_id,
            free_list,
            name_directory,
        }
    }
}

/// The disk manager: raw page allocation/deallocation and byte-level
/// read/write, plus the name directory. Owns one backing file.
#[derive(Debug)]
pub struct DiskManager {
    file: File,
    header: Header,
}

impl std::fmt::Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Header")
            .field("next_page_id", &self.next_page_id)
            .field("free_list_len", &self.free_list.len())
            .field("name_directory_len", &self.name_directory.len())
            .finish()
    }
}

impl DiskManager {
    /// Opens or creates the backing file, loading (or initializing) the
    /// header page.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let len = file.metadata()?.len();
        if len < PAGE_SIZE as u64 {
            let mut dm = DiskManager {
                file,
                header: Header::new(),
            };
            dm.sync_header()?;
            return Ok(dm);
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        let header = Header::from_bytes(&buf);

        Ok(DiskManager { file, header })
    }

    pub fn new_with_handle<P: AsRef<Path>>(path: P) -> Result<Arc<Mutex<Self>>> {
        Ok(Arc::new(Mutex::new(Self::new(path)?)))
    }

    fn page_offset(page_id: PageId) -> u64 {
        // page 0 is the header; user pages start at page 1.
        (page_id.0 as u64) * PAGE_SIZE as u64
    }

    fn sync_header(&mut self) -> Result<()> {
        let bytes = self.header.to_bytes();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Allocates a single new page id, preferring a reclaimed id from the
    /// free list over extending the file.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let id = if let Some(id) = self.header.free_list.pop() {
            id
        } else {
            let id = self.header.next_page_id;
            self.header.next_page_id += 1;
            id
        };
        self.write_raw(PageId(id), &[0u8; PAGE_SIZE])?;
        self.sync_header()?;
        log::trace!("disk_manager: allocated page {id}");
        Ok(PageId(id))
    }

    /// Allocates `n` contiguous pages, returning the first id. Free-list
    /// reclamation is only used for single-page requests (a reclaimed id is
    /// not guaranteed to have `n - 1` contiguous free neighbours), so runs
    /// always extend the file.
    pub fn allocate_run(&mut self, n: usize) -> Result<PageId> {
        if n == 1 {
            return self.allocate_page();
        }
        let first = self.header.next_page_id;
        for i in 0..n as i32 {
            self.write_raw(PageId(first + i), &[0u8; PAGE_SIZE])?;
        }
        self.header.next_page_id += n as i32;
        self.sync_header()?;
        log::trace!("disk_manager: allocated run of {n} pages starting at {first}");
        Ok(PageId(first))
    }

    pub fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        self.header.free_list.push(page_id.0);
        self.sync_header()?;
        log::trace!("disk_manager: deallocated page {page_id}");
        Ok(())
    }

    pub fn deallocate_run(&mut self, first: PageId, n: usize) -> Result<()> {
        for i in 0..n as i32 {
            self.header.free_list.push(first.0 + i);
        }
        self.sync_header()?;
        log::trace!("disk_manager: deallocated run of {n} pages starting at {first}");
        Ok(())
    }

    fn write_raw(&mut self, page_id: PageId, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_page(&mut self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<()> {
        self.write_raw(page_id, buf)?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn add_file_entry(&mut self, name: &str, page_id: PageId) -> Result<()> {
        if self.header.name_directory.contains_key(name) {
            return Err(Error::invalid_argument(format!(
                "file entry '{name}' already exists"
            )));
        }
        self.header.name_directory.insert(name.to_string(), page_id.0);
        self.sync_header()?;
        Ok(())
    }

    pub fn get_file_entry(&self, name: &str) -> Option<PageId> {
        self.header.name_directory.get(name).map(|&id| PageId(id))
    }

    pub fn delete_file_entry(&mut self, name: &str) -> Result<()> {
        self.header.name_directory.remove(name);
        self.sync_header()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn new_dm() -> (DiskManager, NamedTempFile) {
        let tmp = NamedTempFile::new().expect("create temp db file");
        let dm = DiskManager::new(tmp.path()).expect("open disk manager");
        (dm, tmp)
    }

    #[test]
    fn allocated_pages_round_trip_through_read_write() {
        let (mut dm, _tmp) = new_dm();
        let page_id = dm.allocate_page().unwrap();
        let mut bytes = [0u8; PAGE_SIZE];
        bytes[0] = 0xAB;
        bytes[PAGE_SIZE - 1] = 0xCD;
        dm.write_page(page_id, &bytes).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf, bytes);
    }

    #[test]
    fn allocate_run_returns_contiguous_ids() {
        let (mut dm, _tmp) = new_dm();
        let first = dm.allocate_run(3).unwrap();
        let next = dm.allocate_page().unwrap();
        assert_eq!(next.0, first.0 + 3);
    }

    #[test]
    fn deallocated_single_page_is_reused_before_extending_the_file() {
        let (mut dm, _tmp) = new_dm();
        let p1 = dm.allocate_page().unwrap();
        dm.deallocate_page(p1).unwrap();
        let p2 = dm.allocate_page().unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn name_directory_round_trips_across_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut dm = DiskManager::new(tmp.path()).unwrap();
            let page_id = dm.allocate_page().unwrap();
            dm.add_file_entry("t", page_id).unwrap();
        }
        let dm = DiskManager::new(tmp.path()).unwrap();
        assert_eq!(dm.get_file_entry("t"), Some(PageId(1)));
        assert_eq!(dm.get_file_entry("missing"), None);
    }

    #[test]
    fn adding_a_duplicate_name_entry_is_rejected() {
        let (mut dm, _tmp) = new_dm();
        let page_id = dm.allocate_page().unwrap();
        dm.add_file_entry("t", page_id).unwrap();
        assert!(dm.add_file_entry("t", page_id).is_err());
    }

    #[test]
    fn deleting_a_name_entry_removes_it() {
        let (mut dm, _tmp) = new_dm();
        let page_id = dm.allocate_page().unwrap();
        dm.add_file_entry("t", page_id).unwrap();
        dm.delete_file_entry("t").unwrap();
        assert_eq!(dm.get_file_entry("t"), None);
    }
}
