//! The heap-file record manager (spec §4.F): a named, unordered, growable
//! collection of variable-length records addressed by [`Rid`], layered on
//! top of the buffer pool and the directory-page/data-page chain. Grounded
//! in the teacher's `Table`/row-iterator split — here the directory chain
//! plays the role the teacher's fixed table-page list plays, generalized to
//! a growable chain of directory pages rather than a single known root.

use crate::common::constants::{SLOT_SIZE, UnpinMode};
use crate::common::error::{Error, Result};
use crate::storage::buffer::buffer_pool_manager::{BufferPoolManager, PinContents};
use crate::storage::buffer::frame::PageHandle;
use crate::storage::disk::disk_manager::{DiskManager, PageId};
use crate::storage::heap::rid::Rid;
use crate::storage::heap::scan::HeapScan;
use crate::storage::page::dir_page::{DirEntry, DirPageView};
use crate::storage::page::hf_page::HfPageView;
use std::sync::{Arc, Mutex};

/// A heap file. Cheap to construct repeatedly against the same name — the
/// first open creates the backing directory chain, later opens adopt the
/// existing `headId` from the disk manager's name directory.
#[derive(Debug)]
pub struct HeapFile {
    file_name: Option<String>,
    is_temp: bool,
    head_id: PageId,
    bpm: Arc<Mutex<BufferPoolManager>>,
    disk_manager: Arc<Mutex<DiskManager>>,
    deleted: bool,
}

impl HeapFile {
    /// Opens `name`, creating a fresh heap file if it is not already
    /// registered in the disk manager's name directory. `name = None`
    /// creates an anonymous, temporary file that deletes itself on drop.
    pub fn open(
        name: Option<&str>,
        bpm: Arc<Mutex<BufferPoolManager>>,
        disk_manager: Arc<Mutex<DiskManager>>,
    ) -> Result<Self> {
        let (file_name, is_temp, head_id) = match name {
            Some(n) => match disk_manager.lock().unwrap().get_file_entry(n) {
                Some(head_id) => (Some(n.to_string()), false, head_id),
                None => {
                    let head_id = Self::create_new_hf(&bpm)?;
                    disk_manager.lock().unwrap().add_file_entry(n, head_id)?;
                    (Some(n.to_string()), false, head_id)
                }
            },
            None => {
                let head_id = Self::create_new_hf(&bpm)?;
                (None, true, head_id)
            }
        };

        log::debug!(
            "heap_file: opened name={file_name:?} head={head_id} temp={is_temp}"
        );
        Ok(HeapFile {
            file_name,
            is_temp,
            head_id,
            bpm,
            disk_manager,
            deleted: false,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn head_id(&self) -> PageId {
        self.head_id
    }

    fn create_new_hf(bpm: &Arc<Mutex<BufferPoolManager>>) -> Result<PageId> {
        let (head_id, handle) = bpm.lock().unwrap().new_page(1)?;
        {
            let mut page = handle.write().unwrap();
            DirPageView::init_empty(&mut page, head_id);
        }
        bpm.lock().unwrap().unpin_page(head_id, UnpinMode::Dirty)?;
        Ok(head_id)
    }

    fn pin(&self, page_id: PageId) -> Result<PageHandle> {
        self.bpm.lock().unwrap().pin_page(page_id, PinContents::DiskIo)
    }

    fn unpin(&self, page_id: PageId, mode: UnpinMode) -> Result<()> {
        self.bpm.lock().unwrap().unpin_page(page_id, mode)
    }

    fn free_page(&self, page_id: PageId) -> Result<()> {
        self.bpm.lock().unwrap().free_page(page_id)
    }

    pub fn insert_record(&self, bytes: &[u8]) -> Result<Rid> {
        use crate::common::constants::MAX_RECORD_SIZE;
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(Error::invalid_argument(format!(
                "record of {} bytes exceeds max record size {MAX_RECORD_SIZE}",
                bytes.len()
            )));
        }

        let pageno = self.get_avail_page(bytes.len())?;
        let handle = self.pin(pageno)?;
        let outcome: Result<(Rid, i16)> = {
            let mut page = handle.write().unwrap();
            let mut view = HfPageView::new(&mut page);
            view.insert_record(bytes).map(|rid| (rid, view.free_space()))
        };
        self.unpin(pageno, UnpinMode::Dirty)?;
        let (rid, free_space) = outcome?;
        self.update_dir_entry(pageno, 1, free_space)?;
        Ok(rid)
    }

    pub fn select_record(&self, rid: Rid) -> Result<Vec<u8>> {
        let handle = self.pin(rid.page_id)?;
        let result = {
            let mut page = handle.write().unwrap();
            HfPageView::new(&mut page).select_record(rid)
        };
        self.unpin(rid.page_id, UnpinMode::Clean)?;
        result
    }

    pub fn update_record(&self, rid: Rid, new_bytes: &[u8]) -> Result<()> {
        let handle = self.pin(rid.page_id)?;
        let result = {
            let mut page = handle.write().unwrap();
            HfPageView::new(&mut page).update_record(rid, new_bytes)
        };
        self.unpin(rid.page_id, UnpinMode::Dirty)?;
        result
    }

    pub fn delete_record(&self, rid: Rid) -> Result<()> {
        let handle = self.pin(rid.page_id)?;
        let outcome: Result<i16> = {
            let mut page = handle.write().unwrap();
            let mut view = HfPageView::new(&mut page);
            view.delete_record(rid).map(|_| view.free_space())
        };
        self.unpin(rid.page_id, UnpinMode::Dirty)?;
        let free_space = outcome?;
        self.update_dir_entry(rid.page_id, -1, free_space)?;
        Ok(())
    }

    pub fn get_rec_cnt(&self) -> Result<i32> {
        let mut cur_id = self.head_id;
        let mut total = 0i32;
        loop {
            let handle = self.pin(cur_id)?;
            let (sum, next_id) = {
                let mut page = handle.write().unwrap();
                let view = DirPageView::new(&mut page);
                let sum: i32 = view.entries().iter().map(|e| e.rec_cnt as i32).sum();
                (sum, view.next_page())
            };
            self.unpin(cur_id, UnpinMode::Clean)?;
            total += sum;
            if next_id.is_valid() {
                cur_id = next_id;
            } else {
                return Ok(total);
            }
        }
    }

    fn get_avail_page(&self, rec_len: usize) -> Result<PageId> {
        let needed = rec_len as i16 + SLOT_SIZE as i16;
        let mut cur_id = self.head_id;
        loop {
            let handle = self.pin(cur_id)?;
            let (hit, next_id) = {
                let mut page = handle.write().unwrap();
                let view = DirPageView::new(&mut page);
                let hit = view
                    .entries()
                    .into_iter()
                    .find(|e| e.free_cnt >= needed)
                    .map(|e| e.page_id);
                (hit, view.next_page())
            };

            if let Some(pid) = hit {
                self.unpin(cur_id, UnpinMode::Clean)?;
                return Ok(pid);
            }
            if next_id.is_valid() {
                self.unpin(cur_id, UnpinMode::Clean)?;
                cur_id = next_id;
                continue;
            }
            self.unpin(cur_id, UnpinMode::Clean)?;
            return self.insert_page();
        }
    }

    /// Walks the directory chain for the entry matching `pageno`, leaving
    /// that directory page pinned for the caller to mutate and unpin.
    fn find_dir_entry(&self, pageno: PageId) -> Result<(PageId, usize, PageHandle)> {
        let mut cur_id = self.head_id;
        loop {
            let handle = self.pin(cur_id)?;
            let (found, next_id) = {
                let mut page = handle.write().unwrap();
                let view = DirPageView::new(&mut page);
                (view.find(pageno), view.next_page())
            };

            if let Some(idx) = found {
                return Ok((cur_id, idx, handle));
            }
            if next_id.is_valid() {
                self.unpin(cur_id, UnpinMode::Clean)?;
                cur_id = next_id;
                continue;
            }
            self.unpin(cur_id, UnpinMode::Clean)?;
            return Err(Error::internal(format!(
                "directory chain has no entry for page {pageno}"
            )));
        }
    }

    fn update_dir_entry(&self, pageno: PageId, delta_rec: i16, freecnt: i16) -> Result<()> {
        let (dir_id, idx, handle) = self.find_dir_entry(pageno)?;
        let new_rec_cnt = {
            let mut page = handle.write().unwrap();
            let mut view = DirPageView::new(&mut page);
            let mut entry = view.entry(idx);
            entry.rec_cnt += delta_rec;
            entry.free_cnt = freecnt;
            view.set_entry(idx, entry);
            entry.rec_cnt
        };
        self.unpin(dir_id, UnpinMode::Dirty)?;

        if new_rec_cnt < 1 {
            self.delete_page(pageno, dir_id, idx)?;
        }
        Ok(())
    }

    /// Walks the directory chain looking for room for a new data-page entry,
    /// extending the chain with a fresh directory page if every one is full.
    ///
    /// Never holds two pages pinned at once: a directory page is always
    /// unpinned before a sibling page (a new data page, or a newly linked
    /// directory page) is allocated and pinned, then re-pinned afterward if
    /// it still needs updating. This keeps the operation correct even with a
    /// one-frame pool, at the cost of one extra pin/unpin round trip.
    fn insert_page(&self) -> Result<PageId> {
        let mut cur_id = self.head_id;
        loop {
            let handle = self.pin(cur_id)?;
            let (entry_cnt, max_entries, next_id) = {
                let mut page = handle.write().unwrap();
                let view = DirPageView::new(&mut page);
                (view.entry_cnt(), view.max_entries(), view.next_page())
            };

            if entry_cnt < max_entries {
                self.unpin(cur_id, UnpinMode::Clean)?;

                let data_id = self.disk_manager.lock().unwrap().allocate_page()?;
                let data_handle = self.pin(data_id)?;
                let free_cnt = {
                    let mut dpage = data_handle.write().unwrap();
                    HfPageView::init_empty(&mut dpage, data_id).free_space()
                };
                self.unpin(data_id, UnpinMode::Dirty)?;

                let handle = self.pin(cur_id)?;
                {
                    let mut page = handle.write().unwrap();
                    DirPageView::new(&mut page).push_entry(DirEntry {
                        page_id: data_id,
                        rec_cnt: 0,
                        free_cnt,
                    });
                }
                self.unpin(cur_id, UnpinMode::Dirty)?;
                return Ok(data_id);
            }

            if next_id.is_valid() {
                self.unpin(cur_id, UnpinMode::Clean)?;
                cur_id = next_id;
                continue;
            }

            self.unpin(cur_id, UnpinMode::Clean)?;
            let new_dir_id = self.disk_manager.lock().unwrap().allocate_page()?;

            let handle = self.pin(cur_id)?;
            {
                let mut page = handle.write().unwrap();
                DirPageView::new(&mut page).set_next_page(new_dir_id);
            }
            self.unpin(cur_id, UnpinMode::Dirty)?;

            let new_dir_handle = self.pin(new_dir_id)?;
            {
                let mut dpage = new_dir_handle.write().unwrap();
                let mut view = DirPageView::init_empty(&mut dpage, new_dir_id);
                view.set_prev_page(cur_id);
            }
            self.unpin(new_dir_id, UnpinMode::Dirty)?;

            cur_id = new_dir_id;
        }
    }

    /// Removes the directory entry for `pageno` and always frees the data
    /// page. If the directory page is left empty and is not the head, it is
    /// unlinked from the chain and freed too.
    fn delete_page(&self, pageno: PageId, dir_id: PageId, index: usize) -> Result<()> {
        let handle = self.pin(dir_id)?;
        let (entry_cnt, prev_id, next_id) = {
            let mut page = handle.write().unwrap();
            let view = DirPageView::new(&mut page);
            (view.entry_cnt(), view.prev_page(), view.next_page())
        };
        let is_head = dir_id == self.head_id;

        if entry_cnt >= 2 || is_head {
            {
                let mut page = handle.write().unwrap();
                DirPageView::new(&mut page).compact(index);
            }
            self.unpin(dir_id, UnpinMode::Dirty)?;
        } else {
            self.unpin(dir_id, UnpinMode::Clean)?;
            self.unlink_dir_page(prev_id, next_id)?;
            self.free_page(dir_id)?;
        }

        self.free_page(pageno)
    }

    fn unlink_dir_page(&self, prev_id: PageId, next_id: PageId) -> Result<()> {
        if prev_id.is_valid() {
            let handle = self.pin(prev_id)?;
            {
                let mut page = handle.write().unwrap();
                DirPageView::new(&mut page).set_next_page(next_id);
            }
            self.unpin(prev_id, UnpinMode::Dirty)?;
        }
        if next_id.is_valid() {
            let handle = self.pin(next_id)?;
            {
                let mut page = handle.write().unwrap();
                DirPageView::new(&mut page).set_prev_page(prev_id);
            }
            self.unpin(next_id, UnpinMode::Dirty)?;
        }
        Ok(())
    }

    /// Frees every data page and directory page in the chain, then removes
    /// the name-directory entry (if any). Idempotent — a second call is a
    /// no-op, which lets `Drop` call it unconditionally for temp files.
    pub fn delete_file(&mut self) -> Result<()> {
        if self.deleted {
            return Ok(());
        }

        let mut cur_id = self.head_id;
        loop {
            let handle = self.pin(cur_id)?;
            let (page_ids, next_id) = {
                let mut page = handle.write().unwrap();
                let view = DirPageView::new(&mut page);
                (
                    view.entries().iter().map(|e| e.page_id).collect::<Vec<_>>(),
                    view.next_page(),
                )
            };
            self.unpin(cur_id, UnpinMode::Clean)?;

            for pid in page_ids {
                self.free_page(pid)?;
            }
            self.free_page(cur_id)?;

            if next_id.is_valid() {
                cur_id = next_id;
            } else {
                break;
            }
        }

        if !self.is_temp {
            if let Some(name) = &self.file_name {
                self.disk_manager.lock().unwrap().delete_file_entry(name)?;
            }
        }
        self.deleted = true;
        Ok(())
    }

    /// Returns an iterator over every live record in directory order, then
    /// slot order within each data page.
    pub fn open_scan(&self) -> Result<HeapScan> {
        HeapScan::new(Arc::clone(&self.bpm), self.head_id)
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        if self.is_temp && !self.deleted {
            if let Err(err) = self.delete_file() {
                log::warn!("heap_file: failed to delete temporary file on drop: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::PAGE_SIZE;
    use tempfile::NamedTempFile;

    fn new_heap(pool_size: usize) -> (HeapFile, Arc<Mutex<BufferPoolManager>>, NamedTempFile) {
        let tmp = NamedTempFile::new().expect("create temp db file");
        let disk_manager = DiskManager::new_with_handle(tmp.path()).expect("open disk manager");
        let bpm = BufferPoolManager::builder()
            .pool_size(pool_size)
            .disk_manager(Arc::clone(&disk_manager))
            .build_with_handle();
        let hf = HeapFile::open(None, Arc::clone(&bpm), disk_manager).expect("open heap file");
        (hf, bpm, tmp)
    }

    #[test]
    fn insert_select_round_trips_and_counts() {
        let (hf, _bpm, _tmp) = new_heap(3);
        let rid = hf.insert_record(b"hello").unwrap();
        assert_eq!(hf.select_record(rid).unwrap(), b"hello");
        assert_eq!(hf.get_rec_cnt().unwrap(), 1);
    }

    #[test]
    fn update_in_place_changes_stored_bytes() {
        let (hf, _bpm, _tmp) = new_heap(3);
        let rid = hf.insert_record(b"abc").unwrap();
        hf.update_record(rid, b"xyz").unwrap();
        assert_eq!(hf.select_record(rid).unwrap(), b"xyz");
    }

    #[test]
    fn update_with_mismatched_length_is_rejected() {
        let (hf, _bpm, _tmp) = new_heap(3);
        let rid = hf.insert_record(b"abc").unwrap();
        assert!(hf.update_record(rid, b"abcd").is_err());
    }

    #[test]
    fn delete_removes_record_and_decrements_count() {
        let (hf, _bpm, _tmp) = new_heap(3);
        let rid = hf.insert_record(b"abc").unwrap();
        assert_eq!(hf.get_rec_cnt().unwrap(), 1);
        hf.delete_record(rid).unwrap();
        assert_eq!(hf.get_rec_cnt().unwrap(), 0);
        assert!(hf.select_record(rid).is_err());
    }

    #[test]
    fn record_larger_than_max_size_is_rejected() {
        let (hf, _bpm, _tmp) = new_heap(3);
        use crate::common::constants::MAX_RECORD_SIZE;
        let oversized = vec![0u8; MAX_RECORD_SIZE + 1];
        assert!(hf.insert_record(&oversized).is_err());
    }

    #[test]
    fn every_pin_is_matched_by_an_unpin_after_each_operation() {
        let (hf, bpm, _tmp) = new_heap(2);
        let rid = hf.insert_record(b"hello").unwrap();
        assert_eq!(bpm.lock().unwrap().get_num_unpinned(), 2);
        hf.select_record(rid).unwrap();
        assert_eq!(bpm.lock().unwrap().get_num_unpinned(), 2);
        hf.update_record(rid, b"world").unwrap();
        assert_eq!(bpm.lock().unwrap().get_num_unpinned(), 2);
        hf.delete_record(rid).unwrap();
        assert_eq!(bpm.lock().unwrap().get_num_unpinned(), 2);
    }

    #[test]
    fn many_records_span_multiple_data_pages_and_scan_sees_them_all() {
        let (hf, _bpm, _tmp) = new_heap(3);
        let record = vec![7u8; 200];
        let mut rids = Vec::new();
        for _ in 0..100 {
            rids.push(hf.insert_record(&record).unwrap());
        }
        assert_eq!(hf.get_rec_cnt().unwrap(), 100);

        let scanned: Vec<_> = hf.open_scan().unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(scanned.len(), 100);
    }

    #[test]
    fn deleting_every_record_on_a_page_compacts_its_directory_entry() {
        let (hf, _bpm, _tmp) = new_heap(3);
        let record = vec![7u8; 200];
        let mut rids = Vec::new();
        for _ in 0..100 {
            rids.push(hf.insert_record(&record).unwrap());
        }

        // delete every record living on the same data page as the first rid.
        let target_page = rids[0].page_id;
        let on_target_page: Vec<Rid> = rids
            .iter()
            .copied()
            .filter(|r| r.page_id == target_page)
            .collect();
        let remaining_before = hf.get_rec_cnt().unwrap();
        for rid in &on_target_page {
            hf.delete_record(*rid).unwrap();
        }
        let remaining_after = hf.get_rec_cnt().unwrap();
        assert_eq!(
            remaining_before - remaining_after,
            on_target_page.len() as i32
        );

        // the directory no longer has an entry pointing at the freed page.
        assert!(hf.find_dir_entry(target_page).is_err());
    }

    #[test]
    fn temporary_heap_file_deletes_its_pages_on_drop() {
        let tmp = NamedTempFile::new().unwrap();
        let disk_manager = DiskManager::new_with_handle(tmp.path()).unwrap();
        let bpm = BufferPoolManager::builder()
            .pool_size(3)
            .disk_manager(Arc::clone(&disk_manager))
            .build_with_handle();

        let head_id = {
            let hf = HeapFile::open(None, Arc::clone(&bpm), Arc::clone(&disk_manager)).unwrap();
            hf.insert_record(b"gone soon").unwrap();
            hf.head_id()
        };

        // after drop, the head page id has been freed back to the disk
        // manager's free list and is handed out again immediately.
        let reused = disk_manager.lock().unwrap().allocate_page().unwrap();
        assert_eq!(reused, head_id);
    }

    #[test]
    fn named_heap_file_survives_reopen_via_a_fresh_pool() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        let rid;
        {
            let disk_manager = DiskManager::new_with_handle(&path).unwrap();
            let bpm = BufferPoolManager::builder()
                .pool_size(3)
                .disk_manager(Arc::clone(&disk_manager))
                .build_with_handle();
            let hf = HeapFile::open(Some("t"), bpm.clone(), disk_manager.clone()).unwrap();
            rid = hf.insert_record(b"durable").unwrap();
            bpm.lock().unwrap().flush_all_pages().unwrap();
        }
        {
            let disk_manager = DiskManager::new_with_handle(&path).unwrap();
            let bpm = BufferPoolManager::builder()
                .pool_size(3)
                .disk_manager(Arc::clone(&disk_manager))
                .build_with_handle();
            let hf = HeapFile::open(Some("t"), bpm, disk_manager).unwrap();
            assert_eq!(hf.select_record(rid).unwrap(), b"durable");
        }
    }

    #[test]
    fn insert_and_select_succeed_with_a_single_frame_pool() {
        // insert_page must never need two pages pinned at once: with only
        // one frame available, pinning a second page while the directory
        // page is still held would fail with PoolExhausted.
        let (hf, _bpm, _tmp) = new_heap(1);
        let rid = hf.insert_record(b"one frame only").unwrap();
        assert_eq!(hf.select_record(rid).unwrap(), b"one frame only");
        assert_eq!(hf.get_rec_cnt().unwrap(), 1);
    }

    #[test]
    fn record_at_the_max_admissible_size_round_trips() {
        use crate::common::constants::MAX_RECORD_SIZE;
        let (hf, _bpm, _tmp) = new_heap(3);
        let bytes = vec![9u8; MAX_RECORD_SIZE];
        let rid = hf.insert_record(&bytes).unwrap();
        assert_eq!(hf.select_record(rid).unwrap().len(), PAGE_SIZE - 24);
    }

    /// Reads the head directory page's `next_page` link without disturbing
    /// its pin balance, for tests that need to observe chain growth.
    fn head_next_page(hf: &HeapFile) -> PageId {
        let handle = hf.pin(hf.head_id()).unwrap();
        let next = {
            let mut page = handle.write().unwrap();
            DirPageView::new(&mut page).next_page()
        };
        hf.unpin(hf.head_id(), UnpinMode::Clean).unwrap();
        next
    }

    #[test]
    fn directory_chain_grows_past_one_page_when_entries_overflow() {
        use crate::common::constants::{DIR_MAX_ENTRIES, MAX_RECORD_SIZE};
        let (hf, _bpm, _tmp) = new_heap(3);

        // a max-size record leaves a data page with zero free space after
        // one insert, so every record here lands on its own data page —
        // `DIR_MAX_ENTRIES` of them exactly fill the head directory page,
        // and a few more force `insert_page` to link a second one in.
        let record = vec![5u8; MAX_RECORD_SIZE];
        let total = DIR_MAX_ENTRIES + 4;
        let rids: Vec<Rid> = (0..total).map(|_| hf.insert_record(&record).unwrap()).collect();
        assert_eq!(hf.get_rec_cnt().unwrap(), total as i32);
        assert!(head_next_page(&hf).is_valid());

        for rid in &rids {
            assert_eq!(hf.select_record(*rid).unwrap(), record);
        }
    }

    #[test]
    fn emptying_a_non_head_directory_page_unlinks_and_frees_it() {
        use crate::common::constants::{DIR_MAX_ENTRIES, MAX_RECORD_SIZE};
        let (hf, _bpm, _tmp) = new_heap(3);

        let record = vec![6u8; MAX_RECORD_SIZE];
        let overflow = 5;
        let total = DIR_MAX_ENTRIES + overflow;
        let rids: Vec<Rid> = (0..total).map(|_| hf.insert_record(&record).unwrap()).collect();

        // the head directory page fills to capacity first; everything past
        // that lives in entries of a second, linked-in directory page.
        assert!(head_next_page(&hf).is_valid());

        // deleting every one of those overflow records drains the second
        // directory page back to zero entries, which should unlink it from
        // the chain and free it rather than leaving a dangling empty page.
        for rid in &rids[DIR_MAX_ENTRIES..] {
            hf.delete_record(*rid).unwrap();
        }

        assert_eq!(head_next_page(&hf), PageId::INVALID);
        assert_eq!(hf.get_rec_cnt().unwrap(), DIR_MAX_ENTRIES as i32);

        // the remaining records, all on pages indexed by the head page,
        // are untouched.
        for rid in &rids[..DIR_MAX_ENTRIES] {
            assert_eq!(hf.select_record(*rid).unwrap(), record);
        }
    }
}
