//! Table scan (spec §4.F "Scan"). Grounded in the teacher's `RowIterator` —
//! storage iteration wrapped behind a plain `Iterator` impl rather than a
//! bespoke cursor API.

use crate::common::constants::UnpinMode;
use crate::common::error::Result;
use crate::storage::buffer::buffer_pool_manager::{BufferPoolManager, PinContents};
use crate::storage::disk::disk_manager::PageId;
use crate::storage::heap::rid::Rid;
use crate::storage::page::dir_page::DirPageView;
use crate::storage::page::hf_page::HfPageView;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Iterates every live record of a heap file, in directory order and then
/// slot order within each data page. Pins at most one directory page or one
/// data page at a time — never both, and never more than one of either.
pub struct HeapScan {
    bpm: Arc<Mutex<BufferPoolManager>>,
    pending_pages: VecDeque<PageId>,
    next_dir_id: PageId,
    buffered: VecDeque<(Rid, Vec<u8>)>,
    finished: bool,
}

impl HeapScan {
    pub(super) fn new(bpm: Arc<Mutex<BufferPoolManager>>, head_id: PageId) -> Result<Self> {
        let mut scan = HeapScan {
            bpm,
            pending_pages: VecDeque::new(),
            next_dir_id: head_id,
            buffered: VecDeque::new(),
            finished: false,
        };
        scan.load_next_dir_page()?;
        Ok(scan)
    }

    fn load_next_dir_page(&mut self) -> Result<()> {
        if !self.next_dir_id.is_valid() {
            return Ok(());
        }
        let dir_id = self.next_dir_id;
        let handle = self
            .bpm
            .lock()
            .unwrap()
            .pin_page(dir_id, PinContents::DiskIo)?;
        let (entries, next_id) = {
            let mut page = handle.write().unwrap();
            let view = DirPageView::new(&mut page);
            (view.entries(), view.next_page())
        };
        self.bpm.lock().unwrap().unpin_page(dir_id, UnpinMode::Clean)?;

        self.pending_pages.extend(entries.into_iter().map(|e| e.page_id));
        self.next_dir_id = next_id;
        Ok(())
    }

    /// Pins the next queued data page, drains its live records into
    /// `buffered`, and unpins it. Returns `false` once the pending-page
    /// queue and the directory chain are both exhausted.
    fn fill_buffer(&mut self) -> Result<bool> {
        loop {
            if let Some(page_id) = self.pending_pages.pop_front() {
                let handle = self
                    .bpm
                    .lock()
                    .unwrap()
                    .pin_page(page_id, PinContents::DiskIo)?;
                {
                    let mut page = handle.write().unwrap();
                    let view = HfPageView::new(&mut page);
                    for slot in 0..view.slot_count() {
                        if let Some(bytes) = view.record_if_live(slot) {
                            self.buffered.push_back((Rid::new(page_id, slot), bytes));
                        }
                    }
                }
                self.bpm.lock().unwrap().unpin_page(page_id, UnpinMode::Clean)?;

                if !self.buffered.is_empty() {
                    return Ok(true);
                }
                continue;
            }

            if self.next_dir_id.is_valid() {
                self.load_next_dir_page()?;
                continue;
            }

            return Ok(false);
        }
    }
}

impl Iterator for HeapScan {
    type Item = Result<(Rid, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.buffered.is_empty() {
            match self.fill_buffer() {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}
