//! Per-frame metadata plus the page-sized byte buffer it wraps. Grounded in
//! the teacher's `FrameMetadata`, generalized to carry the valid/dirty/
//! reference bits the CLOCK replacer needs (the teacher's LRU-K replacer
//! keeps that state in the replacer itself; CLOCK needs it on the frame,
//! per spec §3/§4.A).

use crate::storage::disk::disk_manager::PageId;
use crate::storage::page::Page;
use std::sync::{Arc, RwLock};

/// A page bound into a frame: shared, runtime-checked so that a caller can
/// hold simultaneous pins on two different frames (e.g. a directory page
/// and a data page) while the buffer manager is only borrowed for the
/// duration of the `pin`/`unpin` call itself.
pub type PageHandle = Arc<RwLock<Page>>;

pub type FrameId = usize;

#[derive(Debug)]
pub struct FrameDescriptor {
    page_id: PageId,
    pin_count: u32,
    dirty: bool,
    reference: bool,
    valid: bool,
    page: PageHandle,
}

impl FrameDescriptor {
    pub fn empty() -> Self {
        FrameDescriptor {
            page_id: PageId::INVALID,
            pin_count: 0,
            dirty: false,
            reference: false,
            valid: false,
            page: Arc::new(RwLock::new(Page::zeroed())),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn set_page_id(&mut self, id: PageId) {
        self.page_id = id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn pin(&mut self) {
        self.pin_count += 1;
    }

    /// Decrements the pin count. Caller must check `pin_count() > 0` first.
    pub fn unpin(&mut self) {
        debug_assert!(self.pin_count > 0, "unpinning an already-unpinned frame");
        self.pin_count -= 1;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn reference(&self) -> bool {
        self.reference
    }

    pub fn set_reference(&mut self, reference: bool) {
        self.reference = reference;
    }

    pub fn page_handle(&self) -> PageHandle {
        Arc::clone(&self.page)
    }

    /// Copies `bytes` verbatim into the frame's page image.
    pub fn copy_page(&mut self, bytes: &[u8]) {
        self.page.write().unwrap().copy_from_slice(bytes);
    }

    /// Resets a frame to its unoccupied state, ready for reuse.
    pub fn reset(&mut self) {
        self.page_id = PageId::INVALID;
        self.pin_count = 0;
        self.dirty = false;
        self.reference = false;
        self.valid = false;
    }
}
