//! The buffer manager (spec §4.C): pins/unpins pages, allocates/frees disk
//! pages through the pool, and flushes dirty frames. Grounded in the
//! teacher's `BufferPoolManager` — builder pattern, `page_table: HashMap`,
//! `Arc<Mutex<_>>` handle construction — generalized from the teacher's
//! LRU-K replacer to CLOCK and from `Option`/`bool` returns to
//! `Result<_, Error>` per spec §7.

use crate::common::constants::{PAGE_SIZE, UnpinMode};
use crate::common::error::{Error, Result};
use crate::storage::buffer::clock_replacer::ClockReplacer;
use crate::storage::buffer::frame::{FrameDescriptor, FrameId, PageHandle};
use crate::storage::disk::disk_manager::{DiskManager, PageId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How a pinned frame's contents should be initialized on a miss.
pub enum PinContents<'a> {
    /// Fetch the page image from disk.
    DiskIo,
    /// Caller supplies the full page image; only valid on a miss — pinning
    /// an already-resident page with `MemCpy` is an error (it would
    /// silently clobber pinned contents).
    MemCpy(&'a [u8; PAGE_SIZE]),
    /// Leave frame contents untouched; caller will populate them.
    NoOp,
}

#[derive(Debug)]
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<FrameDescriptor>,
    page_table: HashMap<PageId, FrameId>,
    disk_manager: Arc<Mutex<DiskManager>>,
    replacer: ClockReplacer,
}

#[derive(Default)]
pub struct BufferPoolManagerBuilder {
    pool_size: Option<usize>,
    disk_manager: Option<Arc<Mutex<DiskManager>>>,
}

impl BufferPoolManagerBuilder {
    pub fn pool_size(&mut self, pool_size: usize) -> &mut Self {
        self.pool_size = Some(pool_size);
        self
    }

    pub fn disk_manager(&mut self, disk_manager: Arc<Mutex<DiskManager>>) -> &mut Self {
        self.disk_manager = Some(disk_manager);
        self
    }

    pub fn build(&mut self) -> BufferPoolManager {
        let pool_size = self
            .pool_size
            .expect("`pool_size` not initialized before build.");
        let disk_manager = self
            .disk_manager
            .take()
            .expect("`disk_manager` not initialized before build.");

        BufferPoolManager::new(pool_size, disk_manager)
    }

    pub fn build_with_handle(&mut self) -> Arc<Mutex<BufferPoolManager>> {
        Arc::new(Mutex::new(self.build()))
    }
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<Mutex<DiskManager>>) -> Self {
        BufferPoolManager {
            pool_size,
            frames: (0..pool_size).map(|_| FrameDescriptor::empty()).collect(),
            page_table: HashMap::new(),
            disk_manager,
            replacer: ClockReplacer::new(pool_size),
        }
    }

    pub fn new_with_handle(
        pool_size: usize,
        disk_manager: Arc<Mutex<DiskManager>>,
    ) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new(pool_size, disk_manager)))
    }

    pub fn builder() -> BufferPoolManagerBuilder {
        BufferPoolManagerBuilder::default()
    }

    pub fn get_num_frames(&self) -> usize {
        self.pool_size
    }

    pub fn get_num_unpinned(&self) -> usize {
        self.frames.iter().filter(|f| f.pin_count() == 0).count()
    }

    /// Writes a frame's bytes to disk under its *current* `page_id` if it
    /// holds a valid, dirty image. Does not clear the dirty bit here — the
    /// caller is always about to either reuse or repurpose the frame.
    fn flush_victim_if_dirty(&mut self, frame_id: FrameId) -> Result<()> {
        let (page_id, needs_flush, bytes) = {
            let frame = &self.frames[frame_id];
            if frame.is_valid() && frame.is_dirty() {
                (frame.page_id(), true, *frame.page_handle().read().unwrap().as_bytes())
            } else {
                (frame.page_id(), false, [0u8; PAGE_SIZE])
            }
        };
        if needs_flush {
            self.disk_manager.lock().unwrap().write_page(page_id, &bytes)?;
            log::trace!("buffer_pool: flushed dirty victim frame {frame_id} (page {page_id}) before reuse");
        }
        Ok(())
    }

    /// Core of `pinPage` (spec §4.C) for the miss path: pick a victim,
    /// evict it, populate the frame per `contents`, and install the new
    /// mapping. Returns the frame id now holding `page_id`.
    fn pin_miss(&mut self, page_id: PageId, contents: PinContents<'_>) -> Result<FrameId> {
        let frame_id = self
            .replacer
            .pick_victim(&mut self.frames)
            .ok_or(Error::PoolExhausted)?;

        self.flush_victim_if_dirty(frame_id)?;

        let old_page_id = self.frames[frame_id].page_id();
        if self.frames[frame_id].is_valid() {
            self.page_table.remove(&old_page_id);
        }

        match contents {
            PinContents::DiskIo => {
                let mut buf = [0u8; PAGE_SIZE];
                self.disk_manager.lock().unwrap().read_page(page_id, &mut buf)?;
                self.frames[frame_id].copy_page(&buf);
            }
            PinContents::MemCpy(bytes) => {
                self.frames[frame_id].copy_page(bytes);
            }
            PinContents::NoOp => {}
        }

        let frame = &mut self.frames[frame_id];
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.set_valid(true);
        frame.set_reference(true);
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        log::trace!("buffer_pool: pin miss page {page_id} -> frame {frame_id}");
        Ok(frame_id)
    }

    /// Pins `page_id`, returning a shared handle onto its frame's bytes.
    pub fn pin_page(&mut self, page_id: PageId, contents: PinContents<'_>) -> Result<PageHandle> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            if matches!(contents, PinContents::MemCpy(_)) {
                return Err(Error::invalid_argument(
                    "PIN_MEMCPY on an already-resident page would clobber pinned contents",
                ));
            }
            let frame = &mut self.frames[frame_id];
            frame.pin();
            frame.set_reference(true);
            log::trace!(
                "buffer_pool: pin hit page {page_id} frame {frame_id} pin_count={}",
                frame.pin_count()
            );
            return Ok(frame.page_handle());
        }

        let frame_id = self.pin_miss(page_id, contents)?;
        Ok(self.frames[frame_id].page_handle())
    }

    pub fn unpin_page(&mut self, page_id: PageId, mode: UnpinMode) -> Result<()> {
        let frame_id = *self
            .page_table
            .get(&page_id)
            .ok_or_else(|| Error::invalid_argument(format!("page {page_id} is not resident")))?;
        let frame = &mut self.frames[frame_id];
        if frame.pin_count() == 0 {
            return Err(Error::invalid_argument(format!(
                "page {page_id} is not pinned"
            )));
        }
        frame.unpin();
        frame.set_dirty(frame.is_dirty() || mode.is_dirty());
        log::trace!(
            "buffer_pool: unpin page {page_id} frame {frame_id} pin_count={} dirty={}",
            frame.pin_count(),
            frame.is_dirty()
        );
        Ok(())
    }

    /// Allocates a run of `run_size` contiguous disk pages and pins the
    /// first with `PIN_MEMCPY` of a zeroed image, returning a handle the
    /// caller writes the new page's contents into. On any pin failure, the
    /// whole run is deallocated and the original error is returned — the
    /// sole path that guarantees no disk-page leak on pin failure.
    pub fn new_page(&mut self, run_size: usize) -> Result<(PageId, PageHandle)> {
        let mut disk = self.disk_manager.lock().unwrap();
        let page_id = disk.allocate_run(run_size)?;
        drop(disk);

        let zeroed = [0u8; PAGE_SIZE];
        match self.pin_page(page_id, PinContents::MemCpy(&zeroed)) {
            Ok(handle) => Ok((page_id, handle)),
            Err(err) => {
                // Always propagate the original pin failure, per spec §4.C —
                // a rollback error here must not mask it.
                if let Err(dealloc_err) =
                    self.disk_manager.lock().unwrap().deallocate_run(page_id, run_size)
                {
                    log::warn!(
                        "buffer_pool: failed to roll back run allocation at {page_id} \
                         after pin failure: {dealloc_err}"
                    );
                }
                Err(err)
            }
        }
    }

    /// If `page_id` is resident, it must be unpinned; then deallocates it
    /// on disk either way.
    pub fn free_page(&mut self, page_id: PageId) -> Result<()> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let frame = &mut self.frames[frame_id];
            if frame.pin_count() > 0 {
                return Err(Error::invalid_argument(format!(
                    "cannot free pinned page {page_id}"
                )));
            }
            frame.reset();
            self.page_table.remove(&page_id);
        }
        self.disk_manager.lock().unwrap().deallocate_page(page_id)?;
        log::trace!("buffer_pool: freed page {page_id}");
        Ok(())
    }

    pub fn flush_page(&mut self, page_id: PageId) -> Result<()> {
        let frame_id = *self
            .page_table
            .get(&page_id)
            .ok_or_else(|| Error::invalid_argument(format!("page {page_id} is not resident")))?;
        let frame = &self.frames[frame_id];
        if frame.is_valid() && frame.is_dirty() {
            let bytes = *frame.page_handle().read().unwrap().as_bytes();
            self.disk_manager.lock().unwrap().write_page(page_id, &bytes)?;
            self.frames[frame_id].set_dirty(false);
            log::trace!("buffer_pool: flushed page {page_id}");
        }
        Ok(())
    }

    pub fn flush_all_pages(&mut self) -> Result<()> {
        let page_ids: Vec<PageId> = self.page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn is_resident(&self, page_id: PageId) -> bool {
        self.page_table.contains_key(&page_id)
    }

    #[cfg(test)]
    pub(crate) fn pin_count_of(&self, page_id: PageId) -> Option<u32> {
        self.page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id].pin_count())
    }
}
