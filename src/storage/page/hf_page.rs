//! Logical view of a slotted data page ("HFPage"): a 20-byte header
//! followed by a slot directory (4 bytes/slot) growing forward, and record
//! bytes packed contiguously from the end of the page backward. See spec
//! §3/§4.E and SPEC_FULL §3 for the exact byte layout.

use super::Page;
use crate::common::constants::{DATA_PAGE_HEADER_SIZE, MAX_RECORD_SIZE, PAGE_SIZE, SLOT_SIZE};
use crate::common::error::{Error, Result};
use crate::storage::disk::disk_manager::PageId;
use crate::storage::heap::rid::Rid;

const CUR_PAGE_OFF: usize = 0;
const NUM_SLOTS_OFF: usize = 4;
const DATA_START_OFF: usize = 6;

/// Sentinel slot length marking a deleted ("tombstoned") slot.
const TOMBSTONE: i16 = -1;

fn slot_offset(index: usize) -> usize {
    DATA_PAGE_HEADER_SIZE + index * SLOT_SIZE
}

/// A borrowed, transient view over a [`Page`] interpreted as a slotted
/// data page.
pub struct HfPageView<'a> {
    page: &'a mut Page,
}

impl<'a> HfPageView<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        HfPageView { page }
    }

    /// Initializes an empty data page image in place.
    pub fn init_empty(page: &'a mut Page, cur_page: PageId) -> Self {
        let mut view = HfPageView { page };
        view.set_cur_page(cur_page);
        view.set_num_slots(0);
        view.set_data_start(PAGE_SIZE as i16);
        view
    }

    pub fn cur_page(&self) -> PageId {
        PageId(self.page.read_i32(CUR_PAGE_OFF))
    }

    pub fn set_cur_page(&mut self, id: PageId) {
        self.page.write_i32(CUR_PAGE_OFF, id.0);
    }

    fn num_slots(&self) -> usize {
        self.page.read_i16(NUM_SLOTS_OFF) as usize
    }

    fn set_num_slots(&mut self, n: usize) {
        self.page.write_i16(NUM_SLOTS_OFF, n as i16);
    }

    fn data_start(&self) -> i16 {
        self.page.read_i16(DATA_START_OFF)
    }

    fn set_data_start(&mut self, v: i16) {
        self.page.write_i16(DATA_START_OFF, v);
    }

    fn slot_len(&self, index: usize) -> i16 {
        self.page.read_i16(slot_offset(index) + 2)
    }

    fn slot(&self, index: usize) -> (i16, i16) {
        let off = slot_offset(index);
        (self.page.read_i16(off), self.page.read_i16(off + 2))
    }

    fn set_slot(&mut self, index: usize, offset: i16, length: i16) {
        let off = slot_offset(index);
        self.page.write_i16(off, offset);
        self.page.write_i16(off + 2, length);
    }

    /// Free space available for a *new* record, accounting for the 4-byte
    /// slot a fresh insert would also require.
    pub fn free_space(&self) -> i16 {
        self.data_start() - (DATA_PAGE_HEADER_SIZE as i16) - (self.num_slots() as i16) * (SLOT_SIZE as i16)
    }

    /// Number of slots (live and tombstoned) currently in the directory.
    pub fn slot_count(&self) -> i16 {
        self.num_slots() as i16
    }

    /// The record at `slot` if it is live, `None` if tombstoned or out of
    /// range. Used by table scans, which skip deleted slots silently rather
    /// than treating them as the error `select_record` raises.
    pub fn record_if_live(&self, slot: i16) -> Option<Vec<u8>> {
        if slot < 0 || slot as usize >= self.num_slots() {
            return None;
        }
        let (offset, length) = self.slot(slot as usize);
        if length == TOMBSTONE {
            return None;
        }
        let start = offset as usize;
        let end = start + length as usize;
        Some(self.page.as_bytes()[start..end].to_vec())
    }

    fn check_slot_in_range(&self, slotno: i16) -> Result<usize> {
        if slotno < 0 || slotno as usize >= self.num_slots() {
            return Err(Error::invalid_argument(format!(
                "slot {slotno} out of range (page has {} slots)",
                self.num_slots()
            )));
        }
        Ok(slotno as usize)
    }

    /// Inserts `bytes`, always appending a fresh slot (slots are never
    /// reused across deletes — see DESIGN.md for why).
    pub fn insert_record(&mut self, bytes: &[u8]) -> Result<Rid> {
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(Error::invalid_argument(format!(
                "record of {} bytes exceeds max record size {MAX_RECORD_SIZE}",
                bytes.len()
            )));
        }
        let needed = bytes.len() as i16 + SLOT_SIZE as i16;
        if self.free_space() < needed {
            return Err(Error::internal(
                "insert_record called on a page without enough free space",
            ));
        }

        let new_start = self.data_start() - bytes.len() as i16;
        let start = new_start as usize;
        self.page.as_bytes_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        self.set_data_start(new_start);

        let slotno = self.num_slots();
        self.set_slot(slotno, new_start, bytes.len() as i16);
        self.set_num_slots(slotno + 1);

        Ok(Rid {
            page_id: self.cur_page(),
            slot_no: slotno as i16,
        })
    }

    pub fn select_record(&self, rid: Rid) -> Result<Vec<u8>> {
        let idx = self.check_slot_in_range(rid.slot_no)?;
        let (offset, length) = self.slot(idx);
        if length == TOMBSTONE {
            return Err(Error::invalid_argument(format!(
                "slot {} has been deleted",
                rid.slot_no
            )));
        }
        let start = offset as usize;
        let end = start + length as usize;
        Ok(self.page.as_bytes()[start..end].to_vec())
    }

    /// Overwrites the record at `rid` in place. Fails if `bytes.len()`
    /// differs from the stored record's length.
    pub fn update_record(&mut self, rid: Rid, bytes: &[u8]) -> Result<()> {
        let idx = self.check_slot_in_range(rid.slot_no)?;
        let (offset, length) = self.slot(idx);
        if length == TOMBSTONE {
            return Err(Error::invalid_argument(format!(
                "slot {} has been deleted",
                rid.slot_no
            )));
        }
        if bytes.len() != length as usize {
            return Err(Error::invalid_argument(format!(
                "update_record length mismatch: stored {length}, got {}",
                bytes.len()
            )));
        }
        let start = offset as usize;
        self.page.as_bytes_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Deletes the record at `rid`, compacting the packed data region to
    /// reclaim its bytes, and trimming any run of trailing tombstoned
    /// slots (including this one, if it was the last live slot) to reclaim
    /// slot-directory overhead too.
    pub fn delete_record(&mut self, rid: Rid) -> Result<()> {
        let idx = self.check_slot_in_range(rid.slot_no)?;
        let (gap_offset, gap_len) = self.slot(idx);
        if gap_len == TOMBSTONE {
            return Err(Error::invalid_argument(format!(
                "slot {} has already been deleted",
                rid.slot_no
            )));
        }

        let data_start = self.data_start();
        if gap_len > 0 {
            // shift [data_start, gap_offset) up by gap_len to close the gap.
            let src_start = data_start as usize;
            let src_end = gap_offset as usize;
            let dst_start = src_start + gap_len as usize;
            if src_end > src_start {
                self.page
                    .as_bytes_mut()
                    .copy_within(src_start..src_end, dst_start);
            }
            self.set_data_start(data_start + gap_len);

            // every slot whose data lived before the deleted record (i.e.
            // at a smaller offset) just moved up by gap_len.
            let n = self.num_slots();
            for i in 0..n {
                if i == idx {
                    continue;
                }
                let (off, len) = self.slot(i);
                if len != TOMBSTONE && off < gap_offset {
                    self.set_slot(i, off + gap_len, len);
                }
            }
        }

        self.set_slot(idx, 0, TOMBSTONE);

        // trim trailing tombstones so a deleted final slot (or run of
        // slots) gives its 4-byte directory overhead back too.
        let mut n = self.num_slots();
        while n > 0 && self.slot_len(n - 1) == TOMBSTONE {
            n -= 1;
        }
        self.set_num_slots(n);

        Ok(())
    }
}
