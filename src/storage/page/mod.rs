//! A fixed-size page buffer and the two logical views (`HFPage`/`DirPage`)
//! laid out over it. A [`Page`] only owns bytes; it does not know which
//! layout it holds — see [`hf_page`] and [`dir_page`] for the views.

pub mod dir_page;
pub mod hf_page;

use crate::common::constants::PAGE_SIZE;

/// A fixed-size block of bytes, shared in memory as the payload of exactly
/// one [`crate::storage::buffer::frame::FrameDescriptor`] at a time.
#[derive(Clone)]
pub struct Page {
    bytes: [u8; PAGE_SIZE],
}

impl Page {
    pub fn zeroed() -> Self {
        Page {
            bytes: [0u8; PAGE_SIZE],
        }
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.bytes
    }

    /// Copies `src` verbatim into this page's buffer. `src` must be exactly
    /// `PAGE_SIZE` bytes.
    pub fn copy_from_slice(&mut self, src: &[u8]) {
        assert_eq!(src.len(), PAGE_SIZE, "page image must be PAGE_SIZE bytes");
        self.bytes.copy_from_slice(src);
    }

    pub(crate) fn read_i32(&self, offset: usize) -> i32 {
        i32::from_be_bytes(self.bytes[offset..offset + 4].try_into().unwrap())
    }

    pub(crate) fn write_i32(&mut self, offset: usize, value: i32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn read_i16(&self, offset: usize) -> i16 {
        i16::from_be_bytes(self.bytes[offset..offset + 2].try_into().unwrap())
    }

    pub(crate) fn write_i16(&mut self, offset: usize, value: i16) {
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("len", &self.bytes.len()).finish()
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::zeroed()
    }
}
