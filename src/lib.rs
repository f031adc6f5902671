//! `heapbase`: a fixed-size buffer pool under CLOCK replacement, and a
//! heap-file record manager layered on top of it. See `DESIGN.md` for the
//! grounding behind each component.

pub mod common;
pub mod storage;
