//! Demo entry point: wires up config, logging, and the buffer pool /
//! disk manager singletons, then round-trips one record through a heap
//! file. A single construction site for `BufferPoolManager`/`DiskManager`,
//! per the Design Notes on avoiding pervasive static access.

use heapbase::common::config::DbConfig;
use heapbase::common::error::Result;
use heapbase::storage::buffer::buffer_pool_manager::BufferPoolManager;
use heapbase::storage::disk::disk_manager::DiskManager;
use heapbase::storage::heap::heap_file::HeapFile;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let config = DbConfig::load()?;
    log::info!(
        "heapbase starting: pool_size={} db_path={}",
        config.pool_size,
        config.db_path
    );

    let disk_manager = DiskManager::new_with_handle(&config.db_path)?;
    let bpm = BufferPoolManager::builder()
        .pool_size(config.pool_size)
        .disk_manager(Arc::clone(&disk_manager))
        .build_with_handle();

    let scratch = HeapFile::open(Some("scratch"), Arc::clone(&bpm), Arc::clone(&disk_manager))?;
    let rid = scratch.insert_record(b"hello, heapbase")?;
    let bytes = scratch.select_record(rid)?;
    log::info!(
        "round-tripped record {rid}: {:?}",
        String::from_utf8_lossy(&bytes)
    );
    log::info!("record count in 'scratch': {}", scratch.get_rec_cnt()?);

    bpm.lock().unwrap().flush_all_pages()?;
    Ok(())
}
