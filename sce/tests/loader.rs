//! End-to-end exercises of the asynchronous load-request path: event
//! in, worker, attention, event out.

use std::io::Write;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tempfile::NamedTempFile;

use zinc_core::attn::{attn_channel, EventClass};
use zinc_core::config::{LoaderFiles, FILE_CONFIG, FILE_SCSIBOOT};
use zinc_core::mem::{MainStorage, SharedStorage, PAGE_SIZE};
use zinc_sce::engine::LoadRequestEngine;
use zinc_sce::protocol::{read_event, write_event, HwlRequestBlock, Response, HWL_BLOCK_LEN};

const STORAGE_PAGES: usize = 64;

struct Harness {
    storage: SharedStorage,
    files: Arc<RwLock<LoaderFiles>>,
    engine: Arc<LoadRequestEngine>,
    attn: Receiver<EventClass>,
}

fn harness() -> Harness {
    let storage = MainStorage::new_shared(STORAGE_PAGES * PAGE_SIZE).unwrap();
    let files = Arc::new(RwLock::new(LoaderFiles::new()));
    let (tx, rx) = attn_channel();
    let engine = LoadRequestEngine::new(Arc::clone(&storage), Arc::clone(&files), tx);
    Harness {
        storage,
        files,
        engine,
        attn: rx,
    }
}

impl Harness {
    fn await_attn(&self) {
        assert_eq!(
            self.attn.recv_timeout(Duration::from_secs(10)).unwrap(),
            EventClass::HardwareLoader
        );
    }

    /// Drain the completed request back out of the engine.
    fn result(&self) -> HwlRequestBlock {
        let mut out = [0u8; HWL_BLOCK_LEN];
        assert_eq!(read_event(&self.engine, &mut out), Response::Complete);
        HwlRequestBlock::parse(&out).unwrap()
    }
}

fn request(req_type: u8, file: u8, asa: u8, asce: u64, size: u32) -> [u8; HWL_BLOCK_LEN] {
    let mut data = [0u8; HWL_BLOCK_LEN];
    data[0x00] = req_type;
    data[0x01] = file;
    data[0x10] = asa;
    data[0x12..0x1a].copy_from_slice(&asce.to_be_bytes());
    data[0x26..0x2a].copy_from_slice(&size.to_be_bytes());
    data
}

fn file_of_len(len: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&vec![0xa5u8; len]).unwrap();
    file.flush().unwrap();
    file
}

fn put_entry(storage: &SharedStorage, addr: u64, entry: u64) {
    storage.write().dma_write(addr, &entry.to_be_bytes()).unwrap();
}

/// Mark every 8-byte entry of a one-page table invalid. Freshly zeroed
/// storage reads as all-valid table entries, which is never what a
/// test means.
fn invalidate_table(storage: &SharedStorage, addr: u64, invalid_bit: u64) {
    for i in 0..(PAGE_SIZE as u64 / 8) {
        put_entry(storage, addr + i * 8, invalid_bit);
    }
}

const REGSEG_INVALID: u64 = 0x20;
const PAGETAB_INVALID: u64 = 0x400;
const TT_R3TABL: u64 = 0x04;

#[test]
fn info_reports_size_in_whole_pages() {
    let h = harness();
    let exact = file_of_len(PAGE_SIZE);
    h.files
        .write()
        .set_path(FILE_CONFIG, Some(exact.path().to_path_buf()));

    let data = request(0x02, FILE_CONFIG, 0, 0, 0);
    assert_eq!(write_event(&h.engine, &data), Response::Complete);
    h.await_attn();
    assert_eq!(h.result().size, 1);

    let over = file_of_len(PAGE_SIZE + 1);
    h.files
        .write()
        .set_path(FILE_CONFIG, Some(over.path().to_path_buf()));
    assert_eq!(write_event(&h.engine, &data), Response::Complete);
    h.await_attn();
    assert_eq!(h.result().size, 2);

    // The result is edge-triggered; a second read finds nothing.
    let mut out = [0u8; HWL_BLOCK_LEN];
    assert_eq!(read_event(&h.engine, &mut out), Response::Backout);
}

#[test]
fn info_for_unconfigured_file_type_reports_zero() {
    let h = harness();
    let data = request(0x02, 0x05, 0, 0, 0);
    assert_eq!(write_event(&h.engine, &data), Response::Complete);
    h.await_attn();
    assert_eq!(h.result().size, 0);
}

#[test]
fn reset_and_unknown_request_types_back_out() {
    let h = harness();
    assert_eq!(
        write_event(&h.engine, &request(0x01, FILE_CONFIG, 0, 0, 0)),
        Response::Backout
    );
    assert_eq!(
        write_event(&h.engine, &request(0x7f, FILE_CONFIG, 0, 0, 0)),
        Response::Backout
    );
    // Neither left a result behind.
    let mut out = [0u8; HWL_BLOCK_LEN];
    assert_eq!(read_event(&h.engine, &mut out), Response::Backout);
}

#[test]
fn load_fills_frames_through_the_guest_tables() {
    let h = harness();
    let image = file_of_len(9000);
    h.files
        .write()
        .set_path(FILE_SCSIBOOT, Some(image.path().to_path_buf()));

    // Region-third table at 0x1000 -> segment table at 0x2000 ->
    // page table at 0x3000 -> frames 0x10000..0x12000.
    invalidate_table(&h.storage, 0x1000, REGSEG_INVALID);
    invalidate_table(&h.storage, 0x2000, REGSEG_INVALID);
    invalidate_table(&h.storage, 0x3000, PAGETAB_INVALID);
    put_entry(&h.storage, 0x1000, 0x2000 | TT_R3TABL);
    put_entry(&h.storage, 0x2000, 0x3000);
    put_entry(&h.storage, 0x3000, 0x10000);
    put_entry(&h.storage, 0x3008, 0x11000);
    put_entry(&h.storage, 0x3010, 0x12000);

    let data = request(0x00, FILE_SCSIBOOT, 0x01, 0x1000 | TT_R3TABL, 3);
    assert_eq!(write_event(&h.engine, &data), Response::Complete);
    h.await_attn();
    let _ = h.result();

    let st = h.storage.read();
    let mut buf = [0u8; PAGE_SIZE];
    st.dma_read(0x10000, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0xa5));
    // The last page is the 808-byte file tail, zero-padded.
    st.dma_read(0x12000, &mut buf).unwrap();
    assert!(buf[..9000 - 2 * PAGE_SIZE].iter().all(|&b| b == 0xa5));
    assert!(buf[9000 - 2 * PAGE_SIZE..].iter().all(|&b| b == 0x00));
    // No fourth frame was touched.
    st.dma_read(0x13000, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0x00));
    assert_ne!(st.storage_key(0x10000), 0);
}

#[test]
fn second_request_backs_out_while_the_worker_runs() {
    let h = harness();
    let image = file_of_len(100);
    h.files
        .write()
        .set_path(FILE_CONFIG, Some(image.path().to_path_buf()));

    // Stall the worker on its first storage access.
    let guard = h.storage.write();

    let data = request(0x00, FILE_CONFIG, 0x01, (STORAGE_PAGES * PAGE_SIZE) as u64, 1);
    assert_eq!(write_event(&h.engine, &data), Response::Complete);
    assert_eq!(write_event(&h.engine, &data), Response::Backout);
    // No result either while busy.
    let mut out = [0u8; HWL_BLOCK_LEN];
    assert_eq!(read_event(&h.engine, &mut out), Response::Backout);

    drop(guard);
    h.await_attn();
    let _ = h.result();

    // Idle again: the next request is accepted.
    assert_eq!(write_event(&h.engine, &data), Response::Complete);
    h.await_attn();
    let _ = h.result();
}
