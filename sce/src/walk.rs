//! Translation-table walk and page-by-page file loading.
//!
//! The guest hands the loader a translation root and a page count; the
//! loader walks the guest's own tables exactly as hardware would and
//! fills each valid frame with the next page of file data. Every table
//! and frame address comes from guest storage and is bounds-checked
//! before use; the first violation aborts the whole walk.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use log::{error, info};
use parking_lot::RwLock;

use zinc_core::mem::{MainStorage, PAGE_SIZE};

use crate::arch::{ArchMode, PAGETAB_INVALID, REGSEG_INVALID, TABLE_LENGTH, TT_MASK, TT_SEGTAB};

/// Page tables hold at most 256 entries, independent of any length
/// field.
const PAGE_TABLE_ENTRIES: u64 = 256;

/// Fill `buf` from `file`, zero-padding everything past end-of-file.
/// Returns the number of file bytes placed in `buf`.
fn read_page(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    buf[filled..].fill(0);
    Ok(filled)
}

/// Load file data into the valid pages of one page table.
///
/// Entries are processed in ascending order; invalid entries are
/// skipped and do not count against the request. End-of-file is benign:
/// a short read zero-pads the rest of the frame. Returns `true` while
/// pages remain to be loaded, `false` once the request is satisfied or
/// an abort condition was hit; either way the caller stops walking on
/// `false`.
pub(crate) fn load_pages(
    storage: &RwLock<MainStorage>,
    mode: ArchMode,
    pto: u64,
    file: &mut File,
    pages: &mut u32,
) -> bool {
    let mut pto = mode.page_table_origin(pto);
    let mut buf = [0u8; PAGE_SIZE];

    for _ in 0..PAGE_TABLE_ENTRIES {
        if *pages == 0 {
            break;
        }

        let entry = match mode.fetch_entry(&storage.read(), pto) {
            Ok(entry) => entry,
            Err(_) => {
                error!(target: "HWL", "table is outside of main storage");
                return false;
            }
        };

        if entry & PAGETAB_INVALID == 0 {
            let frame = mode.frame_address(entry);

            if frame >= storage.read().size() {
                error!(target: "HWL", "page is outside of main storage");
                return false;
            }

            if let Err(err) = read_page(file, &mut buf) {
                error!(target: "HWL", "I/O error on read(): {err}");
                return false;
            }

            let st = &mut *storage.write();
            if st.dma_write(frame, &buf).is_err() {
                error!(target: "HWL", "page is outside of main storage");
                return false;
            }
            st.set_ref_change(frame);

            *pages -= 1;
        }

        pto += mode.entry_size();
    }

    *pages > 0
}

/// Walk one region or segment table, dispatching each valid entry
/// either to the next-lower table or to the page loader.
///
/// `depth` counts the region-table levels left above the segment
/// table; at zero the current table is the segment table itself and
/// every valid entry names a page table.
pub(crate) fn walk_table(
    storage: &RwLock<MainStorage>,
    mode: ArchMode,
    rto: u64,
    depth: u32,
    file: &mut File,
    pages: &mut u32,
) -> bool {
    // A table length of 0 means 512 entries, 1 means 1024, etc.
    let entries = ((rto & TABLE_LENGTH) + 1) * 512;
    let mut origin = mode.table_origin(rto);
    let mut keep_walking = true;

    for _ in 0..entries {
        if !keep_walking {
            break;
        }

        let entry = match mode.fetch_entry(&storage.read(), origin) {
            Ok(entry) => entry,
            Err(_) => {
                error!(target: "HWL", "table is outside of main storage");
                return false;
            }
        };

        if entry & REGSEG_INVALID == 0 {
            keep_walking = if depth == 0 || entry & TT_MASK == TT_SEGTAB {
                load_pages(storage, mode, entry, file, pages)
            } else {
                walk_table(storage, mode, entry, depth - 1, file, pages)
            };
        }

        origin += mode.entry_size();
    }

    keep_walking
}

/// Single-shot sequential load of a bootstrap image into consecutive
/// real frames starting at `addr`. Used by the IPL path only; the
/// asynchronous engine always goes through the table walk. Returns the
/// number of pages loaded.
pub fn load_image(storage: &RwLock<MainStorage>, path: &Path, addr: u64) -> Result<u32> {
    let mut file =
        File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut addr = addr;
    let mut loaded = 0u32;
    let mut buf = [0u8; PAGE_SIZE];

    loop {
        let n = read_page(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        let st = &mut *storage.write();
        st.dma_write(addr, &buf)?;
        st.set_ref_change(addr);
        loaded += 1;
        addr += PAGE_SIZE as u64;
        if n < PAGE_SIZE {
            break;
        }
    }

    info!(target: "SCSI", "loaded {} ({loaded} pages)", path.display());
    Ok(loaded)
}
