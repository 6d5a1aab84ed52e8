//! Guest main storage.
//!
//! The main-storage image is shared between all processor-emulation
//! threads and the service element. Most addresses handed to these
//! accessors are computed from guest-controlled data (table origins,
//! frame addresses), so every access is validated against the image
//! size immediately before use; an out-of-range access fails, it is
//! never clamped.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use memmap::MmapMut;
use parking_lot::RwLock;

/// Size of one storage frame.
pub const PAGE_SIZE: usize = 4096;

/// Storage-key reference bit.
pub const STORKEY_REF: u8 = 0x04;
/// Storage-key change bit.
pub const STORKEY_CHANGE: u8 = 0x02;

/// Main storage as shared by processor threads and the service element.
pub type SharedStorage = Arc<RwLock<MainStorage>>;

/// The guest main-storage image and its storage-key side table.
pub struct MainStorage {
    mem: MmapMut,
    keys: Vec<AtomicU8>,
}

impl MainStorage {
    /// Allocate a zeroed main-storage image. `size` is rounded up to a
    /// whole number of frames.
    pub fn new(size: usize) -> Result<Self> {
        let size = size.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let mem = MmapMut::map_anon(size)?;
        let keys = (0..size / PAGE_SIZE).map(|_| AtomicU8::new(0)).collect();
        Ok(MainStorage { mem, keys })
    }

    pub fn new_shared(size: usize) -> Result<SharedStorage> {
        Ok(Arc::new(RwLock::new(MainStorage::new(size)?)))
    }

    /// Size of the image in bytes.
    pub fn size(&self) -> u64 {
        self.mem.len() as u64
    }

    fn checked_range(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let end = addr
            .checked_add(len as u64)
            .ok_or_else(|| anyhow!("address {addr:#x}+{len:#x} wraps"))?;
        if end > self.size() {
            bail!("{addr:#x}..{end:#x} is outside of main storage");
        }
        Ok(addr as usize..end as usize)
    }

    /// Big-endian fetch of a 4-byte value.
    pub fn read32(&self, addr: u64) -> Result<u32> {
        let range = self.checked_range(addr, 4)?;
        Ok(u32::from_be_bytes(self.mem[range].try_into().unwrap()))
    }

    /// Big-endian fetch of an 8-byte value.
    pub fn read64(&self, addr: u64) -> Result<u64> {
        let range = self.checked_range(addr, 8)?;
        Ok(u64::from_be_bytes(self.mem[range].try_into().unwrap()))
    }

    /// Copy guest storage out into `buf`.
    pub fn dma_read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.checked_range(addr, buf.len())?;
        buf.copy_from_slice(&self.mem[range]);
        Ok(())
    }

    /// Copy `data` into guest storage.
    pub fn dma_write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        let range = self.checked_range(addr, data.len())?;
        self.mem[range].copy_from_slice(data);
        Ok(())
    }

    /// Atomically OR the reference and change key bits for the frame
    /// containing `addr`. This subsystem sets key bits, it never clears
    /// them.
    pub fn set_ref_change(&self, addr: u64) {
        if let Some(key) = self.keys.get((addr / PAGE_SIZE as u64) as usize) {
            key.fetch_or(STORKEY_REF | STORKEY_CHANGE, Ordering::Relaxed);
        }
    }

    /// Storage key of the frame containing `addr`.
    pub fn storage_key(&self, addr: u64) -> u8 {
        self.keys
            .get((addr / PAGE_SIZE as u64) as usize)
            .map(|key| key.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
