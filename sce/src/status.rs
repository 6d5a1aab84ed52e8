//! Store-status data capture.
//!
//! The dump path snapshots the low region of main storage before the
//! dump program overwrites it. The snapshot lives on the host side
//! until the dump program asks for it back through the service-data
//! interface.

use log::info;
use parking_lot::RwLock;

use zinc_core::mem::MainStorage;

/// Upper bound on the captured region, 32 MiB.
pub const STORE_STATUS_MAX: u64 = 0x0200_0000;

/// Holds one snapshot of low storage at a time. A new save replaces
/// any earlier one.
#[derive(Default)]
pub struct StoreStatus {
    hsa: Option<Vec<u8>>,
}

impl StoreStatus {
    pub fn new() -> Self {
        StoreStatus::default()
    }

    /// Snapshot storage from address zero, capped at
    /// [`STORE_STATUS_MAX`].
    pub fn save(&mut self, storage: &RwLock<MainStorage>) {
        let st = storage.read();
        let len = st.size().min(STORE_STATUS_MAX) as usize;
        let mut buf = vec![0u8; len];
        // The range is within the image by construction.
        if st.dma_read(0, &mut buf).is_ok() {
            info!(target: "SDIAS", "saved {len:#x} bytes of low storage");
            self.hsa = Some(buf);
        }
    }

    /// The saved snapshot, if one exists.
    pub fn data(&self) -> Option<&[u8]> {
        self.hsa.as_deref()
    }

    /// Discard the snapshot.
    pub fn clear(&mut self) {
        self.hsa = None;
    }
}
