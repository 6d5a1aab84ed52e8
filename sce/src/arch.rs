//! Dynamic-address-translation table formats.
//!
//! A load request selects one of two addressing modes. The 31-bit mode
//! uses 4-byte table entries below a segment-table designation; the
//! 64-bit mode uses 8-byte entries below an address-space-control
//! element whose designation-type bits say how many region-table
//! levels sit above the segment table.

use anyhow::Result;

use zinc_core::mem::MainStorage;

/// Invalid bit in region and segment table entries.
pub const REGSEG_INVALID: u64 = 0x20;

/// Invalid bit in page table entries.
pub const PAGETAB_INVALID: u64 = 0x400;

/// Table-type bits of a region or segment table entry.
pub const TT_MASK: u64 = 0x0c;
pub const TT_SEGTAB: u64 = 0x00;
pub const TT_R3TABL: u64 = 0x04;
pub const TT_R2TABL: u64 = 0x08;
pub const TT_R1TABL: u64 = 0x0c;

/// Table-length bits: length 0 means 512 entries, 1 means 1024, up to
/// a hardware maximum of 2048.
pub const TABLE_LENGTH: u64 = 0x03;

/// Designation-type bits of an address-space-control element.
pub const ASCE_DT: u64 = 0x0c;

/// Addressing mode of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchMode {
    /// 31-bit mode, 4-byte table entries.
    Esa390,
    /// 64-bit mode, 8-byte table entries.
    ZArch,
}

impl ArchMode {
    /// Width of one translation-table entry.
    pub fn entry_size(self) -> u64 {
        match self {
            ArchMode::Esa390 => 4,
            ArchMode::ZArch => 8,
        }
    }

    /// Region/segment-table origin: control bits masked off.
    pub fn table_origin(self, entry: u64) -> u64 {
        match self {
            ArchMode::Esa390 => entry & 0x7fff_f000,
            ArchMode::ZArch => entry & !0xfff,
        }
    }

    /// Page-table origin carried by a leaf segment-table entry.
    pub fn page_table_origin(self, entry: u64) -> u64 {
        match self {
            ArchMode::Esa390 => entry & 0x7fff_ffc0,
            ArchMode::ZArch => entry & !0x7ff,
        }
    }

    /// Page-frame real address carried by a page-table entry.
    pub fn frame_address(self, entry: u64) -> u64 {
        match self {
            ArchMode::Esa390 => entry & 0x7fff_f000,
            ArchMode::ZArch => entry & !0xfff,
        }
    }

    /// Number of region-table levels above the segment table for this
    /// root designation. `None` means the designation cannot be walked
    /// in this mode.
    pub fn walk_depth(self, asce: u64) -> Option<u32> {
        match self {
            ArchMode::Esa390 => (asce & ASCE_DT == TT_SEGTAB).then_some(0),
            ArchMode::ZArch => Some(match asce & ASCE_DT {
                TT_R1TABL => 3,
                TT_R2TABL => 2,
                TT_R3TABL => 1,
                _ => 0,
            }),
        }
    }

    /// Big-endian fetch of one table entry from guest storage.
    pub fn fetch_entry(self, storage: &MainStorage, addr: u64) -> Result<u64> {
        match self {
            ArchMode::Esa390 => Ok(storage.read32(addr)? as u64),
            ArchMode::ZArch => storage.read64(addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_depth_follows_designation_type() {
        assert_eq!(ArchMode::ZArch.walk_depth(0x1000 | TT_R1TABL), Some(3));
        assert_eq!(ArchMode::ZArch.walk_depth(0x1000 | TT_R2TABL), Some(2));
        assert_eq!(ArchMode::ZArch.walk_depth(0x1000 | TT_R3TABL), Some(1));
        assert_eq!(ArchMode::ZArch.walk_depth(0x1000), Some(0));
        assert_eq!(ArchMode::Esa390.walk_depth(0x1000), Some(0));
        assert_eq!(ArchMode::Esa390.walk_depth(0x1000 | TT_R3TABL), None);
    }

    #[test]
    fn masks_strip_control_bits() {
        let entry = 0x0000_0001_2345_6fff;
        assert_eq!(ArchMode::ZArch.table_origin(entry), 0x0000_0001_2345_6000);
        assert_eq!(ArchMode::ZArch.page_table_origin(entry), 0x0000_0001_2345_6800);
        assert_eq!(ArchMode::ZArch.frame_address(entry), 0x0000_0001_2345_6000);
        assert_eq!(ArchMode::Esa390.table_origin(0x8234_5fff), 0x0234_5000);
        assert_eq!(ArchMode::Esa390.page_table_origin(0x1234_5fff), 0x1234_5fc0);
    }
}
