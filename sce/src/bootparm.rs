//! Boot-parameter block construction.
//!
//! Before the bootstrap loader gets control, the IPL path stages a
//! fixed-layout descriptor plus a generated IPL control script at a
//! reserved guest address. Guest firmware reads it through IPL CCW2.
//! The block is fully regenerated on every boot attempt; rebuilding
//! with the same inputs reproduces the same bytes.

use std::fmt::Write as _;

use anyhow::{bail, Result};
use parking_lot::RwLock;

use zinc_core::config::IplSlot;
use zinc_core::mem::{MainStorage, PAGE_SIZE};

/// Fixed guest real address of the boot-parameter block.
pub const BOOT_PARM_ADDR: u64 = 0x01ff_d000;

/// Load/dump indicator codes.
pub const LDIND_LOAD: u8 = 0x10;
pub const LDIND_DUMP: u8 = 0x20;

/// Fixed header size; the parameter string follows immediately.
pub const HEADER_LEN: usize = 0x284;

/// Parameter strings are truncated to this many bytes at use time.
pub const SCP_DATA_MAX: usize = 256;

// Header field offsets.
const XML_OFF: usize = 0x000;
const SCP_OFF: usize = 0x008;
const LDIND_OFF: usize = 0x148;
const DEVNO_OFF: usize = 0x14e;
const WWPN_OFF: usize = 0x154;
const LUN_OFF: usize = 0x15c;
const PROG_OFF: usize = 0x164;
const BRLBA_OFF: usize = 0x174;
const SCP_LEN_OFF: usize = 0x17c;

/// Guest address of IPL CCW2, pointed at the parameter block.
const IPL_CCW2: u64 = 0x10;

/// Build the boot-parameter block for `slot` and store it at
/// [`BOOT_PARM_ADDR`]. Fails before any storage write when the image
/// cannot hold the reserved page.
pub fn store_boot_parms(
    storage: &RwLock<MainStorage>,
    slot: &IplSlot,
    devno: u16,
    dump: bool,
) -> Result<()> {
    if storage.read().size() < BOOT_PARM_ADDR + PAGE_SIZE as u64 {
        bail!("main storage too small for the boot parameter block");
    }

    let mut block = vec![0u8; PAGE_SIZE];

    block[LDIND_OFF] = if dump { LDIND_DUMP } else { LDIND_LOAD };
    block[DEVNO_OFF..DEVNO_OFF + 2].copy_from_slice(&devno.to_be_bytes());
    block[WWPN_OFF..WWPN_OFF + 8].copy_from_slice(&slot.wwpn.to_be_bytes());
    block[LUN_OFF..LUN_OFF + 8].copy_from_slice(&slot.lun.to_be_bytes());
    block[PROG_OFF..PROG_OFF + 4].copy_from_slice(&slot.prog.to_be_bytes());
    block[BRLBA_OFF..BRLBA_OFF + 8].copy_from_slice(&slot.br_lba.to_be_bytes());

    let scpdata = slot.scpdata.as_deref().unwrap_or("");
    let scp_len = scpdata.len().min(SCP_DATA_MAX);
    if scp_len > 0 {
        block[SCP_LEN_OFF..SCP_LEN_OFF + 4].copy_from_slice(&(scp_len as u32).to_be_bytes());
        block[HEADER_LEN..HEADER_LEN + scp_len].copy_from_slice(&scpdata.as_bytes()[..scp_len]);
    }

    // Pad the parameter data to the next 8-byte boundary; the script
    // and the trailing-descriptor offset are functions of the padded
    // length.
    let padded = (scp_len + 7) & !7;
    let xml_at = HEADER_LEN + padded;
    block[XML_OFF..XML_OFF + 4].copy_from_slice(&(xml_at as u32).to_be_bytes());
    block[SCP_OFF..SCP_OFF + 4].copy_from_slice(&((xml_at - 8) as u32).to_be_bytes());

    let script = ipl_script(slot, devno, dump);
    if xml_at + script.len() > block.len() {
        bail!("IPL control script does not fit in the boot parameter block");
    }
    block[xml_at..xml_at + script.len()].copy_from_slice(script.as_bytes());

    let st = &mut *storage.write();
    st.dma_write(BOOT_PARM_ADDR, &block)?;
    st.dma_write(IPL_CCW2, &BOOT_PARM_ADDR.to_be_bytes())?;
    Ok(())
}

/// Generate the textual IPL control script that trails the block.
fn ipl_script(slot: &IplSlot, devno: u16, dump: bool) -> String {
    let mut xml = String::with_capacity(1024);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<eServer_ipl_script version=\"1.0\">\n");
    let _ = writeln!(xml, "<type>{}</type>", if dump { "dump" } else { "ipl" });
    xml.push_str("<ipl_control_section id=\"zincipl-1\">\n");
    xml.push_str("<ipl_platform_loader>\n");
    xml.push_str("<fcp_ipl>\n");
    let _ = writeln!(xml, "<devno>0x{devno:04X}</devno>");
    let _ = writeln!(xml, "<wwpn>0x{:016X}</wwpn>", slot.wwpn);
    let _ = writeln!(xml, "<lun>0x{:016X}</lun>", slot.lun);
    let _ = writeln!(
        xml,
        "<boot_program_selector>0x{:08X}</boot_program_selector>",
        slot.prog
    );
    let _ = writeln!(xml, "<br_lba>0x{:016X}</br_lba>", slot.br_lba);
    xml.push_str("</fcp_ipl>\n");
    xml.push_str("</ipl_platform_loader>\n");
    if let Some(scpdata) = slot.scpdata.as_deref().filter(|s| !s.is_empty()) {
        xml.push_str("<system_control_program>\n");
        let _ = writeln!(xml, "<parameter_string>{scpdata}</parameter_string>");
        xml.push_str("</system_control_program>\n");
    }
    xml.push_str("</ipl_control_section>\n");
    xml.push_str("</eServer_ipl_script>\n");
    xml
}
