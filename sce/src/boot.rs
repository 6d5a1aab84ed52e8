//! SCSI boot entry points.
//!
//! An FCP subchannel cannot be IPLed through the channel program path;
//! instead the machine stages a bootstrap loader image at absolute
//! zero and hands it the boot-parameter block describing the target
//! disk.

use std::sync::Arc;

use anyhow::{bail, Result};
use log::error;
use parking_lot::RwLock;

use zinc_core::config::{IplSettings, LoaderFiles, FILE_SCSIBOOT};
use zinc_core::mem::SharedStorage;

use crate::bootparm::store_boot_parms;
use crate::walk::load_image;

// Sense-ID control-unit and device type/model of an FCP subchannel.
const CU_FCP: u32 = 0x0017_3103;
const DEV_FCP: u32 = 0x0017_3203;

fn devid_field(devid: &[u8], at: usize) -> Option<u32> {
    let bytes = devid.get(at..at + 3)?;
    Some(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
}

/// Whether a device can be SCSI-booted. Requires an FCP sense-ID and a
/// configured bootstrap loader; returns the file-type code to load.
pub fn support_boot(files: &RwLock<LoaderFiles>, devid: &[u8]) -> Option<u8> {
    let ct = devid_field(devid, 1)?;
    let dt = devid_field(devid, 4)?;
    if ct != CU_FCP || dt != DEV_FCP {
        return None;
    }
    files.read().path(FILE_SCSIBOOT)?;
    Some(FILE_SCSIBOOT)
}

/// Run the SCSI IPL path: place the bootstrap loader at absolute zero
/// and stage the boot-parameter block for it.
pub fn load_boot(
    storage: &SharedStorage,
    files: &Arc<RwLock<LoaderFiles>>,
    settings: &IplSettings,
    devid: &[u8],
    devno: u16,
    dump: bool,
) -> Result<()> {
    let Some(code) = support_boot(files, devid) else {
        bail!("device {devno:04X} does not support SCSI boot");
    };
    let path = match files.read().path(code) {
        Some(path) => path.to_path_buf(),
        // support_boot just saw the path; the console can clear it
        // between the two reads.
        None => bail!("bootstrap loader file not configured"),
    };

    if let Err(err) = load_image(storage, &path, 0) {
        error!(target: "SCSI", "cannot load bootstrap loader: {err}");
        return Err(err);
    }

    store_boot_parms(storage, settings.slot(dump), devno, dump)
}
