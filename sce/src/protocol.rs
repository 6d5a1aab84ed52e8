//! Fixed-layout request/response blocks exchanged with the service
//! element. All multi-byte numeric fields are big-endian.
//!
//! The service element sees exactly two outcomes, COMPLETE and
//! BACKOUT; everything finer-grained stays in the log.

use std::sync::Arc;

use anyhow::{bail, Result};
use log::{error, info};

use crate::engine::LoadRequestEngine;

/// Hardware-load request type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Load,
    Reset,
    Info,
}

impl RequestKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(RequestKind::Load),
            0x01 => Some(RequestKind::Reset),
            0x02 => Some(RequestKind::Info),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RequestKind::Load => "LOAD",
            RequestKind::Reset => "RESET",
            RequestKind::Info => "INFO",
        }
    }
}

/// Length of the hardware-load request block.
pub const HWL_BLOCK_LEN: usize = 0x2a;

// Field offsets within the block.
const TYPE_OFF: usize = 0x00;
const FILE_OFF: usize = 0x01;
const BLKPTR_OFF: usize = 0x0a;
const ASA_OFF: usize = 0x10;
const ASCE_OFF: usize = 0x12;
const SIZE_OFF: usize = 0x26;

/// In-memory copy of a hardware-load request block. Created by copy at
/// submission time; the worker owns it until the result is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwlRequestBlock {
    pub req_type: u8,
    /// File-type selector.
    pub file: u8,
    /// Guest address of the request block itself.
    pub block_ptr: u32,
    /// Addressing-mode byte; zero selects the 31-bit fixed format.
    pub asa: u8,
    /// Address-space-control element: translation root plus control
    /// bits.
    pub asce: u64,
    /// Size in 4K pages. Input for LOAD, output for INFO.
    pub size: u32,
}

impl HwlRequestBlock {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HWL_BLOCK_LEN {
            bail!("hardware loader block truncated: {} bytes", data.len());
        }
        Ok(HwlRequestBlock {
            req_type: data[TYPE_OFF],
            file: data[FILE_OFF],
            block_ptr: u32::from_be_bytes(data[BLKPTR_OFF..BLKPTR_OFF + 4].try_into().unwrap()),
            asa: data[ASA_OFF],
            asce: u64::from_be_bytes(data[ASCE_OFF..ASCE_OFF + 8].try_into().unwrap()),
            size: u32::from_be_bytes(data[SIZE_OFF..SIZE_OFF + 4].try_into().unwrap()),
        })
    }

    /// Store the block back into an event buffer, reserved bytes
    /// zeroed.
    pub fn store(&self, out: &mut [u8]) -> Result<()> {
        if out.len() < HWL_BLOCK_LEN {
            bail!("hardware loader block buffer too small: {} bytes", out.len());
        }
        let out = &mut out[..HWL_BLOCK_LEN];
        out.fill(0);
        out[TYPE_OFF] = self.req_type;
        out[FILE_OFF] = self.file;
        out[BLKPTR_OFF..BLKPTR_OFF + 4].copy_from_slice(&self.block_ptr.to_be_bytes());
        out[ASA_OFF] = self.asa;
        out[ASCE_OFF..ASCE_OFF + 8].copy_from_slice(&self.asce.to_be_bytes());
        out[SIZE_OFF..SIZE_OFF + 4].copy_from_slice(&self.size.to_be_bytes());
        Ok(())
    }

    pub fn kind(&self) -> Option<RequestKind> {
        RequestKind::from_code(self.req_type)
    }
}

/// Guest-visible outcome of a protocol operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Complete,
    Backout,
}

impl Response {
    /// Response code stored in the control-block header.
    pub fn code(self) -> u16 {
        match self {
            Response::Complete => 0x0020,
            Response::Backout => 0x0040,
        }
    }
}

/// Write-event path: extract the request block from the event data and
/// hand it to the engine. BACKOUT covers a busy engine, a malformed
/// block and an unserviceable request type alike.
pub fn write_event(engine: &Arc<LoadRequestEngine>, data: &[u8]) -> Response {
    let request = match HwlRequestBlock::parse(data) {
        Ok(request) => request,
        Err(err) => {
            error!(target: "HWL", "{err}");
            return Response::Backout;
        }
    };

    info!(
        target: "HWL",
        "hardware loader: {} request",
        request.kind().map(RequestKind::name).unwrap_or("unknown")
    );

    if engine.submit(request) {
        Response::Complete
    } else {
        Response::Backout
    }
}

/// Read-event path: surface the pending result if the engine has one.
/// BACKOUT while the worker is still active or when nothing is pending.
pub fn read_event(engine: &LoadRequestEngine, out: &mut [u8]) -> Response {
    match engine.drain_if_ready() {
        Some(block) => match block.store(out) {
            Ok(()) => Response::Complete,
            Err(err) => {
                error!(target: "HWL", "{err}");
                Response::Backout
            }
        },
        None => Response::Backout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_fields_at_their_offsets() {
        let mut data = [0u8; HWL_BLOCK_LEN];
        data[0x00] = 0x02; // INFO
        data[0x01] = 0x02; // scsiboot
        data[0x0a..0x0e].copy_from_slice(&0x0000_2000u32.to_be_bytes());
        data[0x10] = 0x01;
        data[0x12..0x1a].copy_from_slice(&0x0000_0000_0001_0004u64.to_be_bytes());
        data[0x26..0x2a].copy_from_slice(&3u32.to_be_bytes());

        let block = HwlRequestBlock::parse(&data).unwrap();
        assert_eq!(block.kind(), Some(RequestKind::Info));
        assert_eq!(block.file, 0x02);
        assert_eq!(block.block_ptr, 0x2000);
        assert_eq!(block.asa, 0x01);
        assert_eq!(block.asce, 0x0001_0004);
        assert_eq!(block.size, 3);

        let mut out = [0xffu8; HWL_BLOCK_LEN];
        block.store(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn truncated_block_is_rejected() {
        assert!(HwlRequestBlock::parse(&[0u8; HWL_BLOCK_LEN - 1]).is_err());
        let block = HwlRequestBlock::parse(&[0u8; HWL_BLOCK_LEN]).unwrap();
        assert!(block.store(&mut [0u8; 4]).is_err());
    }

    #[test]
    fn response_codes() {
        assert_eq!(Response::Complete.code(), 0x0020);
        assert_eq!(Response::Backout.code(), 0x0040);
    }
}
