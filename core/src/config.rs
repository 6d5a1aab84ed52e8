//! Loader configuration, owned by the machine context and mutated only
//! from the console layer. The hardware loader and the IPL path read it.

use std::path::{Path, PathBuf};

use fxhash::FxHashMap;
use log::info;

/// Number of supported hardware-loader file types.
pub const MAX_FILE_TYPES: usize = 8;

/// Reserved file-type codes.
pub const FILE_TYPE_1: u8 = 0x01;
pub const FILE_SCSIBOOT: u8 = 0x02;
pub const FILE_CONFIG: u8 = 0x03;

/// Host files the hardware loader may serve, indexed by file-type code.
pub struct LoaderFiles {
    paths: [Option<PathBuf>; MAX_FILE_TYPES],
    names: FxHashMap<&'static str, u8>,
}

impl Default for LoaderFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderFiles {
    pub fn new() -> Self {
        let mut names = FxHashMap::default();
        names.insert("config", FILE_CONFIG);
        names.insert("scsiboot", FILE_SCSIBOOT);
        names.insert("type_1", FILE_TYPE_1);
        LoaderFiles {
            paths: Default::default(),
            names,
        }
    }

    /// Host path configured for a file-type code, if any.
    pub fn path(&self, code: u8) -> Option<&Path> {
        self.paths.get(code as usize).and_then(|p| p.as_deref())
    }

    /// Install or clear the path for a file-type code. Returns `false`
    /// for codes beyond [`MAX_FILE_TYPES`].
    pub fn set_path(&mut self, code: u8, path: Option<PathBuf>) -> bool {
        let name = self.name_for_code(code);
        match self.paths.get_mut(code as usize) {
            Some(slot) => {
                match &path {
                    Some(p) => info!(target: "HWL", "{name} file is {}", p.display()),
                    None => info!(target: "HWL", "{name} file cleared"),
                }
                *slot = path;
                true
            }
            None => false,
        }
    }

    /// Resolve a console-supplied name to a file-type code. Codes
    /// without a reserved name are addressed as `typeN`.
    pub fn code_for_name(&self, name: &str) -> Option<u8> {
        if let Some(&code) = self.names.get(name) {
            return Some(code);
        }
        let n: u8 = name.strip_prefix("type")?.parse().ok()?;
        ((n as usize) < MAX_FILE_TYPES).then_some(n)
    }

    /// Name a file-type code for diagnostics.
    pub fn name_for_code(&self, code: u8) -> String {
        self.names
            .iter()
            .find(|(_, &c)| c == code)
            .map(|(name, _)| (*name).to_owned())
            .unwrap_or_else(|| format!("type{code}"))
    }
}

/// Boot targeting parameters for one IPL slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IplSlot {
    /// Target world-wide port name.
    pub wwpn: u64,
    /// Target logical unit number.
    pub lun: u64,
    /// Boot-program selector.
    pub prog: u32,
    /// Boot-record logical block address.
    pub br_lba: u64,
    /// Operator-supplied parameter string, length-limited at use time.
    pub scpdata: Option<String>,
}

/// The "load" and "dump" IPL slots. The two slots are independent and
/// never aliased.
#[derive(Debug, Clone, Default)]
pub struct IplSettings {
    pub load: IplSlot,
    pub dump: IplSlot,
}

impl IplSettings {
    pub fn slot(&self, dump: bool) -> &IplSlot {
        if dump {
            &self.dump
        } else {
            &self.load
        }
    }

    pub fn slot_mut(&mut self, dump: bool) -> &mut IplSlot {
        if dump {
            &mut self.dump
        } else {
            &mut self.load
        }
    }
}
