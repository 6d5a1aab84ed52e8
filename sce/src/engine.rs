//! The single-flight load-request engine.
//!
//! Each accepted request runs on its own short-lived worker thread; the
//! worker may block on file I/O but never holds up a processor thread.
//! The Busy/pending pair lives behind one mutex so that a submission
//! racing a completing worker is either cleanly rejected or cleanly
//! accepted, and so that two concurrent drains cannot both take the
//! same result.

use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use log::{error, info};
use parking_lot::{Mutex, RwLock};

use zinc_core::attn::{AttnSender, EventClass};
use zinc_core::config::LoaderFiles;
use zinc_core::mem::{SharedStorage, PAGE_SIZE};

use crate::arch::ArchMode;
use crate::protocol::{HwlRequestBlock, RequestKind};
use crate::walk::walk_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Busy,
}

struct EngineState {
    phase: Phase,
    worker: Option<thread::JoinHandle<()>>,
    pending: Option<HwlRequestBlock>,
}

/// Accepts hardware-loader requests from the service element and runs
/// each one on a background worker. At most one request is in flight;
/// a second submission is rejected, never queued.
pub struct LoadRequestEngine {
    storage: SharedStorage,
    files: Arc<RwLock<LoaderFiles>>,
    attn: AttnSender,
    state: Mutex<EngineState>,
}

impl LoadRequestEngine {
    pub fn new(
        storage: SharedStorage,
        files: Arc<RwLock<LoaderFiles>>,
        attn: AttnSender,
    ) -> Arc<Self> {
        Arc::new(LoadRequestEngine {
            storage,
            files,
            attn,
            state: Mutex::new(EngineState {
                phase: Phase::Idle,
                worker: None,
                pending: None,
            }),
        })
    }

    /// Submit a request. Returns `false` (reject) while a worker is
    /// active or when the request type is not serviceable; `true` means
    /// the worker was started and a result will eventually be pending.
    pub fn submit(self: &Arc<Self>, request: HwlRequestBlock) -> bool {
        let mut state = self.state.lock();

        if state.phase == Phase::Busy {
            return false;
        }

        match request.kind() {
            Some(RequestKind::Info) | Some(RequestKind::Load) => {}
            _ => {
                error!(
                    target: "HWL",
                    "unknown hardware loader request type {:02X}", request.req_type
                );
                return false;
            }
        }

        state.pending = None;
        state.phase = Phase::Busy;

        // The worker's own state updates wait behind this lock until
        // the handle is stored.
        let engine = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("hwl".into())
            .spawn(move || engine.run(request));
        match spawned {
            Ok(handle) => {
                state.worker = Some(handle);
                true
            }
            Err(err) => {
                error!(target: "HWL", "cannot create loader thread: {err}");
                state.phase = Phase::Idle;
                false
            }
        }
    }

    /// Consume the pending result. `None` while the worker is still
    /// active (the protocol layer answers BACKOUT) and again once a
    /// result has been drained.
    pub fn drain_if_ready(&self) -> Option<HwlRequestBlock> {
        let mut state = self.state.lock();
        if state.phase == Phase::Busy {
            return None;
        }
        if let Some(handle) = state.worker.take() {
            let _ = handle.join();
        }
        state.pending.take()
    }

    fn run(self: Arc<Self>, mut request: HwlRequestBlock) {
        self.service(&mut request);

        let mut state = self.state.lock();
        state.phase = Phase::Idle;
        state.pending = Some(request);
        drop(state);

        self.attn.raise(EventClass::HardwareLoader);
    }

    fn service(&self, request: &mut HwlRequestBlock) {
        let path: Option<PathBuf> = self
            .files
            .read()
            .path(request.file)
            .map(Path::to_path_buf);
        let Some(path) = path else {
            error!(
                target: "HWL",
                "hardware loader file type {} not supported", request.file
            );
            if request.kind() == Some(RequestKind::Info) {
                request.size = 0;
            }
            return;
        };

        match request.kind() {
            Some(RequestKind::Info) => self.file_info(request, &path),
            Some(RequestKind::Load) => self.load_file(request, &path),
            // submit() only lets INFO and LOAD through.
            _ => {}
        }
    }

    /// INFO: report the file size rounded up to whole 4K pages.
    fn file_info(&self, request: &mut HwlRequestBlock, path: &Path) {
        match fs::metadata(path) {
            Ok(md) => {
                request.size = md.len().div_ceil(PAGE_SIZE as u64) as u32;
            }
            Err(err) => {
                error!(target: "HWL", "hardware loader {}: {err}", path.display());
                request.size = 0;
            }
        }
    }

    /// LOAD: walk the guest's translation tables from the request's
    /// root and fill the valid frames with file data.
    fn load_file(&self, request: &HwlRequestBlock, path: &Path) {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                error!(target: "HWL", "{} open error: {err}", path.display());
                return;
            }
        };
        info!(target: "HWL", "loading {}", path.display());

        let asce = request.asce;
        if asce >= self.storage.read().size() {
            error!(target: "HWL", "asce is outside of main storage");
            return;
        }

        let mode = if request.asa == 0 {
            ArchMode::Esa390
        } else {
            ArchMode::ZArch
        };

        let mut pages = request.size;
        if let Some(depth) = mode.walk_depth(asce) {
            walk_table(&self.storage, mode, asce, depth, &mut file, &mut pages);
        }
    }
}
