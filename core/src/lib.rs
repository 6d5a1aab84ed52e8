//! Shared machine state for the zinc emulator: the guest main-storage
//! image, the asynchronous attention channel to the service element,
//! and the loader configuration set from the console.

pub mod attn;
pub mod config;
pub mod mem;
