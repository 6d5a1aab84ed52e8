//! The service-element hardware loader.
//!
//! The virtual service processor injects boot images into guest storage
//! by walking the guest's own address-translation tables, and surfaces
//! the operation to the service element through a single-flight
//! asynchronous request protocol. The IPL path uses the same page
//! loading machinery directly to stage the bootstrap loader and its
//! boot-parameter block.

pub mod arch;
pub mod boot;
pub mod bootparm;
pub mod engine;
pub mod protocol;
pub mod status;
pub mod walk;
