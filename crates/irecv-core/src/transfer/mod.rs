//! Transfer engine: chunked file-send and upload-and-execute.

pub mod plan;
pub mod send;
pub mod upload;

pub use plan::{Packet, TransferPlan};
pub use send::Finalize;
