//! Protocol module - Apple bootloader USB protocol definitions.

pub mod checksum;
pub mod constants;
pub mod mode;
pub mod request;
pub mod status;
pub mod trailer;

pub use checksum::DfuChecksum;
pub use constants::*;
pub use mode::DeviceMode;
pub use request::{ControlSetup, Direction, RequestKind, RequestRecipient};
pub use status::DeviceStatus;
pub use trailer::ChecksumTrailer;
