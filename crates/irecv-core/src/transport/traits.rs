//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for USB communication,
//! allowing different implementations (nusb, mock, etc.).

use std::time::Duration;

use crate::protocol::ControlSetup;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to set configuration {configuration}: {message}")]
    SetConfigurationFailed { configuration: u8, message: String },

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Failed to select alt setting {alt_setting} on interface {interface}: {message}")]
    AltSettingFailed {
        interface: u8,
        alt_setting: u8,
        message: String,
    },

    #[error("Endpoint 0x{endpoint:02X} not available: {message}")]
    EndpointNotFound { endpoint: u8, message: String },

    #[error("Control transfer failed (bmRequestType=0x{request_type:02X} bRequest={request}): {message}")]
    ControlFailed {
        request_type: u8,
        request: u8,
        message: String,
    },

    #[error("Bulk transfer on endpoint 0x{endpoint:02X} failed: {message}")]
    BulkFailed { endpoint: u8, message: String },

    #[error("Reset failed: {0}")]
    ResetFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Abstract USB transport interface.
///
/// Mirrors the handful of libusb-style primitives the bootloader protocols
/// need: control transfers in both directions, bulk transfers, console
/// interface setup and port reset. Transfer methods report the number of
/// bytes actually moved; interpreting short transfers is up to the caller.
pub trait UsbTransport: Send + Sync {
    /// Host-to-device control transfer. Returns bytes sent.
    fn control_out(
        &self,
        setup: ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Device-to-host control transfer of up to `length` bytes.
    fn control_in(
        &self,
        setup: ControlSetup,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Bulk OUT transfer. Returns bytes sent.
    fn bulk_out(&self, endpoint: u8, data: &[u8], timeout: Duration)
    -> Result<usize, TransportError>;

    /// Bulk IN transfer of up to `max_len` bytes.
    fn bulk_in(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    fn set_configuration(&mut self, configuration: u8) -> Result<(), TransportError>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Select an alternate setting on a previously claimed interface.
    fn set_alt_setting(&mut self, interface: u8, alt_setting: u8) -> Result<(), TransportError>;

    /// Port reset. The device re-enumerates afterwards.
    fn reset(&self) -> Result<(), TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
