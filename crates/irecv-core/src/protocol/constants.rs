//! Protocol constants for the Apple bootloader USB interface.
//!
//! Values as exposed by iBoot/iBSS in Recovery mode and by the SecureROM
//! in DFU and WTF mode.

// ============================================================================
// Device Identification
// ============================================================================

/// Apple Inc. Vendor ID
pub const APPLE_VENDOR_ID: u16 = 0x05AC;

/// Normal (booted OS) mode. Not connectable by this tool.
pub const NORMAL_MODE_PID: u16 = 0x1290;
/// Recovery mode (iBoot)
pub const RECOVERY_MODE_PID: u16 = 0x1281;
/// WTF mode (pre-DFU stage)
pub const WTF_MODE_PID: u16 = 0x1227;
/// DFU mode (SecureROM)
pub const DFU_MODE_PID: u16 = 0x1222;

// ============================================================================
// bmRequestType values
// ============================================================================

/// Host -> Device, class, interface. DFU DNLOAD and the exploit trigger.
pub const REQ_TYPE_CLASS_OUT: u8 = 0x21;
/// Device -> Host, class, interface. DFU GETSTATUS / GETSTATE.
pub const REQ_TYPE_CLASS_IN: u8 = 0xA1;
/// Host -> Device, vendor, device. iBoot command channel.
pub const REQ_TYPE_VENDOR_OUT: u8 = 0x40;
/// Host -> Device, vendor, interface. Recovery transfer start.
pub const REQ_TYPE_VENDOR_IFACE_OUT: u8 = 0x41;
/// Device -> Host, vendor, device. Environment read-back.
pub const REQ_TYPE_VENDOR_IN: u8 = 0xC0;

// ============================================================================
// bRequest values
// ============================================================================

/// Vendor request 0: command / transfer start / env read.
pub const REQ_COMMAND: u8 = 0;
/// Class request 1: DFU DNLOAD (payload packet).
pub const REQ_DFU_DNLOAD: u8 = 1;
/// Class request 2: exploit trigger.
pub const REQ_EXPLOIT: u8 = 2;
/// Class request 3: DFU GETSTATUS.
pub const REQ_DFU_GETSTATUS: u8 = 3;
/// Class request 5: DFU GETSTATE, used as the transfer-start ack.
pub const REQ_DFU_GETSTATE: u8 = 5;

// ============================================================================
// Endpoints
// ============================================================================

/// Bulk OUT endpoint for Recovery-mode payloads.
pub const BULK_OUT_ENDPOINT: u8 = 0x04;
/// Bulk IN endpoint carrying the Recovery console stream.
pub const CONSOLE_IN_ENDPOINT: u8 = 0x81;

/// Configuration selected before console I/O.
pub const CONSOLE_CONFIGURATION: u8 = 1;
/// Interface carrying the console endpoints.
pub const CONSOLE_INTERFACE: u8 = 1;
/// Alternate setting enabling the console endpoints.
pub const CONSOLE_ALT_SETTING: u8 = 1;

// ============================================================================
// Size Constants
// ============================================================================

/// Packet size on the Recovery bulk path.
pub const RECOVERY_PACKET_SIZE: usize = 0x8000;
/// Packet size on the DFU/WTF control path and for uploads.
pub const DFU_PACKET_SIZE: usize = 0x800;

/// Upper bound (exclusive) on a command, NUL terminator included.
pub const MAX_COMMAND_LEN: usize = 0x200;
/// Size of the environment read-back buffer.
pub const ENV_RESPONSE_LEN: usize = 0x200;
/// Size of a single console bulk read.
pub const CONSOLE_BUFFER_SIZE: usize = 0x10000;

/// Length of a DFU GETSTATUS response.
pub const STATUS_RESPONSE_LEN: usize = 6;

// ============================================================================
// Timeouts and retries (defaults, see `SessionConfig`)
// ============================================================================

/// Timeout for file-send transfers and status polls.
pub const USB_TIMEOUT_MS: u64 = 10_000;
/// Timeout for uploads, commands, exploit and raw requests.
pub const SHORT_TIMEOUT_MS: u64 = 1_000;
/// Console bulk read timeout, short so input can be interleaved.
pub const CONSOLE_TIMEOUT_MS: u64 = 500;

/// Status polls per packet before giving up (first poll included).
pub const STATUS_RETRY_ATTEMPTS: u32 = 20;
/// Pause between status polls.
pub const STATUS_RETRY_INTERVAL_MS: u64 = 1_000;

/// Commands sent by auto-boot, in order.
pub const AUTOBOOT_SEQUENCE: [&str; 3] = ["setenv auto-boot true", "saveenv", "reboot"];
