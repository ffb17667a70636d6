//! DFU status response parsing.
//!
//! GETSTATUS returns 6 bytes; only `bState` (byte 4) is interpreted.

use std::fmt;

use super::constants::STATUS_RESPONSE_LEN;

/// Offset of the state byte inside a status response.
const STATE_OFFSET: usize = 4;

/// Packet accepted, device ready for the next one.
pub const STATUS_READY: u8 = 5;
/// First execution milestone after the final upload packet.
pub const STATUS_EXEC_1: u8 = 6;
/// Second execution milestone.
pub const STATUS_EXEC_2: u8 = 7;
/// Third execution milestone.
pub const STATUS_EXEC_3: u8 = 8;

/// Milestones required, in order, after an upload completes.
pub const EXECUTION_SEQUENCE: [u8; 3] = [STATUS_EXEC_1, STATUS_EXEC_2, STATUS_EXEC_3];

/// Parsed status response from the device.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    raw: [u8; STATUS_RESPONSE_LEN],
}

impl DeviceStatus {
    /// Parse a status response. Returns `None` unless exactly 6 bytes were read.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; STATUS_RESPONSE_LEN] = bytes.try_into().ok()?;
        Some(Self { raw })
    }

    /// Build a response carrying `code` in the state byte.
    pub const fn from_code(code: u8) -> Self {
        let mut raw = [0u8; STATUS_RESPONSE_LEN];
        raw[STATE_OFFSET] = code;
        Self { raw }
    }

    /// The state byte.
    pub fn code(&self) -> u8 {
        self.raw[STATE_OFFSET]
    }

    /// Whether the device accepted the last packet.
    pub fn is_ready(&self) -> bool {
        self.code() == STATUS_READY
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

impl fmt::Debug for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceStatus(code={} raw={:02X?})", self.code(), self.raw)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_byte() {
        let status = DeviceStatus::from_bytes(&[0, 0, 0, 0, 5, 0]).unwrap();
        assert_eq!(status.code(), STATUS_READY);
        assert!(status.is_ready());
    }

    #[test]
    fn test_short_response_rejected() {
        assert!(DeviceStatus::from_bytes(&[0, 0, 0, 0, 5]).is_none());
        assert!(DeviceStatus::from_bytes(&[]).is_none());
    }

    #[test]
    fn test_long_response_rejected() {
        assert!(DeviceStatus::from_bytes(&[0; 7]).is_none());
    }

    #[test]
    fn test_from_code() {
        let status = DeviceStatus::from_code(STATUS_EXEC_2);
        assert_eq!(status.as_bytes(), &[0, 0, 0, 0, 7, 0]);
        assert!(!status.is_ready());
    }
}
