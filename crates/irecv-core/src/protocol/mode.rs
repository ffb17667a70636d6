//! Bootloader mode, identified by USB product ID.

use std::fmt;

use super::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Normal,
    Recovery,
    Wtf,
    Dfu,
    Unknown,
}

impl DeviceMode {
    /// Modes tried at connect time, highest priority first.
    pub const PROBE_ORDER: [DeviceMode; 3] =
        [DeviceMode::Recovery, DeviceMode::Wtf, DeviceMode::Dfu];

    pub fn from_product_id(pid: u16) -> Self {
        match pid {
            NORMAL_MODE_PID => DeviceMode::Normal,
            RECOVERY_MODE_PID => DeviceMode::Recovery,
            WTF_MODE_PID => DeviceMode::Wtf,
            DFU_MODE_PID => DeviceMode::Dfu,
            _ => DeviceMode::Unknown,
        }
    }

    pub fn product_id(&self) -> Option<u16> {
        match self {
            DeviceMode::Normal => Some(NORMAL_MODE_PID),
            DeviceMode::Recovery => Some(RECOVERY_MODE_PID),
            DeviceMode::Wtf => Some(WTF_MODE_PID),
            DeviceMode::Dfu => Some(DFU_MODE_PID),
            DeviceMode::Unknown => None,
        }
    }

    /// Whether file-send uses the bulk path (iBoot) rather than DFU control transfers.
    pub fn uses_bulk_transfer(&self) -> bool {
        !matches!(self, DeviceMode::Dfu | DeviceMode::Wtf)
    }

    /// Packet size for file-send in this mode.
    pub fn packet_size(&self) -> usize {
        if self.uses_bulk_transfer() {
            RECOVERY_PACKET_SIZE
        } else {
            DFU_PACKET_SIZE
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Normal => write!(f, "Normal"),
            DeviceMode::Recovery => write!(f, "Recovery"),
            DeviceMode::Wtf => write!(f, "WTF"),
            DeviceMode::Dfu => write!(f, "DFU"),
            DeviceMode::Unknown => write!(f, "Unknown"),
        }
    }
}
