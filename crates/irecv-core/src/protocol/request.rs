//! Control request setup packets.

use super::constants::*;

/// Data stage direction, bit 7 of bmRequestType.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

/// Request type, bits 5..6 of bmRequestType.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// Recipient, bits 0..4 of bmRequestType.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRecipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Setup fields of a control transfer, minus wLength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlSetup {
    pub const fn new(request_type: u8, request: u8, value: u16, index: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
        }
    }

    /// DFU DNLOAD carrying packet `index` in wValue.
    pub const fn dnload(index: u16) -> Self {
        Self::new(REQ_TYPE_CLASS_OUT, REQ_DFU_DNLOAD, index, 0)
    }

    pub const fn get_status() -> Self {
        Self::new(REQ_TYPE_CLASS_IN, REQ_DFU_GETSTATUS, 0, 0)
    }

    pub const fn get_state() -> Self {
        Self::new(REQ_TYPE_CLASS_IN, REQ_DFU_GETSTATE, 0, 0)
    }

    pub const fn recovery_start() -> Self {
        Self::new(REQ_TYPE_VENDOR_IFACE_OUT, REQ_COMMAND, 0, 0)
    }

    pub const fn command() -> Self {
        Self::new(REQ_TYPE_VENDOR_OUT, REQ_COMMAND, 0, 0)
    }

    pub const fn env_read() -> Self {
        Self::new(REQ_TYPE_VENDOR_IN, REQ_COMMAND, 0, 0)
    }

    pub const fn exploit() -> Self {
        Self::new(REQ_TYPE_CLASS_OUT, REQ_EXPLOIT, 0, 0)
    }

    pub fn direction(&self) -> Direction {
        if self.request_type & 0x80 != 0 {
            Direction::DeviceToHost
        } else {
            Direction::HostToDevice
        }
    }

    pub fn kind(&self) -> RequestKind {
        match (self.request_type >> 5) & 0x03 {
            0 => RequestKind::Standard,
            1 => RequestKind::Class,
            2 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> RequestRecipient {
        match self.request_type & 0x1F {
            0 => RequestRecipient::Device,
            1 => RequestRecipient::Interface,
            2 => RequestRecipient::Endpoint,
            _ => RequestRecipient::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_class_in() {
        let setup = ControlSetup::get_status();
        assert_eq!(setup.direction(), Direction::DeviceToHost);
        assert_eq!(setup.kind(), RequestKind::Class);
        assert_eq!(setup.recipient(), RequestRecipient::Interface);
    }

    #[test]
    fn test_decode_vendor_out() {
        let setup = ControlSetup::command();
        assert_eq!(setup.direction(), Direction::HostToDevice);
        assert_eq!(setup.kind(), RequestKind::Vendor);
        assert_eq!(setup.recipient(), RequestRecipient::Device);

        let start = ControlSetup::recovery_start();
        assert_eq!(start.recipient(), RequestRecipient::Interface);
    }

    #[test]
    fn test_dnload_carries_index() {
        let setup = ControlSetup::dnload(7);
        assert_eq!(setup.request_type, 0x21);
        assert_eq!(setup.request, 1);
        assert_eq!(setup.value, 7);
    }
}
