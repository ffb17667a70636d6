//! DFU suffix appended to the final packet of a file-send.

use byteorder::{ByteOrder, LittleEndian};

use super::checksum::DfuChecksum;

/// DFU suffix body: bcdDevice, idProduct, idVendor, bcdDFU, "UFD", bLength.
pub const TRAILER_MAGIC: [u8; 12] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xAC, 0x05, 0x00, 0x01, 0x55, 0x46, 0x44, 0x10,
];

/// 12 magic bytes followed by the little-endian running checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumTrailer {
    pub magic: [u8; 12],
    pub checksum: u32,
}

impl ChecksumTrailer {
    pub const SIZE: usize = 16;

    /// Fold the magic into `checksum` and capture the final value.
    pub fn seal(checksum: &mut DfuChecksum) -> Self {
        checksum.update(&TRAILER_MAGIC);
        Self {
            magic: TRAILER_MAGIC,
            checksum: checksum.value(),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..12].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut buf[12..], self.checksum);
        buf
    }

    /// Append the serialized trailer to `packet`.
    pub fn append_to(&self, packet: &mut Vec<u8>) {
        packet.extend_from_slice(&self.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::{CHECKSUM_SEED, step};

    #[test]
    fn test_layout() {
        let trailer = ChecksumTrailer {
            magic: TRAILER_MAGIC,
            checksum: 0x1122_3344,
        };
        let bytes = trailer.to_bytes();
        assert_eq!(&bytes[..12], &TRAILER_MAGIC);
        assert_eq!(&bytes[12..], &[0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_magic_folded_before_serialization() {
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut sum = DfuChecksum::new();
        sum.update(&payload);
        let trailer = ChecksumTrailer::seal(&mut sum);

        let expected = payload
            .iter()
            .chain(TRAILER_MAGIC.iter())
            .fold(CHECKSUM_SEED, |s, &b| step(s, b));
        assert_eq!(trailer.checksum, expected);
    }
}
