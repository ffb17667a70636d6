//! Running checksum verified by the bootloader on DFU uploads.
//!
//! This is the reflected CRC-32 (polynomial 0xEDB88320) register, seeded
//! with all-ones and *without* the final inversion. `crc32fast` keeps its
//! state in finalized (inverted) form, so the raw register is its complement.

/// Checksum seed at the start of every transfer.
pub const CHECKSUM_SEED: u32 = 0xFFFF_FFFF;

/// Fold one byte into the checksum register.
pub fn step(state: u32, byte: u8) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!state);
    hasher.update(&[byte]);
    !hasher.finalize()
}

/// Running checksum carried across all packets of one transfer.
#[derive(Clone)]
pub struct DfuChecksum {
    hasher: crc32fast::Hasher,
}

impl DfuChecksum {
    pub fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new_with_initial(!CHECKSUM_SEED),
        }
    }

    /// Fold `bytes` in order.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Current register value.
    pub fn value(&self) -> u32 {
        !self.hasher.clone().finalize()
    }
}

impl Default for DfuChecksum {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DfuChecksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DfuChecksum(0x{:08X})", self.value())
    }
}
