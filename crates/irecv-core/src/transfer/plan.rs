//! Packet layout of a chunked transfer.

use crate::protocol::DeviceMode;

/// How a payload of `total_len` bytes is split into packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub total_len: usize,
    pub packet_size: usize,
    pub packet_count: usize,
    /// Length of the final packet: a full packet when `total_len` is an
    /// exact multiple of `packet_size`, 0 only for an empty payload.
    pub last_packet_len: usize,
}

/// One packet of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub index: usize,
    pub offset: usize,
    pub len: usize,
    pub is_last: bool,
}

impl Packet {
    /// The bytes of `data` this packet carries.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.len]
    }

    /// Packet number as carried in wValue. Wraps like a 16-bit block counter.
    pub fn block_number(&self) -> u16 {
        self.index as u16
    }
}

impl TransferPlan {
    /// `packet_size` is one of the fixed protocol packet sizes.
    pub(crate) fn new(total_len: usize, packet_size: usize) -> Self {
        debug_assert!(packet_size > 0);
        let packet_count = total_len.div_ceil(packet_size);
        let last_packet_len = match (packet_count, total_len % packet_size) {
            (0, _) => 0,
            (_, 0) => packet_size,
            (_, rem) => rem,
        };
        Self {
            total_len,
            packet_size,
            packet_count,
            last_packet_len,
        }
    }

    /// Plan for a file-send in `mode`.
    pub fn for_mode(total_len: usize, mode: DeviceMode) -> Self {
        Self::new(total_len, mode.packet_size())
    }

    pub fn packet_len(&self, index: usize) -> usize {
        if index + 1 < self.packet_count {
            self.packet_size
        } else if index + 1 == self.packet_count {
            self.last_packet_len
        } else {
            0
        }
    }

    pub fn packets(&self) -> impl Iterator<Item = Packet> + '_ {
        (0..self.packet_count).map(move |index| Packet {
            index,
            offset: index * self.packet_size,
            len: self.packet_len(index),
            is_last: index + 1 == self.packet_count,
        })
    }

    /// wValue of the zero-length packet that follows the data packets.
    /// Truncated to 16 bits like [`Packet::block_number`].
    pub fn final_block_number(&self) -> u16 {
        self.packet_count as u16
    }
}
