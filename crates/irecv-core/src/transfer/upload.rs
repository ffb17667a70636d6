//! Upload-and-execute over DFU DNLOAD.
//!
//! Always 0x800-byte control packets whatever the mode. Each packet must be
//! acknowledged with status 5 on the first poll, and the device must then
//! report 6, 7, 8 once the zero-length packet is sent.

use std::path::Path;

use tracing::{info, instrument};

use crate::error::{IrecvError, Result};
use crate::events::{IrecvEvent, IrecvObserver, TransferKind};
use crate::payload::Payload;
use crate::protocol::ControlSetup;
use crate::protocol::constants::DFU_PACKET_SIZE;
use crate::protocol::status::{EXECUTION_SEQUENCE, STATUS_READY};
use crate::session::DeviceSession;
use crate::transfer::plan::TransferPlan;
use crate::transport::UsbTransport;

impl<T: UsbTransport, O: IrecvObserver> DeviceSession<T, O> {
    /// Read `path` and run it through [`upload_buffer`](Self::upload_buffer).
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn upload<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let payload = Payload::from_path(path)?;
        self.upload_buffer(payload.as_bytes())
    }

    /// Upload `data` and wait for the device to execute it.
    pub fn upload_buffer(&self, data: &[u8]) -> Result<()> {
        let transport = self.transport()?;
        let timeout = self.config().short_timeout();
        let plan = TransferPlan::new(data.len(), DFU_PACKET_SIZE);
        let kind = TransferKind::Upload;

        self.emit(IrecvEvent::TransferStarted {
            kind,
            total_bytes: data.len(),
            packets: plan.packet_count,
        });

        let mut sent = 0u64;
        for packet in plan.packets() {
            // wValue is 16 bits: past 0xFFFF packets the block number wraps to 0.
            let written = transport.control_out(
                ControlSetup::dnload(packet.block_number()),
                packet.slice(data),
                timeout,
            )?;
            if written != packet.len {
                return Err(IrecvError::TransferSizeMismatch {
                    expected: packet.len,
                    actual: written,
                });
            }

            self.expect_status(STATUS_READY, timeout)?;

            sent += packet.len as u64;
            self.emit(IrecvEvent::Progress {
                kind,
                packet: packet.index + 1,
                packets: plan.packet_count,
                sent,
                total: data.len() as u64,
            });
        }

        self.emit(IrecvEvent::Executing);
        transport.control_out(ControlSetup::dnload(plan.final_block_number()), &[], timeout)?;

        for expected in EXECUTION_SEQUENCE {
            self.expect_status(expected, timeout)?;
        }

        info!(bytes = data.len(), "Payload executed");
        self.emit(IrecvEvent::TransferComplete { kind });
        Ok(())
    }
}
