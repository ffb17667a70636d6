//! File-send: bulk path in Recovery mode, DFU DNLOAD path in DFU/WTF mode.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::error::{IrecvError, Result};
use crate::events::{IrecvEvent, IrecvObserver, TransferKind};
use crate::payload::Payload;
use crate::protocol::constants::BULK_OUT_ENDPOINT;
use crate::protocol::status::STATUS_READY;
use crate::protocol::{ChecksumTrailer, ControlSetup, DfuChecksum};
use crate::session::DeviceSession;
use crate::transfer::plan::TransferPlan;
use crate::transport::{TransportError, UsbTransport};

/// What happens after the last DFU packet. Ignored on the Recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Finalize {
    /// Leave the device waiting for more data.
    #[default]
    None,
    /// Zero-length DNLOAD, two status reads, then reset.
    Notify,
    /// As `Notify`, plus an unchecked zero-length flush before the reset.
    NotifyAndFlush,
}

fn start_failed(err: TransportError) -> IrecvError {
    match err {
        TransportError::Disconnected => IrecvError::ConnectionLost,
        other => IrecvError::TransferStartFailed(other.to_string()),
    }
}

fn check_size(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(IrecvError::TransferSizeMismatch { expected, actual });
    }
    Ok(())
}

impl<T: UsbTransport, O: IrecvObserver> DeviceSession<T, O> {
    /// Read `path` and send it with [`send_buffer`](Self::send_buffer).
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn send<P: AsRef<Path>>(&mut self, path: P, finalize: Finalize) -> Result<()> {
        let payload = Payload::from_path(path)?;
        self.send_buffer(payload.as_bytes(), finalize)
    }

    /// Send `data` using the protocol matching the connected mode.
    pub fn send_buffer(&mut self, data: &[u8], finalize: Finalize) -> Result<()> {
        if self.mode().uses_bulk_transfer() {
            self.send_recovery(data)
        } else {
            self.send_dfu(data, finalize)
        }
    }

    fn send_recovery(&self, data: &[u8]) -> Result<()> {
        let transport = self.transport()?;
        let timeout = self.config().transfer_timeout();
        let plan = TransferPlan::for_mode(data.len(), self.mode());
        let kind = TransferKind::RecoverySend;

        transport
            .control_out(ControlSetup::recovery_start(), &[], timeout)
            .map_err(start_failed)?;
        self.emit(IrecvEvent::TransferStarted {
            kind,
            total_bytes: data.len(),
            packets: plan.packet_count,
        });

        let mut sent = 0u64;
        for packet in plan.packets() {
            let written = transport.bulk_out(BULK_OUT_ENDPOINT, packet.slice(data), timeout)?;
            check_size(packet.len, written)?;

            sent += packet.len as u64;
            self.emit(IrecvEvent::Progress {
                kind,
                packet: packet.index + 1,
                packets: plan.packet_count,
                sent,
                total: data.len() as u64,
            });
        }

        info!(bytes = data.len(), "File sent");
        self.emit(IrecvEvent::TransferComplete { kind });
        Ok(())
    }

    fn send_dfu(&mut self, data: &[u8], finalize: Finalize) -> Result<()> {
        let timeout = self.config().transfer_timeout();
        let policy = self.config().retry_policy();
        let plan = TransferPlan::for_mode(data.len(), self.mode());
        let kind = TransferKind::DfuSend;

        {
            let transport = self.transport()?;
            let ack = transport
                .control_in(ControlSetup::get_state(), 1, timeout)
                .map_err(start_failed)?;
            if ack.len() != 1 {
                return Err(IrecvError::TransferStartFailed(format!(
                    "state request returned {} bytes",
                    ack.len()
                )));
            }
        }
        self.emit(IrecvEvent::TransferStarted {
            kind,
            total_bytes: data.len(),
            packets: plan.packet_count,
        });

        let mut checksum = DfuChecksum::new();
        let mut sent = 0u64;
        for packet in plan.packets() {
            let chunk = packet.slice(data);
            checksum.update(chunk);
            // wValue is 16 bits: past 0xFFFF packets the block number wraps to 0.
            let setup = ControlSetup::dnload(packet.block_number());

            if packet.is_last {
                let trailer = ChecksumTrailer::seal(&mut checksum);
                debug!(checksum = %format!("0x{:08X}", trailer.checksum), "Appending DFU trailer");
                let mut framed = Vec::with_capacity(chunk.len() + ChecksumTrailer::SIZE);
                framed.extend_from_slice(chunk);
                trailer.append_to(&mut framed);
                let written = self.transport()?.control_out(setup, &framed, timeout)?;
                check_size(framed.len(), written)?;
            } else {
                let written = self.transport()?.control_out(setup, chunk, timeout)?;
                check_size(chunk.len(), written)?;
            }

            self.wait_for_status(STATUS_READY, policy, timeout)?;

            sent += packet.len as u64;
            self.emit(IrecvEvent::Progress {
                kind,
                packet: packet.index + 1,
                packets: plan.packet_count,
                sent,
                total: data.len() as u64,
            });
        }

        if finalize != Finalize::None {
            self.finish_dfu(&plan, finalize, timeout)?;
        }

        info!(bytes = data.len(), "File sent");
        self.emit(IrecvEvent::TransferComplete { kind });
        Ok(())
    }

    /// Tell the bootloader the image is complete and reset into it.
    fn finish_dfu(
        &mut self,
        plan: &TransferPlan,
        finalize: Finalize,
        timeout: Duration,
    ) -> Result<()> {
        self.transport()?.control_out(
            ControlSetup::dnload(plan.final_block_number()),
            &[],
            timeout,
        )?;

        // The bootloader advances its DFU state machine on each of these.
        for _ in 0..2 {
            self.read_status(timeout)?;
        }

        if finalize == Finalize::NotifyAndFlush
            && let Err(e) = self
                .transport()?
                .control_out(ControlSetup::dnload(0), &[], timeout)
        {
            debug!(error = %e, "Flush packet not accepted");
        }

        self.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DeviceMode;
    use crate::protocol::checksum::{CHECKSUM_SEED, step};
    use crate::protocol::constants::*;
    use crate::protocol::trailer::TRAILER_MAGIC;
    use crate::session::tests::mock_session;
    use crate::transport::UsbCall;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 + 7) as u8).collect()
    }

    #[test]
    fn test_recovery_send_uses_bulk_packets() {
        let (mut session, mock) = mock_session(DeviceMode::Recovery);
        let data = payload(0x8000 + 0x10);
        session.send_buffer(&data, Finalize::Notify).unwrap();

        let calls = mock.calls();
        assert_eq!(
            calls[0],
            UsbCall::ControlOut {
                setup: ControlSetup::new(0x41, 0, 0, 0),
                data: vec![]
            }
        );
        let bulk = mock.bulk_outs();
        assert_eq!(bulk.len(), 2);
        assert_eq!(bulk[0], (BULK_OUT_ENDPOINT, data[..0x8000].to_vec()));
        assert_eq!(bulk[1], (BULK_OUT_ENDPOINT, data[0x8000..].to_vec()));

        // No status polling and no reset on the bulk path.
        assert_eq!(mock.control_in_count(REQ_DFU_GETSTATUS), 0);
        assert_eq!(mock.reset_count(), 0);
        assert!(session.is_open());
    }

    #[test]
    fn test_recovery_short_write_aborts() {
        let (mut session, mock) = mock_session(DeviceMode::Recovery);
        // OUT #0 is the start request, #1 the first bulk packet.
        mock.short_write_at(1);
        let err = session
            .send_buffer(&payload(0x10000), Finalize::None)
            .unwrap_err();
        assert!(matches!(
            err,
            IrecvError::TransferSizeMismatch {
                expected: 0x8000,
                actual: 0x7FFF
            }
        ));
        assert_eq!(mock.bulk_outs().len(), 1);
    }

    #[test]
    fn test_recovery_start_failure() {
        let (mut session, mock) = mock_session(DeviceMode::Recovery);
        mock.reject_request(REQ_COMMAND);
        let err = session.send_buffer(&payload(16), Finalize::None).unwrap_err();
        assert!(matches!(err, IrecvError::TransferStartFailed(_)));
        assert!(mock.bulk_outs().is_empty());
    }

    #[test]
    fn test_dfu_send_two_packets_with_trailer() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[5, 5]);

        let data = payload(0x1000);
        session.send_buffer(&data, Finalize::None).unwrap();

        let outs = mock.control_outs();
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[0].0, ControlSetup::dnload(0));
        assert_eq!(outs[0].1, data[..0x800]);
        assert_eq!(outs[1].0, ControlSetup::dnload(1));

        let last = &outs[1].1;
        assert_eq!(last.len(), 0x800 + 16);
        assert_eq!(&last[..0x800], &data[0x800..]);
        assert_eq!(&last[0x800..0x80C], &TRAILER_MAGIC);

        let expected = data
            .iter()
            .chain(TRAILER_MAGIC.iter())
            .fold(CHECKSUM_SEED, |s, &b| step(s, b));
        assert_eq!(&last[0x80C..], &expected.to_le_bytes());

        // No finalization requested.
        assert_eq!(mock.reset_count(), 0);
        assert!(session.is_open());
    }

    #[test]
    fn test_trailer_independent_of_chunking() {
        let data = payload(0x1234);

        let (mut dfu, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[5; 3]);
        dfu.send_buffer(&data, Finalize::None).unwrap();
        let outs = mock.control_outs();
        let sent_trailer = &outs.last().unwrap().1[(0x1234 % 0x800)..];

        let mut single = DfuChecksum::new();
        single.update(&data);
        let whole = ChecksumTrailer::seal(&mut single);
        assert_eq!(sent_trailer, &whole.to_bytes());
    }

    #[test]
    fn test_wtf_uses_dfu_path() {
        let (mut session, mock) = mock_session(DeviceMode::Wtf);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_status(5);
        session.send_buffer(&payload(0x10), Finalize::None).unwrap();
        assert!(mock.bulk_outs().is_empty());
        assert_eq!(mock.control_outs()[0].1.len(), 0x10 + 16);
    }

    #[test]
    fn test_dfu_start_requires_state_byte() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[]);
        let err = session.send_buffer(&payload(0x10), Finalize::None).unwrap_err();
        assert!(matches!(err, IrecvError::TransferStartFailed(_)));
        assert!(mock.control_outs().is_empty());
    }

    #[test]
    fn test_dfu_retries_busy_status() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[4; 19]);
        mock.queue_status(5);
        session.send_buffer(&payload(0x10), Finalize::None).unwrap();
        assert_eq!(mock.control_in_count(REQ_DFU_GETSTATUS), 20);
    }

    #[test]
    fn test_dfu_retry_budget_exhausted() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[4; 20]);
        mock.queue_status(5);
        let err = session.send_buffer(&payload(0x10), Finalize::None).unwrap_err();
        assert!(matches!(err, IrecvError::StatusValueMismatch { expected: 5, actual: 4 }));
    }

    #[test]
    fn test_dfu_short_write_is_fatal() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.short_write_at(0);
        let err = session.send_buffer(&payload(0x900), Finalize::None).unwrap_err();
        assert!(matches!(err, IrecvError::TransferSizeMismatch { expected: 0x800, .. }));
        assert_eq!(mock.control_in_count(REQ_DFU_GETSTATUS), 0);
    }

    #[test]
    fn test_dfu_finalize_notify() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[5, 5, 6, 7]);
        session.send_buffer(&payload(0x900), Finalize::Notify).unwrap();

        let outs = mock.control_outs();
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[2], (ControlSetup::dnload(2), vec![]));
        assert_eq!(mock.control_in_count(REQ_DFU_GETSTATUS), 4);
        assert_eq!(mock.calls().last(), Some(&UsbCall::Reset));
        assert!(!session.is_open());
    }

    #[test]
    fn test_dfu_finalize_with_flush() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[5, 6, 7]);
        session
            .send_buffer(&payload(0x10), Finalize::NotifyAndFlush)
            .unwrap();

        let outs = mock.control_outs();
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[1], (ControlSetup::dnload(1), vec![]));
        assert_eq!(outs[2], (ControlSetup::dnload(0), vec![]));
        assert_eq!(mock.reset_count(), 1);
    }

    #[test]
    fn test_dfu_rejected_flush_still_resets() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[5, 6, 7]);
        // OUT #0 is the data packet, #1 the notify packet, #2 the flush.
        mock.fail_out_at(2);
        session
            .send_buffer(&payload(0x10), Finalize::NotifyAndFlush)
            .unwrap();

        assert_eq!(mock.control_outs()[2], (ControlSetup::dnload(0), vec![]));
        assert_eq!(mock.reset_count(), 1);
        assert!(!session.is_open());
    }

    #[test]
    fn test_dfu_finalize_needs_both_status_reads() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[5, 6]);
        let err = session.send_buffer(&payload(0x10), Finalize::Notify).unwrap_err();
        assert!(matches!(err, IrecvError::Transport(TransportError::Timeout { .. })));
        assert_eq!(mock.reset_count(), 0);
    }

    #[test]
    fn test_dfu_empty_payload_still_finalizes() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_control_in(REQ_DFU_GETSTATE, &[2]);
        mock.queue_statuses(&[6, 7]);
        session.send_buffer(&[], Finalize::Notify).unwrap();

        assert_eq!(mock.control_outs(), vec![(ControlSetup::dnload(0), vec![])]);
        assert_eq!(mock.control_in_count(REQ_DFU_GETSTATUS), 2);
        assert_eq!(mock.reset_count(), 1);
    }

    #[test]
    fn test_send_missing_file() {
        let (mut session, mock) = mock_session(DeviceMode::Dfu);
        let err = session
            .send("/nonexistent/iBSS.n88ap.RELEASE.dfu", Finalize::Notify)
            .unwrap_err();
        assert!(matches!(err, IrecvError::FileNotFound { .. }));
        assert!(mock.calls().is_empty());
    }
}
