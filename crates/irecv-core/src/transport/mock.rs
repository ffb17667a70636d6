//! Mock USB transport for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{APPLE_VENDOR_ID, DFU_MODE_PID, REQ_DFU_GETSTATUS};
use crate::protocol::{ControlSetup, DeviceStatus};

/// A USB call captured by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbCall {
    ControlOut { setup: ControlSetup, data: Vec<u8> },
    ControlIn { setup: ControlSetup, length: usize },
    BulkOut { endpoint: u8, data: Vec<u8> },
    BulkIn { endpoint: u8, max_len: usize },
    SetConfiguration(u8),
    ClaimInterface(u8),
    SetAltSetting { interface: u8, alt_setting: u8 },
    Reset,
}

#[derive(Default)]
struct MockState {
    calls: Vec<UsbCall>,
    /// Scripted control-IN replies keyed by bRequest.
    control_in: HashMap<u8, VecDeque<Vec<u8>>>,
    bulk_in: VecDeque<Vec<u8>>,
    /// OUT transfers seen so far (control and bulk).
    out_count: usize,
    short_writes: Vec<usize>,
    failed_outs: Vec<usize>,
    rejected_requests: Vec<u8>,
    fail_claim: bool,
    connected: bool,
}

/// Mock transport for unit testing protocol logic.
///
/// Clones share state, so a test can keep one handle for scripting and
/// inspection while the session owns another.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_ids(APPLE_VENDOR_ID, DFU_MODE_PID)
    }

    pub fn with_ids(vid: u16, pid: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..Default::default()
            })),
            vid,
            pid,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Queue a control-IN reply for `request`.
    pub fn queue_control_in(&self, request: u8, data: &[u8]) {
        self.lock()
            .control_in
            .entry(request)
            .or_default()
            .push_back(data.to_vec());
    }

    /// Queue a GETSTATUS reply carrying `code`.
    pub fn queue_status(&self, code: u8) {
        self.queue_control_in(REQ_DFU_GETSTATUS, DeviceStatus::from_code(code).as_bytes());
    }

    /// Queue several GETSTATUS replies.
    pub fn queue_statuses(&self, codes: &[u8]) {
        for &code in codes {
            self.queue_status(code);
        }
    }

    /// Queue data for the next bulk-IN read.
    pub fn queue_bulk_in(&self, data: &[u8]) {
        self.lock().bulk_in.push_back(data.to_vec());
    }

    /// Make the `nth` OUT transfer (0-based, control and bulk) report one byte short.
    pub fn short_write_at(&self, nth: usize) {
        self.lock().short_writes.push(nth);
    }

    /// Fail the `nth` OUT transfer (0-based, control and bulk counted together).
    pub fn fail_out_at(&self, nth: usize) {
        self.lock().failed_outs.push(nth);
    }

    /// Fail every control transfer with this bRequest.
    pub fn reject_request(&self, request: u8) {
        self.lock().rejected_requests.push(request);
    }

    /// Fail interface claims.
    pub fn fail_claim(&self) {
        self.lock().fail_claim = true;
    }

    /// Get all captured calls.
    pub fn calls(&self) -> Vec<UsbCall> {
        self.lock().calls.clone()
    }

    /// Captured control OUT transfers as (setup, data).
    pub fn control_outs(&self) -> Vec<(ControlSetup, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                UsbCall::ControlOut { setup, data } => Some((setup, data)),
                _ => None,
            })
            .collect()
    }

    /// Captured bulk OUT payloads as (endpoint, data).
    pub fn bulk_outs(&self) -> Vec<(u8, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                UsbCall::BulkOut { endpoint, data } => Some((endpoint, data)),
                _ => None,
            })
            .collect()
    }

    /// Number of control-IN calls made with this bRequest.
    pub fn control_in_count(&self, request: u8) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, UsbCall::ControlIn { setup, .. } if setup.request == request))
            .count()
    }

    pub fn reset_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == UsbCall::Reset).count()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.lock().connected = false;
    }

    fn record_out(
        &self,
        call: UsbCall,
        len: usize,
        failure: impl FnOnce() -> TransportError,
    ) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        let nth = state.out_count;
        state.out_count += 1;
        state.calls.push(call);
        if state.failed_outs.contains(&nth) {
            return Err(failure());
        }
        let short = state.short_writes.contains(&nth);
        Ok(if short { len.saturating_sub(1) } else { len })
    }

    fn record_device_call(&self, call: UsbCall) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn control_out(
        &self,
        setup: ControlSetup,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if self.lock().rejected_requests.contains(&setup.request) {
            self.lock().calls.push(UsbCall::ControlOut {
                setup,
                data: data.to_vec(),
            });
            return Err(TransportError::ControlFailed {
                request_type: setup.request_type,
                request: setup.request,
                message: "stall".into(),
            });
        }
        self.record_out(
            UsbCall::ControlOut {
                setup,
                data: data.to_vec(),
            },
            data.len(),
            || TransportError::ControlFailed {
                request_type: setup.request_type,
                request: setup.request,
                message: "stall".into(),
            },
        )
    }

    fn control_in(
        &self,
        setup: ControlSetup,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.calls.push(UsbCall::ControlIn { setup, length });
        if state.rejected_requests.contains(&setup.request) {
            return Err(TransportError::ControlFailed {
                request_type: setup.request_type,
                request: setup.request,
                message: "stall".into(),
            });
        }
        let mut reply = state
            .control_in
            .get_mut(&setup.request)
            .and_then(VecDeque::pop_front)
            .ok_or(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })?;
        reply.truncate(length);
        Ok(reply)
    }

    fn bulk_out(
        &self,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.record_out(
            UsbCall::BulkOut {
                endpoint,
                data: data.to_vec(),
            },
            data.len(),
            || TransportError::BulkFailed {
                endpoint,
                message: "stall".into(),
            },
        )
    }

    fn bulk_in(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.calls.push(UsbCall::BulkIn { endpoint, max_len });
        let mut data = state.bulk_in.pop_front().ok_or(TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })?;
        data.truncate(max_len);
        Ok(data)
    }

    fn set_configuration(&mut self, configuration: u8) -> Result<(), TransportError> {
        self.record_device_call(UsbCall::SetConfiguration(configuration))
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.record_device_call(UsbCall::ClaimInterface(interface))?;
        if self.lock().fail_claim {
            return Err(TransportError::ClaimInterfaceFailed {
                interface,
                message: "busy".into(),
            });
        }
        Ok(())
    }

    fn set_alt_setting(&mut self, interface: u8, alt_setting: u8) -> Result<(), TransportError> {
        self.record_device_call(UsbCall::SetAltSetting {
            interface,
            alt_setting,
        })
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.record_device_call(UsbCall::Reset)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(10);

    #[test]
    fn test_mock_status_queue() {
        let mock = MockTransport::new();
        mock.queue_statuses(&[5, 6]);

        let first = mock
            .control_in(ControlSetup::get_status(), 6, TIMEOUT)
            .unwrap();
        assert_eq!(first[4], 5);
        let second = mock
            .control_in(ControlSetup::get_status(), 6, TIMEOUT)
            .unwrap();
        assert_eq!(second[4], 6);

        // Queue is empty now
        assert!(matches!(
            mock.control_in(ControlSetup::get_status(), 6, TIMEOUT),
            Err(TransportError::Timeout { .. })
        ));
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.control_out(ControlSetup::command(), b"Hello\0", TIMEOUT)
            .unwrap();
        mock.bulk_out(0x04, b"World", TIMEOUT).unwrap();

        assert_eq!(mock.control_outs()[0].1, b"Hello\0");
        assert_eq!(mock.bulk_outs(), vec![(0x04, b"World".to_vec())]);
    }

    #[test]
    fn test_mock_short_write() {
        let mock = MockTransport::new();
        mock.short_write_at(1);
        assert_eq!(mock.bulk_out(0x04, &[0; 8], TIMEOUT).unwrap(), 8);
        assert_eq!(mock.bulk_out(0x04, &[0; 8], TIMEOUT).unwrap(), 7);
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.disconnect();
        assert!(matches!(
            mock.control_out(ControlSetup::command(), b"test", TIMEOUT),
            Err(TransportError::Disconnected)
        ));
    }
}
