//! Status polling over DFU GETSTATUS.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::{IrecvError, Result};
use crate::events::{IrecvEvent, IrecvObserver};
use crate::protocol::constants::STATUS_RESPONSE_LEN;
use crate::protocol::{ControlSetup, DeviceStatus};
use crate::session::DeviceSession;
use crate::transport::UsbTransport;

impl<T: UsbTransport, O: IrecvObserver> DeviceSession<T, O> {
    /// Single 6-byte status read. Anything shorter is a `StatusReadFailure`.
    pub fn read_status(&self, timeout: Duration) -> Result<DeviceStatus> {
        let bytes = self
            .transport()?
            .control_in(ControlSetup::get_status(), STATUS_RESPONSE_LEN, timeout)?;
        let status = DeviceStatus::from_bytes(&bytes).ok_or(IrecvError::StatusReadFailure {
            actual: bytes.len(),
        })?;
        debug!(status = status.code(), "Status read");
        Ok(status)
    }

    /// Read status once and require `expected`, no retry.
    pub fn expect_status(&self, expected: u8, timeout: Duration) -> Result<()> {
        let status = self.read_status(timeout)?;
        if status.code() != expected {
            return Err(IrecvError::StatusValueMismatch {
                expected,
                actual: status.code(),
            });
        }
        Ok(())
    }

    /// Poll until the device reports `expected`, within `policy`.
    ///
    /// The first read must succeed; later reads that fail count as "not
    /// ready". Sleeps `policy.interval` between polls and returns on the
    /// first match.
    pub fn wait_for_status(
        &self,
        expected: u8,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Result<()> {
        let mut last = self.read_status(timeout)?.code();
        let mut attempt = 1;

        while last != expected {
            if attempt >= policy.attempts {
                return Err(IrecvError::StatusValueMismatch {
                    expected,
                    actual: last,
                });
            }
            self.emit(IrecvEvent::StatusRetry {
                attempt,
                status: last,
            });
            thread::sleep(policy.interval);
            attempt += 1;

            match self.read_status(timeout) {
                Ok(status) => last = status.code(),
                Err(IrecvError::ConnectionLost) => return Err(IrecvError::ConnectionLost),
                Err(e) => {
                    debug!(attempt, error = %e, "Status poll failed");
                    last = 0;
                }
            }
        }
        Ok(())
    }
}
