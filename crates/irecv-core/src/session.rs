//! Device session - owns the open handle and the detected bootloader mode.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::config::SessionConfig;
use crate::error::{IrecvError, Result};
use crate::events::{IrecvEvent, IrecvObserver, TracingObserver};
use crate::protocol::constants::*;
use crate::protocol::{ControlSetup, DeviceMode, Direction};
use crate::transport::{NusbTransport, TransportError, UsbTransport};

/// An open connection to a device in Recovery, WTF or DFU mode.
///
/// The handle is released by [`close`](Self::close), by
/// [`reset`](Self::reset), or when the session is dropped. Once released,
/// every operation fails with [`IrecvError::ConnectionLost`] and the caller
/// has to connect again.
pub struct DeviceSession<T: UsbTransport, O: IrecvObserver = TracingObserver> {
    transport: Option<T>,
    mode: DeviceMode,
    console_claimed: bool,
    config: SessionConfig,
    observer: Arc<O>,
}

impl DeviceSession<NusbTransport> {
    /// Probe for a device over nusb with the default tracing observer.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        Self::connect_with(config, Arc::new(TracingObserver), NusbTransport::open_with_ids)
    }
}

impl<T: UsbTransport, O: IrecvObserver> DeviceSession<T, O> {
    /// Probe Recovery, WTF then DFU, keeping the first device that opens.
    ///
    /// `open` is called with the vendor and product ID of each mode in turn.
    #[instrument(level = "info", skip_all)]
    pub fn connect_with<F>(config: SessionConfig, observer: Arc<O>, mut open: F) -> Result<Self>
    where
        F: FnMut(u16, u16) -> std::result::Result<T, TransportError>,
    {
        for mode in DeviceMode::PROBE_ORDER {
            let Some(pid) = mode.product_id() else {
                continue;
            };
            match open(APPLE_VENDOR_ID, pid) {
                Ok(transport) => return Ok(Self::from_transport(transport, mode, config, observer)),
                Err(e) => debug!(mode = %mode, error = %e, "Probe failed"),
            }
        }
        Err(IrecvError::NoDeviceFound)
    }

    /// Wrap an already opened transport.
    pub fn from_transport(
        transport: T,
        mode: DeviceMode,
        config: SessionConfig,
        observer: Arc<O>,
    ) -> Self {
        observer.on_event(&IrecvEvent::Connected {
            mode,
            pid: transport.product_id(),
        });
        Self {
            transport: Some(transport),
            mode,
            console_claimed: false,
            config,
            observer,
        }
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_console_claimed(&self) -> bool {
        self.console_claimed
    }

    pub(crate) fn transport(&self) -> Result<&T> {
        self.transport.as_ref().ok_or(IrecvError::ConnectionLost)
    }

    pub(crate) fn emit(&self, event: IrecvEvent) {
        self.observer.on_event(&event);
    }

    /// Release the handle. Does nothing when no handle is held.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            info!("Closing connection");
            self.console_claimed = false;
            self.emit(IrecvEvent::Closed);
        }
    }

    /// Reset the device. The handle is released whether or not the reset succeeds.
    pub fn reset(&mut self) -> Result<()> {
        let Some(transport) = self.transport.take() else {
            return Ok(());
        };
        info!("Resetting connection");
        let result = transport.reset();
        self.console_claimed = false;
        self.emit(IrecvEvent::DeviceReset);
        match result {
            // The device dropping off the bus is the expected outcome.
            Ok(()) | Err(TransportError::Disconnected) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Set configuration 1, claim interface 1 and select alt setting 1.
    pub fn claim_console_interface(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(IrecvError::ConnectionLost)?;
        transport
            .set_configuration(CONSOLE_CONFIGURATION)
            .and_then(|_| transport.claim_interface(CONSOLE_INTERFACE))
            .and_then(|_| transport.set_alt_setting(CONSOLE_INTERFACE, CONSOLE_ALT_SETTING))
            .map_err(|e| match e {
                TransportError::Disconnected => IrecvError::ConnectionLost,
                other => IrecvError::ConfigurationClaimFailure(other),
            })?;
        self.console_claimed = true;
        self.emit(IrecvEvent::ConsoleAttached);
        Ok(())
    }

    /// Pass-through control transfer.
    ///
    /// For device-to-host requests `buffer` receives the data stage; otherwise
    /// it is sent. Returns the number of bytes transferred, uninterpreted.
    pub fn raw_control(
        &self,
        setup: ControlSetup,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        let transport = self.transport()?;
        match setup.direction() {
            Direction::DeviceToHost => {
                let data = transport.control_in(setup, buffer.len(), timeout)?;
                let n = data.len().min(buffer.len());
                buffer[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Direction::HostToDevice => Ok(transport.control_out(setup, buffer, timeout)?),
        }
    }

    /// Pass-through bulk OUT transfer. Returns bytes sent.
    pub fn raw_bulk_out(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        Ok(self.transport()?.bulk_out(endpoint, data, timeout)?)
    }

    /// Read pending console output. A timeout yields an empty read.
    pub fn console_read(&self) -> Result<Vec<u8>> {
        let timeout = self.config.console_timeout();
        match self
            .transport()?
            .bulk_in(CONSOLE_IN_ENDPOINT, CONSOLE_BUFFER_SIZE, timeout)
        {
            Ok(data) => Ok(data),
            Err(TransportError::Timeout { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<T: UsbTransport, O: IrecvObserver> Drop for DeviceSession<T, O> {
    fn drop(&mut self) {
        self.close();
    }
}
