//! nusb-based USB transport implementation.

use std::time::Duration;

use nusb::transfer::{
    Bulk, ControlIn, ControlOut, ControlType, In, Out, Recipient, TransferError,
};
use nusb::{Device, ErrorKind, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::{ControlSetup, RequestKind, RequestRecipient};

/// Interface claimed when the device is opened.
const PRIMARY_INTERFACE: u8 = 0;

/// nusb-based USB transport.
pub struct NusbTransport {
    device: Device,
    interfaces: Vec<(u8, Interface)>,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open a device with specific VID/PID.
    #[instrument(
        level = "debug",
        fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid))
    )]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let mut transport = Self {
            device,
            interfaces: Vec::new(),
            vid,
            pid,
        };

        // Control requests go through the device handle; the primary
        // interface is only needed for the Recovery bulk endpoint.
        if let Err(e) = transport.claim_interface(PRIMARY_INTERFACE) {
            warn!(error = %e, "Primary interface not claimed");
        }

        Ok(transport)
    }

    fn interface(&self, number: u8) -> Option<&Interface> {
        self.interfaces
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, iface)| iface)
    }

    /// First claimed interface exposing `endpoint` in its active alt setting.
    fn endpoint<Dir: nusb::transfer::EndpointDirection>(
        &self,
        endpoint: u8,
    ) -> Result<nusb::Endpoint<Bulk, Dir>, TransportError> {
        let mut last_error = String::from("no claimed interface");
        for (_, iface) in &self.interfaces {
            match iface.endpoint::<Bulk, Dir>(endpoint) {
                Ok(ep) => return Ok(ep),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(TransportError::EndpointNotFound {
            endpoint,
            message: last_error,
        })
    }
}

fn control_type(setup: &ControlSetup) -> ControlType {
    match setup.kind() {
        RequestKind::Standard => ControlType::Standard,
        RequestKind::Class => ControlType::Class,
        RequestKind::Vendor | RequestKind::Reserved => ControlType::Vendor,
    }
}

fn recipient(setup: &ControlSetup) -> Recipient {
    match setup.recipient() {
        RequestRecipient::Device => Recipient::Device,
        RequestRecipient::Interface => Recipient::Interface,
        RequestRecipient::Endpoint => Recipient::Endpoint,
        RequestRecipient::Other => Recipient::Other,
    }
}

fn control_error(setup: &ControlSetup, err: TransferError, timeout: Duration) -> TransportError {
    match err {
        TransferError::Cancelled => TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        TransferError::Disconnected => TransportError::Disconnected,
        other => TransportError::ControlFailed {
            request_type: setup.request_type,
            request: setup.request,
            message: other.to_string(),
        },
    }
}

/// Map a device-level nusb error, keeping a disconnect distinguishable.
fn device_error(err: nusb::Error, other: impl FnOnce(String) -> TransportError) -> TransportError {
    classify(err.kind(), err.to_string(), other)
}

fn classify(
    kind: ErrorKind,
    message: String,
    other: impl FnOnce(String) -> TransportError,
) -> TransportError {
    match kind {
        ErrorKind::Disconnected => TransportError::Disconnected,
        _ => other(message),
    }
}

fn bulk_error(endpoint: u8, err: TransferError) -> TransportError {
    match err {
        TransferError::Disconnected => TransportError::Disconnected,
        other => TransportError::BulkFailed {
            endpoint,
            message: other.to_string(),
        },
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    fn control_out(
        &self,
        setup: ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.device
            .control_out(
                ControlOut {
                    control_type: control_type(&setup),
                    recipient: recipient(&setup),
                    request: setup.request,
                    value: setup.value,
                    index: setup.index,
                    data,
                },
                timeout,
            )
            .wait()
            .map_err(|e| control_error(&setup, e, timeout))?;
        Ok(data.len())
    }

    #[instrument(level = "trace", skip(self))]
    fn control_in(
        &self,
        setup: ControlSetup,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let length = u16::try_from(length).map_err(|_| TransportError::ControlFailed {
            request_type: setup.request_type,
            request: setup.request,
            message: format!("wLength {} exceeds 0xFFFF", length),
        })?;
        self.device
            .control_in(
                ControlIn {
                    control_type: control_type(&setup),
                    recipient: recipient(&setup),
                    request: setup.request,
                    value: setup.value,
                    index: setup.index,
                    length,
                },
                timeout,
            )
            .wait()
            .map_err(|e| control_error(&setup, e, timeout))
    }

    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    fn bulk_out(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut ep = self.endpoint::<Out>(endpoint)?;
        ep.submit(data.to_vec().into());

        let Some(completion) = ep.wait_next_complete(timeout) else {
            ep.cancel_all();
            return Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        };
        completion.status.map_err(|e| bulk_error(endpoint, e))?;

        debug!(bytes_written = completion.actual_len, "Bulk write complete");
        Ok(completion.actual_len)
    }

    #[instrument(level = "trace", skip(self))]
    fn bulk_in(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut ep = self.endpoint::<In>(endpoint)?;
        let mut buffer = ep.allocate(max_len);
        buffer.set_requested_len(max_len);
        ep.submit(buffer);

        let Some(completion) = ep.wait_next_complete(timeout) else {
            ep.cancel_all();
            return Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        };
        completion.status.map_err(|e| bulk_error(endpoint, e))?;

        let mut data = completion.buffer.into_vec();
        data.truncate(completion.actual_len);
        Ok(data)
    }

    fn set_configuration(&mut self, configuration: u8) -> Result<(), TransportError> {
        self.device
            .set_configuration(configuration)
            .wait()
            .map_err(|e| {
                device_error(e, |message| TransportError::SetConfigurationFailed {
                    configuration,
                    message,
                })
            })
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        if self.interface(interface).is_some() {
            return Ok(());
        }
        let claimed = self
            .device
            .claim_interface(interface)
            .wait()
            .map_err(|e| {
                device_error(e, |message| TransportError::ClaimInterfaceFailed {
                    interface,
                    message,
                })
            })?;
        debug!(interface, "Interface claimed");
        self.interfaces.push((interface, claimed));
        Ok(())
    }

    fn set_alt_setting(&mut self, interface: u8, alt_setting: u8) -> Result<(), TransportError> {
        let iface = self
            .interface(interface)
            .ok_or_else(|| TransportError::AltSettingFailed {
                interface,
                alt_setting,
                message: "interface not claimed".into(),
            })?;
        iface
            .set_alt_setting(alt_setting)
            .wait()
            .map_err(|e| {
                device_error(e, |message| TransportError::AltSettingFailed {
                    interface,
                    alt_setting,
                    message,
                })
            })
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.device
            .reset()
            .wait()
            .map_err(|e| device_error(e, TransportError::ResetFailed))
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

    #[test]
    fn test_disconnect_kind_maps_to_disconnected() {
        let err = classify(ErrorKind::Disconnected, "device disconnected".into(), |m| {
            TransportError::ResetFailed(m)
        });
        assert!(matches!(err, TransportError::Disconnected));
    }

    #[test]
    fn test_other_kinds_keep_operation_error() {
        let err = classify(ErrorKind::Busy, "busy".into(), |message| {
            TransportError::ClaimInterfaceFailed {
                interface: 1,
                message,
            }
        });
        assert!(matches!(
            err,
            TransportError::ClaimInterfaceFailed { interface: 1, ref message } if message == "busy"
        ));
    }
}
