//! Exploit trigger and raw control requests.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{info, instrument};

use crate::error::{IrecvError, Result};
use crate::events::IrecvObserver;
use crate::protocol::ControlSetup;
use crate::protocol::constants::*;
use crate::session::DeviceSession;
use crate::transport::{TransportError, UsbTransport};

/// bmRequestType accepted by the raw dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEndpoint {
    /// 0xA1, device-to-host class request.
    ClassIn,
    /// 0x40, host-to-device vendor request.
    VendorOut,
    /// 0x21, host-to-device class request.
    ClassOut,
}

impl RawEndpoint {
    pub fn request_type(&self) -> u8 {
        match self {
            RawEndpoint::ClassIn => REQ_TYPE_CLASS_IN,
            RawEndpoint::VendorOut => REQ_TYPE_VENDOR_OUT,
            RawEndpoint::ClassOut => REQ_TYPE_CLASS_OUT,
        }
    }
}

impl fmt::Display for RawEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.request_type())
    }
}

impl FromStr for RawEndpoint {
    type Err = IrecvError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim_start_matches("0x").trim_start_matches("0X");
        match hex.to_ascii_uppercase().as_str() {
            "A1" => Ok(RawEndpoint::ClassIn),
            "40" => Ok(RawEndpoint::VendorOut),
            "21" => Ok(RawEndpoint::ClassOut),
            _ => Err(IrecvError::InvalidRequest(s.to_string())),
        }
    }
}

/// Parse a bRequest given as a decimal integer.
pub fn parse_request(arg: &str) -> Result<u8> {
    arg.trim()
        .parse::<u8>()
        .map_err(|_| IrecvError::InvalidRequest(arg.to_string()))
}

impl<T: UsbTransport, O: IrecvObserver> DeviceSession<T, O> {
    /// Optionally upload a payload, then send the exploit trigger.
    #[instrument(skip(self, payload))]
    pub fn exploit<P: AsRef<Path>>(&self, payload: Option<P>) -> Result<()> {
        if let Some(path) = payload {
            self.upload(path)?;
        }
        self.send_exploit_trigger()
    }

    /// As [`exploit`](Self::exploit), with an in-memory payload.
    pub fn exploit_buffer(&self, payload: Option<&[u8]>) -> Result<()> {
        if let Some(data) = payload {
            self.upload_buffer(data)?;
        }
        self.send_exploit_trigger()
    }

    fn send_exploit_trigger(&self) -> Result<()> {
        self.transport()?
            .control_out(ControlSetup::exploit(), &[], self.config().short_timeout())
            .map_err(|e| match e {
                TransportError::Disconnected => IrecvError::ConnectionLost,
                other => IrecvError::ExploitSendFailed(other),
            })?;
        info!("Exploit sent");
        Ok(())
    }

    /// Zero-length control request with bRequest parsed from `arg`.
    ///
    /// Returns the transfer length reported by the transport; nothing else
    /// is interpreted.
    pub fn raw_control_transfer(&self, endpoint: RawEndpoint, arg: &str) -> Result<usize> {
        let request = parse_request(arg)?;
        let setup = ControlSetup::new(endpoint.request_type(), request, 0, 0);
        info!(request_type = %endpoint, request, "Sending raw request");
        self.raw_control(setup, &mut [], self.config().short_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DeviceMode;
    use crate::session::tests::mock_session;
    use crate::transport::UsbCall;

    #[test]
    fn test_trigger_only() {
        let (session, mock) = mock_session(DeviceMode::Dfu);
        session.exploit(None::<&str>).unwrap();
        assert_eq!(
            mock.control_outs(),
            vec![(ControlSetup::new(0x21, 2, 0, 0), vec![])]
        );
    }

    #[test]
    fn test_payload_then_trigger() {
        let (session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_statuses(&[5, 6, 7, 8]);
        session.exploit_buffer(Some(&[0xEA; 0x20])).unwrap();

        let outs = mock.control_outs();
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[0].0, ControlSetup::dnload(0));
        assert_eq!(outs[1], (ControlSetup::dnload(1), vec![]));
        assert_eq!(outs[2], (ControlSetup::exploit(), vec![]));
    }

    #[test]
    fn test_upload_failure_skips_trigger() {
        let (session, mock) = mock_session(DeviceMode::Dfu);
        mock.queue_statuses(&[4]);
        let err = session.exploit_buffer(Some(&[0; 4])).unwrap_err();
        assert!(matches!(err, IrecvError::StatusValueMismatch { .. }));
        assert!(
            !mock
                .control_outs()
                .iter()
                .any(|(setup, _)| setup.request == REQ_EXPLOIT)
        );
    }

    #[test]
    fn test_missing_payload_file_skips_trigger() {
        let (session, mock) = mock_session(DeviceMode::Dfu);
        let err = session.exploit(Some("/nonexistent/payload.bin")).unwrap_err();
        assert!(matches!(err, IrecvError::FileNotFound { .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_trigger_failure() {
        let (session, mock) = mock_session(DeviceMode::Dfu);
        mock.reject_request(REQ_EXPLOIT);
        let err = session.exploit(None::<&str>).unwrap_err();
        assert!(matches!(err, IrecvError::ExploitSendFailed(_)));
    }

    #[test]
    fn test_raw_requests() {
        let (session, mock) = mock_session(DeviceMode::Recovery);
        mock.queue_control_in(6, &[]);
        session.raw_control_transfer(RawEndpoint::ClassIn, "6").unwrap();
        session.raw_control_transfer(RawEndpoint::VendorOut, "1").unwrap();
        session.raw_control_transfer(RawEndpoint::ClassOut, "4").unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                UsbCall::ControlIn {
                    setup: ControlSetup::new(0xA1, 6, 0, 0),
                    length: 0
                },
                UsbCall::ControlOut {
                    setup: ControlSetup::new(0x40, 1, 0, 0),
                    data: vec![]
                },
                UsbCall::ControlOut {
                    setup: ControlSetup::new(0x21, 4, 0, 0),
                    data: vec![]
                },
            ]
        );
    }

    #[test]
    fn test_raw_request_parsing() {
        assert_eq!(parse_request("255").unwrap(), 255);
        assert!(matches!(parse_request("256"), Err(IrecvError::InvalidRequest(_))));
        assert!(matches!(parse_request("abc"), Err(IrecvError::InvalidRequest(_))));

        assert_eq!("0xA1".parse::<RawEndpoint>().unwrap(), RawEndpoint::ClassIn);
        assert_eq!("a1".parse::<RawEndpoint>().unwrap(), RawEndpoint::ClassIn);
        assert_eq!("40".parse::<RawEndpoint>().unwrap(), RawEndpoint::VendorOut);
        assert_eq!("0x21".parse::<RawEndpoint>().unwrap(), RawEndpoint::ClassOut);
        assert!("41".parse::<RawEndpoint>().is_err());
    }

    #[test]
    fn test_invalid_raw_request_sends_nothing() {
        let (session, mock) = mock_session(DeviceMode::Recovery);
        assert!(session.raw_control_transfer(RawEndpoint::ClassOut, "x").is_err());
        assert!(mock.calls().is_empty());
    }
}
