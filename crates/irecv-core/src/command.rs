//! iBoot command channel (vendor request 0).

use tracing::{info, warn};

use crate::error::{IrecvError, Result};
use crate::events::{IrecvEvent, IrecvObserver};
use crate::protocol::ControlSetup;
use crate::protocol::constants::{AUTOBOOT_SEQUENCE, ENV_RESPONSE_LEN, MAX_COMMAND_LEN};
use crate::session::DeviceSession;
use crate::transport::UsbTransport;

/// Check a command against the length limit, terminator included.
pub fn validate_command(command: &str) -> Result<()> {
    let length = command.len() + 1;
    if length >= MAX_COMMAND_LEN {
        return Err(IrecvError::CommandTooLong {
            length,
            limit: MAX_COMMAND_LEN,
        });
    }
    Ok(())
}

impl<T: UsbTransport, O: IrecvObserver> DeviceSession<T, O> {
    /// Send a NUL-terminated command in a single control transfer.
    pub fn send_command(&self, command: &str) -> Result<()> {
        validate_command(command)?;

        let mut data = Vec::with_capacity(command.len() + 1);
        data.extend_from_slice(command.as_bytes());
        data.push(0);

        let written = self
            .transport()?
            .control_out(ControlSetup::command(), &data, self.config().short_timeout())?;
        if written != data.len() {
            return Err(IrecvError::TransferSizeMismatch {
                expected: data.len(),
                actual: written,
            });
        }

        self.emit(IrecvEvent::CommandSent {
            command: command.to_string(),
        });
        Ok(())
    }

    /// Read the reply to a `getenv`, with NUL padding trimmed.
    pub fn read_env_response(&self) -> Result<String> {
        let data = self.transport()?.control_in(
            ControlSetup::env_read(),
            ENV_RESPONSE_LEN,
            self.config().short_timeout(),
        )?;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Ok(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    /// Set auto-boot, save the environment and reboot.
    ///
    /// Every command is attempted even if an earlier one fails; the failures
    /// are returned with the command that caused them.
    pub fn enable_autoboot(&self) -> Vec<(&'static str, IrecvError)> {
        info!("Enabling auto-boot");
        AUTOBOOT_SEQUENCE
            .iter()
            .filter_map(|&command| match self.send_command(command) {
                Ok(()) => None,
                Err(e) => {
                    warn!(command, error = %e, "Auto-boot command failed");
                    Some((command, e))
                }
            })
            .collect()
    }
}
