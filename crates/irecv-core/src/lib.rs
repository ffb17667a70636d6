//! irecv-core: host-side upload protocols for Apple mobile bootloaders.
//!
//! Talks to a device in Recovery (iBoot), WTF or DFU (SecureROM) mode over
//! USB and drives the two payload protocols those bootloaders accept.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, request setup, status codes, checksum and trailer
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Session**: Mode probing, handle ownership, console interface, reset
//! - **Status**: Single-shot and bounded-retry status polling
//! - **Transfer**: Recovery bulk send, DFU send with trailer, upload-and-execute
//! - **Command**: iBoot command channel and auto-boot
//! - **Exploit**: Exploit trigger and raw control requests
//! - **Script**: Console / batch command parsing
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use irecv_core::{DeviceSession, Finalize, SessionConfig};
//!
//! let mut session = DeviceSession::connect(SessionConfig::default())?;
//! println!("Connected in {} mode", session.mode());
//! session.send("iBSS.dfu", Finalize::Notify)?;
//! # Ok::<(), irecv_core::IrecvError>(())
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod exploit;
pub mod payload;
pub mod protocol;
pub mod script;
pub mod session;
pub mod status;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use command::validate_command;
pub use config::{RetryPolicy, SessionConfig};
pub use error::IrecvError;
pub use events::{IrecvEvent, IrecvObserver, NullObserver, TracingObserver, TransferKind};
pub use exploit::RawEndpoint;
pub use payload::Payload;
pub use protocol::{ChecksumTrailer, DeviceMode, DeviceStatus, DfuChecksum};
pub use script::{ConsoleCommand, ScriptError, ScriptLine};
pub use session::DeviceSession;
pub use transfer::{Finalize, TransferPlan};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
