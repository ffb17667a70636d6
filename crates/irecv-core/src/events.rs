//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front-end) follow transfers without the core
//! printing anything itself.

use std::fmt;

use crate::protocol::DeviceMode;

/// Which transfer protocol is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// File-send over the Recovery bulk endpoint.
    RecoverySend,
    /// File-send over DFU control transfers with the checksum trailer.
    DfuSend,
    /// Payload upload followed by execution.
    Upload,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::RecoverySend => write!(f, "Recovery Send"),
            TransferKind::DfuSend => write!(f, "DFU Send"),
            TransferKind::Upload => write!(f, "Upload"),
        }
    }
}

/// Events emitted by a device session.
#[derive(Debug, Clone)]
pub enum IrecvEvent {
    /// Device opened.
    Connected { mode: DeviceMode, pid: u16 },
    /// Handle released.
    Closed,
    /// Port reset issued; the handle is gone.
    DeviceReset,
    /// Console interface is ready.
    ConsoleAttached,
    /// A transfer started.
    TransferStarted {
        kind: TransferKind,
        total_bytes: usize,
        packets: usize,
    },
    /// A packet was accepted.
    Progress {
        kind: TransferKind,
        packet: usize,
        packets: usize,
        sent: u64,
        total: u64,
    },
    /// Device not ready yet, polling again.
    StatusRetry { attempt: u32, status: u8 },
    /// Payload delivered, waiting for execution milestones.
    Executing,
    /// A transfer finished.
    TransferComplete { kind: TransferKind },
    /// A command went out on the command channel.
    CommandSent { command: String },
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait IrecvObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &IrecvEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl IrecvObserver for NullObserver {
    fn on_event(&self, _event: &IrecvEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl IrecvObserver for TracingObserver {
    fn on_event(&self, event: &IrecvEvent) {
        match event {
            IrecvEvent::Connected { mode, pid } => {
                tracing::info!(mode = %mode, pid = %format!("{:04X}", pid), "Device connected");
            }
            IrecvEvent::Closed => {
                tracing::info!("Connection closed");
            }
            IrecvEvent::DeviceReset => {
                tracing::info!("Device reset");
            }
            IrecvEvent::ConsoleAttached => {
                tracing::info!("Attached to recovery console");
            }
            IrecvEvent::TransferStarted {
                kind,
                total_bytes,
                packets,
            } => {
                tracing::info!(kind = %kind, bytes = total_bytes, packets = packets, "Transfer started");
            }
            IrecvEvent::Progress {
                kind,
                packet,
                packets,
                sent,
                total,
            } => {
                let pct = if *total > 0 { (*sent * 100) / *total } else { 100 };
                tracing::debug!(
                    kind = %kind,
                    packet = %format!("{}/{}", packet, packets),
                    progress = %format!("{}%", pct),
                    "Sent {} of {} bytes",
                    sent,
                    total
                );
            }
            IrecvEvent::StatusRetry { attempt, status } => {
                tracing::warn!(attempt = attempt, status = status, "Device busy, polling status again");
            }
            IrecvEvent::Executing => {
                tracing::info!("Executing payload");
            }
            IrecvEvent::TransferComplete { kind } => {
                tracing::info!(kind = %kind, "Transfer complete");
            }
            IrecvEvent::CommandSent { command } => {
                tracing::debug!(command = %command, "Command sent");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::*;

    /// Observer that keeps every event, for assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<IrecvEvent>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<IrecvEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl IrecvObserver for RecordingObserver {
        fn on_event(&self, event: &IrecvEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
