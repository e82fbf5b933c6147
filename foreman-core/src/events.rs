use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::ExitStatus;

/// The four probes a health checker runs on every tick, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Dependency,
    Command,
    Tcp,
    Udp,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckKind::Dependency => "dependencies",
            CheckKind::Command => "command",
            CheckKind::Tcp => "tcp ports",
            CheckKind::Udp => "udp ports",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    ServiceStarted { service: String, pid: u32 },
    ServiceExited { service: String, status: ExitStatus },
    LaunchFailed { service: String, reason: String, retry_in: Option<Duration> },
    HealthCheckFailed { service: String, pid: u32, check: CheckKind, reason: String },
    ServiceFinished { service: String },
    ShutdownRequested { interrupted: usize },
}

impl SupervisorEvent {
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::ServiceStarted { service, .. }
            | Self::ServiceExited { service, .. }
            | Self::LaunchFailed { service, .. }
            | Self::HealthCheckFailed { service, .. }
            | Self::ServiceFinished { service } => Some(service),
            Self::ShutdownRequested { .. } => None,
        }
    }
}

/// Non-blocking event publisher. A full or closed channel drops the event.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<SupervisorEvent>,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SupervisorEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SupervisorEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::trace!("Dropping supervisor event: {}", e);
        }
    }
}
