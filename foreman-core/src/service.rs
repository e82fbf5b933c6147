use std::time::Instant;

use crate::ExitStatus;

/// Where a service is in its supervision lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotStarted,
    Running { pid: u32, since: Instant },
    /// The process is gone and a relaunch is imminent.
    Exited,
    /// Launching failed and the supervisor is waiting to retry.
    Backoff { attempt: u32 },
    /// Supervision ended: run-once exit, exhausted launch retries or shutdown.
    Finished,
}

impl ServiceState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Running { pid, .. } => Some(*pid),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// Point-in-time view of one service's current process instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub service: String,
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub exit_status: Option<ExitStatus>,
    pub restarts: u32,
}

impl ServiceInstance {
    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    /// Whether dependents may keep running on top of this service.
    ///
    /// A service that has not launched yet is still pending, and a run-once
    /// service that finished cleanly has done its job.
    pub fn satisfies_dependents(&self) -> bool {
        match self.state {
            ServiceState::NotStarted | ServiceState::Running { .. } => true,
            ServiceState::Finished => self.exit_status.is_some_and(|s| s.success()),
            ServiceState::Exited | ServiceState::Backoff { .. } => false,
        }
    }
}
