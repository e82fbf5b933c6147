use foreman_core::{
    DependencyGraph, Error, ExitStatus, Result, ServiceInstance, ServiceSpec, ServiceState,
    interrupt_group,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Child;
use tracing::warn;

/// What a supervisor should do after its process exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Restart,
    Finished,
}

#[derive(Debug)]
struct ServiceRecord {
    spec: Arc<ServiceSpec>,
    state: ServiceState,
    exit_status: Option<ExitStatus>,
    launches: u32,
}

impl ServiceRecord {
    fn instance(&self) -> ServiceInstance {
        ServiceInstance {
            service: self.spec.name.clone(),
            state: self.state,
            pid: self.state.pid(),
            exit_status: self.exit_status,
            restarts: self.launches.saturating_sub(1),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, ServiceRecord>,
    closed: bool,
}

/// Shared table of every service and its current process instance.
///
/// One process-wide lock guards the whole table. Each method is a single
/// critical section and never awaits while holding it, so launching,
/// recording an exit and signalling are atomic with respect to every other
/// service's supervisor. At most one live process exists per service.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, spec: ServiceSpec) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.records.contains_key(&spec.name) {
            return Err(Error::Config(format!("Service '{}' is defined twice", spec.name)));
        }
        inner.records.insert(
            spec.name.clone(),
            ServiceRecord {
                spec: Arc::new(spec),
                state: ServiceState::NotStarted,
                exit_status: None,
                launches: 0,
            },
        );
        Ok(())
    }

    pub fn spec(&self, name: &str) -> Option<Arc<ServiceSpec>> {
        self.inner.lock().records.get(name).map(|r| r.spec.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.lock().records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn instance(&self, name: &str) -> Option<ServiceInstance> {
        self.inner.lock().records.get(name).map(ServiceRecord::instance)
    }

    pub fn instances(&self) -> Vec<ServiceInstance> {
        self.inner
            .lock()
            .records
            .values()
            .map(ServiceRecord::instance)
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.inner
            .lock()
            .records
            .values()
            .filter(|r| r.state.is_running())
            .count()
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        let inner = self.inner.lock();
        DependencyGraph::from_services(inner.records.values().map(|r| r.spec.as_ref()))
    }

    /// Starts a new instance of `name` with `spawn` and records it as running.
    ///
    /// The spawn happens under the lock so a concurrent shutdown either sees
    /// the new process or prevents it from starting.
    pub fn launch<F>(&self, name: &str, spawn: F) -> Result<(Child, u32)>
    where
        F: FnOnce(&ServiceSpec) -> Result<Child>,
    {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::ShuttingDown);
        }

        let record = inner
            .records
            .get_mut(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?;
        if record.state.is_running() {
            return Err(Error::AlreadyRunning(name.to_string()));
        }

        let child = spawn(&record.spec)?;
        let pid = child
            .id()
            .ok_or_else(|| Error::SpawnFailed(format!("{}: process exited before start", name)))?;

        record.state = ServiceState::Running {
            pid,
            since: Instant::now(),
        };
        record.exit_status = None;
        record.launches = record.launches.saturating_add(1);
        Ok((child, pid))
    }

    /// Clears the process handle of `name` and decides whether it restarts.
    pub fn record_exit(&self, name: &str, status: ExitStatus) -> Lifecycle {
        let mut inner = self.inner.lock();
        let closed = inner.closed;
        let Some(record) = inner.records.get_mut(name) else {
            return Lifecycle::Finished;
        };

        record.exit_status = Some(status);
        if record.spec.run_once || closed {
            record.state = ServiceState::Finished;
            Lifecycle::Finished
        } else {
            record.state = ServiceState::Exited;
            Lifecycle::Restart
        }
    }

    pub fn record_launch_failure(&self, name: &str, attempt: u32) {
        if let Some(record) = self.inner.lock().records.get_mut(name)
            && !record.state.is_running()
        {
            record.state = ServiceState::Backoff { attempt };
        }
    }

    pub fn mark_finished(&self, name: &str) {
        if let Some(record) = self.inner.lock().records.get_mut(name)
            && !record.state.is_running()
        {
            record.state = ServiceState::Finished;
        }
    }

    /// First dependency in `deps` that is known and no longer alive.
    /// Names without a record are not services of ours and are skipped.
    pub fn failed_dependency(&self, deps: &[String]) -> Option<String> {
        let inner = self.inner.lock();
        deps.iter()
            .find(|dep| {
                inner
                    .records
                    .get(dep.as_str())
                    .is_some_and(|r| !r.instance().satisfies_dependents())
            })
            .cloned()
    }

    /// Interrupts the process group of `name` only if `pid` is still its
    /// current instance. Returns whether a signal was sent.
    pub fn interrupt_if_current(&self, name: &str, pid: u32) -> Result<bool> {
        let inner = self.inner.lock();
        if inner.closed {
            return Ok(false);
        }
        match inner.records.get(name).and_then(|r| r.state.pid()) {
            Some(current) if current == pid => {
                interrupt_group(pid)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Closes the registry to new launches and interrupts every live process
    /// group once. Later calls interrupt nothing.
    pub fn interrupt_all(&self) -> Vec<String> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Vec::new();
        }
        inner.closed = true;

        let mut interrupted = Vec::new();
        for (name, record) in &inner.records {
            if let Some(pid) = record.state.pid() {
                match interrupt_group(pid) {
                    Ok(()) => interrupted.push(name.clone()),
                    Err(e) => warn!("Failed to interrupt {} (PID {}): {}", name, pid, e),
                }
            }
        }
        interrupted
    }
}
