use foreman_core::{
    DependencyGraph, Error, EventSink, Procfile, Result, ServiceSpec, SupervisorConfig,
    SupervisorEvent,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::registry::ServiceRegistry;
use crate::service::ServiceSupervisor;
use crate::signals::ShutdownSignals;

const EVENT_CAPACITY: usize = 1024;

/// Top-level orchestrator: validates the dependency graph, spawns one
/// supervisor per service in topological order and owns shutdown.
pub struct Foreman {
    registry: ServiceRegistry,
    config: Arc<SupervisorConfig>,
    events: EventSink,
    event_rx: parking_lot::Mutex<Option<mpsc::Receiver<SupervisorEvent>>>,
}

impl Foreman {
    pub fn new<I>(services: I, config: SupervisorConfig) -> Result<Self>
    where
        I: IntoIterator<Item = ServiceSpec>,
    {
        let registry = ServiceRegistry::new();
        for spec in services {
            registry.insert(spec)?;
        }

        let (events, event_rx) = EventSink::channel(EVENT_CAPACITY);
        Ok(Self {
            registry,
            config: Arc::new(config),
            events,
            event_rx: parking_lot::Mutex::new(Some(event_rx)),
        })
    }

    pub async fn load(path: impl AsRef<Path>, config: SupervisorConfig) -> Result<Self> {
        let procfile = Procfile::load(path).await?;
        Self::new(procfile.into_services(), config)
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Takes the event stream. Later calls get an already-closed receiver.
    ///
    /// Events are buffered until the receiver is taken; once the buffer is
    /// full, further events are dropped. [`Foreman::start`] drains an
    /// untaken stream itself.
    pub fn events(&self) -> mpsc::Receiver<SupervisorEvent> {
        self.event_rx.lock().take().unwrap_or_else(|| {
            let (_, rx) = mpsc::channel(1);
            rx
        })
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        self.registry.dependency_graph()
    }

    /// Service names with every dependency ahead of its dependents.
    pub fn launch_order(&self) -> Result<Vec<String>> {
        self.dependency_graph().top_sort()
    }

    /// Spawns one supervisor task per service, dependencies first.
    ///
    /// Ordering only affects spawn sequence; no dependent waits for its
    /// dependencies to become ready. A cyclic graph is rejected before any
    /// process starts.
    pub fn spawn_supervisors(&self) -> Result<JoinSet<()>> {
        let order = self.launch_order()?;
        let mut supervisors = JoinSet::new();

        for name in order {
            if self.registry.spec(&name).is_none() {
                warn!("Dependency {} is not a defined service, skipping it", name);
                continue;
            }
            let supervisor = ServiceSupervisor::new(
                name,
                self.registry.clone(),
                self.config.clone(),
                self.events.clone(),
            );
            supervisors.spawn(supervisor.run());
        }

        Ok(supervisors)
    }

    /// Runs every service until all supervisors end or a shutdown signal
    /// arrives. A signal terminates the whole process with status 1.
    ///
    /// If [`Foreman::events`] was never taken, events are drained into the
    /// debug log for the duration of the run.
    pub async fn start(&self) -> Result<()> {
        self.launch_order()?;

        // Services run in their own process groups, so the handlers must be
        // in place before the first launch.
        let mut signals = ShutdownSignals::install()
            .map_err(|e| Error::Signal(format!("Failed to install signal handlers: {}", e)))?;

        let event_log = self
            .event_rx
            .lock()
            .take()
            .map(|rx| tokio::spawn(log_events(rx)));

        let mut supervisors = self.spawn_supervisors()?;
        info!("Supervising {} services", supervisors.len());

        let registry = self.registry.clone();
        let events = self.events.clone();
        let signal_task = tokio::spawn(async move {
            let signal = signals.recv().await;
            info!("Received {}, stopping all services", signal);
            terminate_and_exit(&registry, &events, 1);
        });

        while let Some(result) = supervisors.join_next().await {
            if let Err(e) = result {
                error!("Service supervisor task failed: {}", e);
            }
        }

        signal_task.abort();
        if let Some(event_log) = event_log {
            event_log.abort();
        }
        Ok(())
    }

    /// Interrupts every live process group once and stops further restarts.
    /// Returns how many groups were signalled.
    pub fn terminate_all(&self) -> usize {
        terminate(&self.registry, &self.events)
    }

    /// Interrupts every live service, then exits the process with `status`.
    pub fn exit(&self, status: i32) -> ! {
        terminate_and_exit(&self.registry, &self.events, status)
    }
}

async fn log_events(mut rx: mpsc::Receiver<SupervisorEvent>) {
    while let Some(event) = rx.recv().await {
        debug!("Supervisor event: {:?}", event);
    }
}

fn terminate(registry: &ServiceRegistry, events: &EventSink) -> usize {
    let interrupted = registry.interrupt_all();
    for name in &interrupted {
        info!("Interrupted service {}", name);
    }
    events.emit(SupervisorEvent::ShutdownRequested {
        interrupted: interrupted.len(),
    });
    interrupted.len()
}

fn terminate_and_exit(registry: &ServiceRegistry, events: &EventSink, status: i32) -> ! {
    terminate(registry, events);
    std::process::exit(status)
}
