pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod process;
pub mod service;

pub use backoff::BackoffStrategy;
pub use config::{BackoffConfig, HealthCheckSpec, Procfile, ServiceSpec, SupervisorConfig};
pub use error::{Error, Result};
pub use events::{CheckKind, EventSink, SupervisorEvent};
pub use graph::DependencyGraph;
pub use process::{ExitStatus, ProcessBuilder, interrupt_group, kill_group};
pub use service::{ServiceInstance, ServiceState};
