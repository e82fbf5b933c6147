mod foreman;
mod health;
mod registry;
mod service;
mod signals;

pub use foreman::Foreman;
pub use health::{CommandProbe, HealthChecker, HealthProbe, TcpProbe, UdpProbe, probes_for};
pub use registry::{Lifecycle, ServiceRegistry};
pub use service::ServiceSupervisor;
pub use signals::{ShutdownSignal, ShutdownSignals};
