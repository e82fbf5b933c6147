use async_trait::async_trait;
use foreman_core::{
    CheckKind, EventSink, ExitStatus, HealthCheckSpec, ProcessBuilder, ServiceSpec,
    SupervisorConfig, SupervisorEvent, kill_group,
};
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::registry::ServiceRegistry;

/// How long a UDP probe listens for an ICMP "port unreachable" after sending.
const UDP_REPLY_WINDOW: Duration = Duration::from_millis(20);

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn kind(&self) -> CheckKind;

    async fn probe(&self) -> Result<(), String>;
}

/// Runs a shell command to completion; any non-zero exit fails.
pub struct CommandProbe {
    shell: String,
    command: String,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(shell: impl Into<String>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for CommandProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Command
    }

    async fn probe(&self) -> Result<(), String> {
        let mut child = ProcessBuilder::shell(&self.shell, &self.command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .own_process_group(true)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| e.to_string())?;
        // Declared after `child` so the group is killed before the shell is
        // dropped, on every exit path including cancellation.
        let _group = child.id().map(CheckGroup);

        match time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(format!(
                "`{}` failed with {}",
                self.command,
                ExitStatus::from_std(status)
            )),
            Ok(Err(e)) => Err(format!("`{}`: {}", self.command, e)),
            Err(_) => Err(format!("`{}` timed out after {:?}", self.command, self.timeout)),
        }
    }
}

/// Kills whatever is left of a check command's process group.
struct CheckGroup(u32);

impl Drop for CheckGroup {
    fn drop(&mut self) {
        // Fails with ESRCH once every member has exited.
        if let Err(e) = kill_group(self.0) {
            trace!("Check process group {} not killed: {}", self.0, e);
        }
    }
}

/// Succeeds when a TCP connection to the local port can be established.
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Tcp
    }

    async fn probe(&self) -> Result<(), String> {
        match time::timeout(self.timeout, TcpStream::connect((Ipv4Addr::LOCALHOST, self.port)))
            .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("tcp port {}: {}", self.port, e)),
            Err(_) => Err(format!("tcp port {}: connect timed out", self.port)),
        }
    }
}

/// Best-effort UDP reachability.
///
/// Sends an empty datagram to the local port. A reply or silence within the
/// reply window passes; only an explicit refusal (ICMP port unreachable)
/// fails.
pub struct UdpProbe {
    port: u16,
    timeout: Duration,
}

impl UdpProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    async fn exchange(&self) -> std::io::Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        socket.connect((Ipv4Addr::LOCALHOST, self.port)).await?;
        socket.send(&[]).await?;

        let mut buf = [0u8; 512];
        match time::timeout(UDP_REPLY_WINDOW.min(self.timeout), socket.recv(&mut buf)).await {
            Ok(received) => received.map(|_| ()),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl HealthProbe for UdpProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Udp
    }

    async fn probe(&self) -> Result<(), String> {
        match self.exchange().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                Err(format!("udp port {}: nothing is listening", self.port))
            }
            Err(e) => Err(format!("udp port {}: {}", self.port, e)),
        }
    }
}

/// Builds the probes for `checks` in evaluation order: command, TCP, UDP.
pub fn probes_for(checks: &HealthCheckSpec, config: &SupervisorConfig) -> Vec<Box<dyn HealthProbe>> {
    let mut probes: Vec<Box<dyn HealthProbe>> = Vec::new();

    if let Some(command) = &checks.command {
        probes.push(Box::new(CommandProbe::new(
            &config.shell,
            command,
            config.check_timeout,
        )));
    }
    for &port in &checks.tcp_ports {
        probes.push(Box::new(TcpProbe::new(port, config.check_timeout)));
    }
    for &port in &checks.udp_ports {
        probes.push(Box::new(UdpProbe::new(port, config.check_timeout)));
    }

    probes
}

/// Periodic liveness checks bound to one process instance of a service.
///
/// The checker signals, it never reaps: on a failing tick it interrupts the
/// instance's process group once and keeps ticking until the owning
/// supervisor sends the stop request.
pub struct HealthChecker {
    spec: Arc<ServiceSpec>,
    pid: u32,
    registry: ServiceRegistry,
    probes: Vec<Box<dyn HealthProbe>>,
    interval: Duration,
    events: EventSink,
}

impl HealthChecker {
    pub fn new(
        spec: Arc<ServiceSpec>,
        pid: u32,
        registry: ServiceRegistry,
        config: &SupervisorConfig,
        events: EventSink,
    ) -> Self {
        let probes = probes_for(&spec.checks, config);
        Self {
            spec,
            pid,
            registry,
            probes,
            interval: config.check_interval,
            events,
        }
    }

    pub fn with_probes(mut self, probes: Vec<Box<dyn HealthProbe>>) -> Self {
        self.probes = probes;
        self
    }

    pub fn spawn(self, stop: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    pub async fn run(self, mut stop: oneshot::Receiver<()>) {
        let name = self.spec.name.as_str();
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("{} checks have been started", name);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = ticker.tick() => {}
            }

            // A stop request cancels in-flight probes so the old instance is
            // never acted upon.
            let failure = tokio::select! {
                biased;
                _ = &mut stop => break,
                failure = self.check() => failure,
            };

            if let Some((check, reason)) = failure {
                if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                    break;
                }
                self.interrupt(check, reason);
            }
        }

        debug!("{} checks stopped", name);
    }

    /// Runs one tick. Returns the first failing check, if any.
    pub async fn check(&self) -> Option<(CheckKind, String)> {
        if let Some(dep) = self.registry.failed_dependency(&self.spec.deps) {
            return Some((
                CheckKind::Dependency,
                format!("dependency {} is not running", dep),
            ));
        }

        for probe in &self.probes {
            if let Err(reason) = probe.probe().await {
                return Some((probe.kind(), reason));
            }
        }

        None
    }

    fn interrupt(&self, check: CheckKind, reason: String) {
        let name = &self.spec.name;
        match self.registry.interrupt_if_current(name, self.pid) {
            Ok(true) => {
                info!(
                    "{} check for {} failed ({}), service has been interrupted",
                    check, name, reason
                );
                self.events.emit(SupervisorEvent::HealthCheckFailed {
                    service: name.clone(),
                    pid: self.pid,
                    check,
                    reason,
                });
            }
            Ok(false) => debug!("{} check for {} failed on a stale instance", check, name),
            Err(e) => warn!("Failed to interrupt {} (PID {}): {}", name, self.pid, e),
        }
    }
}
