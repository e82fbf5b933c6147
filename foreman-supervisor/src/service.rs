use foreman_core::{
    BackoffStrategy, Error, EventSink, ExitStatus, ProcessBuilder, SupervisorConfig,
    SupervisorEvent,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time;
use tracing::{error, info, warn};

use crate::health::HealthChecker;
use crate::registry::{Lifecycle, ServiceRegistry};

/// Keeps one service running: launch, health-check, wait, restart.
///
/// Exit codes never influence the restart decision. Only the run-once flag
/// and a registry shutdown end the loop; launch errors back off and retry.
pub struct ServiceSupervisor {
    name: String,
    registry: ServiceRegistry,
    config: Arc<SupervisorConfig>,
    events: EventSink,
}

impl ServiceSupervisor {
    pub fn new(
        name: impl Into<String>,
        registry: ServiceRegistry,
        config: Arc<SupervisorConfig>,
        events: EventSink,
    ) -> Self {
        Self {
            name: name.into(),
            registry,
            config,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(self) {
        let Some(spec) = self.registry.spec(&self.name) else {
            warn!("Service {} is not defined, nothing to supervise", self.name);
            return;
        };
        let mut backoff = BackoffStrategy::from_config(&self.config.launch_backoff);

        loop {
            let launched = self.registry.launch(&self.name, |spec| {
                ProcessBuilder::shell(&self.config.shell, &spec.command)
                    .own_process_group(true)
                    .spawn()
            });

            let (mut child, pid) = match launched {
                Ok(launched) => {
                    backoff.reset();
                    launched
                }
                Err(Error::ShuttingDown) => {
                    self.registry.mark_finished(&self.name);
                    self.finish();
                    return;
                }
                Err(e) => {
                    let retry_in = backoff.next_delay();
                    error!("Failed to launch service {}: {}", self.name, e);
                    self.events.emit(SupervisorEvent::LaunchFailed {
                        service: self.name.clone(),
                        reason: e.to_string(),
                        retry_in,
                    });

                    match retry_in {
                        Some(delay) => {
                            self.registry
                                .record_launch_failure(&self.name, backoff.attempt());
                            time::sleep(delay).await;
                            continue;
                        }
                        None => {
                            warn!(
                                "Giving up on service {} after {} failed launches",
                                self.name,
                                backoff.attempt()
                            );
                            self.registry.mark_finished(&self.name);
                            self.finish();
                            return;
                        }
                    }
                }
            };

            info!("{} service has been started with PID {}", self.name, pid);
            self.events.emit(SupervisorEvent::ServiceStarted {
                service: self.name.clone(),
                pid,
            });

            let (stop_tx, stop_rx) = oneshot::channel();
            let checker = HealthChecker::new(
                spec.clone(),
                pid,
                self.registry.clone(),
                &self.config,
                self.events.clone(),
            )
            .spawn(stop_rx);

            let status = match child.wait().await {
                Ok(status) => ExitStatus::from_std(status),
                Err(e) => {
                    error!("Failed to wait for service {}: {}", self.name, e);
                    ExitStatus::new(None, None)
                }
            };

            // The process is reaped, so its pid must leave the registry before
            // anything else can signal it.
            let lifecycle = self.registry.record_exit(&self.name, status);

            let _ = stop_tx.send(());
            if let Err(e) = checker.await {
                warn!("Health checker for {} ended abnormally: {}", self.name, e);
            }

            info!("{} service exited with {}", self.name, status);
            self.events.emit(SupervisorEvent::ServiceExited {
                service: self.name.clone(),
                status,
            });

            if lifecycle == Lifecycle::Finished {
                self.finish();
                return;
            }
        }
    }

    fn finish(&self) {
        info!("{} service will not be restarted", self.name);
        self.events.emit(SupervisorEvent::ServiceFinished {
            service: self.name.clone(),
        });
    }
}
