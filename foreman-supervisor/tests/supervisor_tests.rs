mod common;

use common::{started, started_pid, test_config, wait_for_event};
use foreman_core::{CheckKind, EventSink, HealthCheckSpec, ServiceSpec, SupervisorEvent};
use foreman_supervisor::{ServiceRegistry, ServiceSupervisor};
use std::sync::Arc;
use std::time::Duration;

fn supervisor(
    registry: &ServiceRegistry,
    name: &str,
    config: foreman_core::SupervisorConfig,
) -> (ServiceSupervisor, tokio::sync::mpsc::Receiver<SupervisorEvent>) {
    let (events, rx) = EventSink::channel(1024);
    let supervisor = ServiceSupervisor::new(name, registry.clone(), Arc::new(config), events);
    (supervisor, rx)
}

async fn run_to_end(supervisor: ServiceSupervisor) {
    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("supervisor should finish");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_once_never_relaunches() {
    for command in ["echo hello", "exit 3"] {
        let registry = ServiceRegistry::new();
        registry
            .insert(ServiceSpec::new("job", command).run_once(true))
            .unwrap();
        let (supervisor, mut rx) = supervisor(&registry, "job", test_config());

        run_to_end(supervisor).await;

        let events = common::drain(&mut rx);
        let starts = events
            .iter()
            .filter(|e| matches!(e, SupervisorEvent::ServiceStarted { .. }))
            .count();
        assert_eq!(starts, 1, "{} should start exactly once", command);
        assert!(matches!(
            events.last(),
            Some(SupervisorEvent::ServiceFinished { .. })
        ));

        let instance = registry.instance("job").unwrap();
        assert!(instance.state.is_finished());
        assert_eq!(instance.pid, None);
        assert_eq!(instance.restarts, 0);
        assert!(instance.exit_status.is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exit_status_is_recorded() {
    let registry = ServiceRegistry::new();
    registry
        .insert(ServiceSpec::new("job", "exit 7").run_once(true))
        .unwrap();
    let (supervisor, mut rx) = supervisor(&registry, "job", test_config());

    run_to_end(supervisor).await;

    let exited = wait_for_event(&mut rx, |e| {
        matches!(e, SupervisorEvent::ServiceExited { .. })
    })
    .await;
    match exited {
        SupervisorEvent::ServiceExited { status, .. } => assert_eq!(status.code(), Some(7)),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        registry.instance("job").unwrap().exit_status.and_then(|s| s.code()),
        Some(7)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_service_relaunches_after_exit() {
    let registry = ServiceRegistry::new();
    registry
        .insert(ServiceSpec::new("flappy", "sleep 0.1"))
        .unwrap();
    let (supervisor, mut rx) = supervisor(&registry, "flappy", test_config());
    let task = tokio::spawn(supervisor.run());

    let first = started_pid(&wait_for_event(&mut rx, started("flappy")).await);
    let second = started_pid(&wait_for_event(&mut rx, started("flappy")).await);
    let third = started_pid(&wait_for_event(&mut rx, started("flappy")).await);
    assert_ne!(first, second);
    assert_ne!(second, third);
    assert!(registry.instance("flappy").unwrap().restarts >= 2);

    registry.interrupt_all();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("supervisor should end after shutdown")
        .unwrap();
    assert!(registry.instance("flappy").unwrap().state.is_finished());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_health_check_restarts_service() {
    let registry = ServiceRegistry::new();
    registry
        .insert(ServiceSpec::new("web", "sleep 30").with_checks(HealthCheckSpec {
            command: Some("false".to_string()),
            ..Default::default()
        }))
        .unwrap();
    let (supervisor, mut rx) = supervisor(&registry, "web", test_config());
    let task = tokio::spawn(supervisor.run());

    let first = started_pid(&wait_for_event(&mut rx, started("web")).await);

    let failed = wait_for_event(&mut rx, |e| {
        matches!(e, SupervisorEvent::HealthCheckFailed { .. })
    })
    .await;
    match failed {
        SupervisorEvent::HealthCheckFailed { pid, check, .. } => {
            assert_eq!(pid, first);
            assert_eq!(check, CheckKind::Command);
        }
        other => panic!("unexpected event {:?}", other),
    }

    wait_for_event(&mut rx, |e| {
        matches!(e, SupervisorEvent::ServiceExited { .. })
    })
    .await;
    let second = started_pid(&wait_for_event(&mut rx, started("web")).await);
    assert_ne!(first, second);

    registry.interrupt_all();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("supervisor should end after shutdown")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_launch_failure_backs_off_then_gives_up() {
    let registry = ServiceRegistry::new();
    registry.insert(ServiceSpec::new("web", "true")).unwrap();

    let mut config = test_config();
    config.shell = "/nonexistent/shell".to_string();
    config.launch_backoff.max_attempts = Some(2);
    let (supervisor, mut rx) = supervisor(&registry, "web", config);

    run_to_end(supervisor).await;

    let retries: Vec<_> = common::drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SupervisorEvent::LaunchFailed { retry_in, .. } => Some(retry_in),
            _ => None,
        })
        .collect();
    assert_eq!(retries.len(), 3);
    assert!(retries[0].is_some());
    assert!(retries[1].is_some());
    assert!(retries[2].is_none());
    assert!(registry.instance("web").unwrap().state.is_finished());
}

#[tokio::test]
async fn test_unknown_service_ends_immediately() {
    let registry = ServiceRegistry::new();
    let (supervisor, _rx) = supervisor(&registry, "ghost", test_config());

    assert_eq!(supervisor.name(), "ghost");
    run_to_end(supervisor).await;
}

#[tokio::test]
async fn test_shutdown_before_launch() {
    let registry = ServiceRegistry::new();
    registry.insert(ServiceSpec::new("web", "sleep 30")).unwrap();
    registry.interrupt_all();
    let (supervisor, mut rx) = supervisor(&registry, "web", test_config());

    run_to_end(supervisor).await;

    let events = common::drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SupervisorEvent::ServiceStarted { .. })));
    assert!(registry.instance("web").unwrap().state.is_finished());
}
