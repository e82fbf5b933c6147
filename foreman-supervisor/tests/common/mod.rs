#![allow(dead_code)]

use foreman_core::{BackoffConfig, SupervisorConfig, SupervisorEvent};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        check_interval: Duration::from_millis(50),
        check_timeout: Duration::from_millis(500),
        shell: "sh".to_string(),
        launch_backoff: BackoffConfig {
            base_delay_ms: 10,
            max_delay_ms: 50,
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts: None,
        },
    }
}

/// Waits for the first event matching `pred`, skipping everything else.
pub async fn wait_for_event<F>(rx: &mut mpsc::Receiver<SupervisorEvent>, pred: F) -> SupervisorEvent
where
    F: Fn(&SupervisorEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for supervisor event")
}

pub fn started(service: &str) -> impl Fn(&SupervisorEvent) -> bool + '_ {
    move |event| matches!(event, SupervisorEvent::ServiceStarted { service: s, .. } if s == service)
}

pub fn started_pid(event: &SupervisorEvent) -> u32 {
    match event {
        SupervisorEvent::ServiceStarted { pid, .. } => *pid,
        other => panic!("expected ServiceStarted, got {:?}", other),
    }
}

pub fn drain(rx: &mut mpsc::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Whether `pid` is a live, non-zombie process.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z' && state != 'X'),
        Err(_) => false,
    }
}

/// Polls until `pid` has exited, giving up after `timeout`.
#[cfg(target_os = "linux")]
pub async fn wait_until_dead(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !process_alive(pid)
}
