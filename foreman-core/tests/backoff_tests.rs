use foreman_core::{BackoffConfig, BackoffStrategy};
use std::time::Duration;

#[test]
fn test_large_multiplier_is_capped() {
    let mut backoff = BackoffStrategy::new()
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_secs(60))
        .with_multiplier(10.0)
        .with_jitter(0.0);

    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1000)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10000)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_secs(60)));
}

#[test]
fn test_fractional_multiplier() {
    let mut backoff = BackoffStrategy::new()
        .with_base_delay(Duration::from_millis(1000))
        .with_multiplier(1.5)
        .with_jitter(0.0);

    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1000)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1500)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(2250)));
}

#[test]
fn test_multiplier_below_one_is_clamped() {
    let mut backoff = BackoffStrategy::new()
        .with_base_delay(Duration::from_millis(500))
        .with_multiplier(0.5)
        .with_jitter(0.0);

    for _ in 0..5 {
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
    }
}

#[test]
fn test_excessive_jitter_is_clamped() {
    let mut backoff = BackoffStrategy::new()
        .with_base_delay(Duration::from_millis(1000))
        .with_multiplier(1.0)
        .with_jitter(5.0);

    for _ in 0..50 {
        let delay = backoff.next_delay().unwrap();
        assert!(delay <= Duration::from_millis(2000));
    }
}

#[test]
fn test_unbounded_attempts_never_exhaust() {
    let mut backoff = BackoffStrategy::new()
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(10))
        .with_jitter(0.0);

    for _ in 0..1000 {
        assert!(backoff.next_delay().is_some());
    }
    assert!(!backoff.is_exhausted());
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
}

#[test]
fn test_reset_after_exhaustion() {
    let mut backoff = BackoffStrategy::new()
        .with_base_delay(Duration::from_millis(100))
        .with_jitter(0.0)
        .with_max_attempts(2);

    backoff.next_delay();
    backoff.next_delay();
    assert_eq!(backoff.next_delay(), None);

    backoff.reset();
    assert_eq!(backoff.attempt(), 0);
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
}

#[test]
fn test_launch_backoff_from_config() {
    let config = BackoffConfig {
        base_delay_ms: 10,
        max_delay_ms: 40,
        multiplier: 2.0,
        jitter: 0.0,
        max_attempts: Some(4),
    };
    let mut backoff = BackoffStrategy::from_config(&config);

    let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40),
            Duration::from_millis(40),
        ]
    );
    assert!(backoff.is_exhausted());
}

#[test]
fn test_backoff_config_omitted_fields_default() {
    let config: BackoffConfig =
        serde_json::from_str(r#"{"base_delay_ms": 250, "max_attempts": 5}"#).unwrap();

    assert_eq!(config.base_delay_ms, 250);
    assert_eq!(config.max_attempts, Some(5));
    assert_eq!(config.max_delay_ms, 30000);
    assert_eq!(config.multiplier, 2.0);
    assert_eq!(config.jitter, 0.3);

    let empty: BackoffConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(empty.base_delay_ms, 100);
    assert_eq!(empty.max_attempts, None);
}
