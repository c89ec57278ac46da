//! Verification runs over the in-process transport.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use shmbridge::{HostError, Verifier, VerifyOptions};
use shmbridge_channel::{ChannelFactory, LoopbackTransport};

fn quick_options() -> VerifyOptions {
    VerifyOptions {
        domain_id: 0,
        rate_hz: 100.0,
        duration: Duration::from_millis(200),
        warmup: Duration::from_millis(20),
        cooldown: Duration::ZERO,
        read_interval: Duration::from_millis(5),
    }
}

fn verifier() -> Verifier {
    let factory = ChannelFactory::new(Arc::new(LoopbackTransport::new()));
    Verifier::new(factory, quick_options())
}

#[test]
fn test_selected_types_pass() {
    let only = vec![
        "float_7d".to_string(),
        "uint_100d".to_string(),
        "dual_arm_state".to_string(),
    ];
    let reports = verifier().run(&only).unwrap();

    let labels: Vec<_> = reports.iter().map(|r| r.label).collect();
    assert_eq!(labels, ["float_7d", "uint_100d", "dual_arm_state"]);

    for report in &reports {
        assert!(report.published > 0, "{}: nothing published", report.label);
        assert_eq!(report.publish_errors, 0, "{}", report.label);
        assert!(report.passed(), "{}: {report:?}", report.label);
        assert!(report.received <= report.published, "{}", report.label);
        assert_eq!(report.topic, format!("rt/verify/{}", report.label));
    }

    // No timestamp in the payload, so no latency either.
    assert_eq!(reports[1].avg_latency_ms, 0.0);
}

#[test]
fn test_unknown_type_is_rejected() {
    let err = verifier().run(&["nope".to_string()]).unwrap_err();
    assert!(matches!(err, HostError::ConfigValidation(_)));
}

#[test]
fn test_stop_flag_skips_remaining_types() {
    let verifier = verifier();
    verifier.stop_handle().store(true, Ordering::Release);
    let reports = verifier.run(&[]).unwrap();
    assert!(reports.is_empty());
}
