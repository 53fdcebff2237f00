use bifrost::{BifrostError, FailureKind, Result};

#[test]
fn test_error_display() {
    let err = BifrostError::BackendNotInitialized {
        backend: "anthropic".to_string(),
    };
    assert!(err.to_string().contains("anthropic"));
    assert!(err.to_string().contains("not initialized"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(BifrostError::ShutDown)
    }
    assert!(returns_error().is_err());
}

#[test]
fn all_backends_failed_names_both_causes() {
    let err = BifrostError::AllBackendsFailed {
        last_error: Box::new(BifrostError::call_failed(
            "openai",
            FailureKind::Server,
            "HTTP 503",
        )),
        fallback_error: Box::new(BifrostError::call_failed(
            "degraded",
            FailureKind::Other,
            "template missing",
        )),
    };
    let rendered = err.to_string();
    assert!(rendered.contains("HTTP 503"));
    assert!(rendered.contains("template missing"));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_kinds() {
    for kind in [
        FailureKind::Timeout,
        FailureKind::Connection,
        FailureKind::HostNotFound,
        FailureKind::RateLimited,
        FailureKind::Server,
    ] {
        assert!(
            BifrostError::call_failed("b", kind, "x").is_transient(),
            "{kind} should be transient"
        );
    }
}

#[test]
fn non_transient_errors() {
    assert!(!BifrostError::call_failed("b", FailureKind::Authentication, "x").is_transient());
    assert!(!BifrostError::call_failed("b", FailureKind::InvalidRequest, "x").is_transient());
    assert!(!BifrostError::NoHealthyBackend.is_transient());
    assert!(!BifrostError::ShutDown.is_transient());
    assert!(
        !BifrostError::AnalysisParseFailed {
            backend: "b".into(),
            message: "x".into()
        }
        .is_transient()
    );
}

#[test]
fn status_codes_map_to_kinds() {
    assert_eq!(FailureKind::from_status(429), FailureKind::RateLimited);
    assert_eq!(FailureKind::from_status(401), FailureKind::Authentication);
    assert_eq!(FailureKind::from_status(403), FailureKind::Authentication);
    assert_eq!(FailureKind::from_status(408), FailureKind::Timeout);
    assert_eq!(FailureKind::from_status(502), FailureKind::Server);
    assert_eq!(FailureKind::from_status(404), FailureKind::InvalidRequest);
}

#[test]
fn backend_name_is_exposed() {
    let err = BifrostError::call_failed("openai", FailureKind::Timeout, "slow");
    assert_eq!(err.backend(), Some("openai"));
    assert_eq!(BifrostError::ShutDown.backend(), None);
}
