//! Integration tests for telemetry initialization and span helpers.

use uuid::Uuid;
use workpull::model::work::State;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Only one global subscriber can be set per process; a second init
    // returning Err is acceptable here.
    let config = workpull::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "workpull-test".to_string(),
        default_filter: "debug".to_string(),
    };
    let _guard = workpull::telemetry::init_telemetry(config);
}

#[test]
fn iteration_span_records_transitions() {
    let id = Uuid::new_v4();
    let span = workpull::telemetry::work::start_iteration_span("directory", &id);
    workpull::telemetry::work::record_state_transition(&span, State::Ready, State::Executing);
    workpull::telemetry::work::record_state_transition(&span, State::Executing, State::Ack);
    workpull::telemetry::work::record_state_transition(&span, State::Ack, State::Ready);
}

#[test]
fn state_machine_allows_only_lifecycle_edges() {
    assert!(State::Init.can_transition_to(State::Ready));
    assert!(State::Ready.can_transition_to(State::Ready));
    assert!(State::Executing.can_transition_to(State::Fail));
    assert!(!State::Ack.can_transition_to(State::Fail));
    assert!(!State::Ready.can_transition_to(State::Ack));
    assert!(!State::Terminal.can_transition_to(State::Ready));
    assert!(State::Fatal.is_terminal());
}
