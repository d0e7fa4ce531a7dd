//! Integration tests for the model session lifecycle
//!
//! Tests for:
//! - State transitions and out-of-order calls
//! - Clock after initialize and update (default and explicit steps)
//! - Failed initialize, finalize-once, unload, drop
//! - Aliasing registry

mod common;

use common::*;
use bmi_runtime::registry;

// ============================================================================
// Transitions
// ============================================================================

#[test]
fn test_initialize_sets_clock() {
    let mut model = TestModel::loaded();
    assert_eq!(model.session.state(), SessionState::Loaded);

    model.session.initialize("").unwrap();
    assert_eq!(model.session.state(), SessionState::Initialized);

    let clock = model.session.clock();
    assert_eq!(clock.start, 0.0);
    assert_eq!(clock.current, 0.0);
    assert_eq!(clock.end, 10.0);
    assert_eq!(model.session.time_step().unwrap(), Some(1.0));
}

#[test]
fn test_update_before_initialize_is_invalid_state() {
    let mut model = TestModel::loaded();
    match model.session.update(1.0) {
        Err(BmiError::InvalidState { operation, state }) => {
            assert_eq!(operation, "update");
            assert_eq!(state, SessionState::Loaded);
        }
        other => panic!("Wrong result: {:?}", other),
    }
    assert!(matches!(
        model.session.get_var("var1"),
        Err(BmiError::InvalidState { .. })
    ));
}

#[test]
fn test_initialize_twice_is_rejected() {
    let mut model = TestModel::initialized();
    assert!(matches!(
        model.session.initialize(""),
        Err(BmiError::AlreadyInitialized)
    ));
    assert_eq!(model.session.state(), SessionState::Initialized);
}

#[test]
fn test_update_steps() {
    let mut model = TestModel::initialized();

    model.session.update(-1.0).unwrap();
    assert_eq!(model.session.current_time().unwrap(), 1.0);

    model.session.update(2.5).unwrap();
    assert_eq!(model.session.current_time().unwrap(), 3.5);
    assert_eq!(model.session.clock().current, 3.5);

    model.session.update_default().unwrap();
    assert_eq!(model.session.current_time().unwrap(), 4.5);
}

#[test]
fn test_finalize_once() {
    let mut model = TestModel::initialized();
    model.session.finalize().unwrap();
    assert_eq!(model.session.state(), SessionState::Finalized);

    assert!(matches!(
        model.session.finalize(),
        Err(BmiError::InvalidState { state: SessionState::Finalized, .. })
    ));
    assert!(matches!(
        model.session.update(1.0),
        Err(BmiError::InvalidState { .. })
    ));
    assert!(matches!(
        model.session.initialize(""),
        Err(BmiError::InvalidState { .. })
    ));
}

#[test]
fn test_unload_from_any_state() {
    let mut model = TestModel::initialized();
    model.session.finalize().unwrap();
    model.session.unload().unwrap();
    assert_eq!(model.session.state(), SessionState::Unloaded);
    model.session.unload().unwrap();
    assert!(matches!(
        model.session.describe("var1"),
        Err(BmiError::InvalidState { state: SessionState::Unloaded, .. })
    ));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_file_overrides_times() {
    let mut model = TestModel::loaded();
    let config = model.write_config("short.ini", "start_time = 2\nend_time = 5\ntime_step = 0.25\n");
    model.session.initialize(&config).unwrap();

    assert_eq!(model.session.start_time().unwrap(), 2.0);
    assert_eq!(model.session.end_time().unwrap(), 5.0);
    model.session.update_default().unwrap();
    assert_eq!(model.session.current_time().unwrap(), 2.25);
}

#[test]
fn test_failed_initialize_stays_loaded() {
    let mut model = TestModel::loaded();
    let missing = model.dir.path().join("missing.ini");

    match model.session.initialize(&missing) {
        Err(BmiError::NativeStatus { operation, status }) => {
            assert_eq!(operation, "initialize");
            assert_eq!(status, bmi_demo::status::CONFIG_UNREADABLE);
        }
        other => panic!("Wrong result: {:?}", other),
    }
    assert_eq!(model.session.state(), SessionState::Loaded);

    let bad = model.write_config("bad.ini", "speed = 3\n");
    assert!(matches!(
        model.session.initialize(&bad),
        Err(BmiError::NativeStatus { status: 3, .. })
    ));

    model.session.initialize("").unwrap();
    assert_eq!(model.session.state(), SessionState::Initialized);
}

#[test]
fn test_config_path_too_long() {
    let mut model = TestModel::loaded();
    let path = "c".repeat(bmi_core::MAXSTRLEN + 1);
    assert!(matches!(
        model.session.initialize(path),
        Err(BmiError::StringTooLong { .. })
    ));
    assert_eq!(model.session.state(), SessionState::Loaded);
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_drop_finalizes_initialized_session() {
    let model = TestModel::loaded();
    let mut other =
        ModelSession::from_symbols(StaticSymbols::new("drop-test", bmi_demo::entry_points()))
            .unwrap();
    other.initialize("").unwrap();
    drop(other);

    // The model was finalized by the drop, so it no longer accepts updates
    assert_eq!(bmi_demo::update(1.0), bmi_demo::status::NOT_INITIALIZED);
    drop(model);
}

#[test]
fn test_unload_does_not_finalize() {
    let mut model = TestModel::initialized();
    model.session.unload().unwrap();

    // Still initialized on the native side
    assert_eq!(bmi_demo::finalize(), bmi_demo::status::OK);
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_second_session_on_same_library_is_counted() {
    let model = TestModel::loaded();
    assert_eq!(registry::live_sessions(DEMO_ORIGIN), 1);

    let second = ModelSession::from_symbols(demo_symbols()).unwrap();
    assert_eq!(registry::live_sessions(DEMO_ORIGIN), 2);
    drop(second);
    assert_eq!(registry::live_sessions(DEMO_ORIGIN), 1);
    drop(model);
}
