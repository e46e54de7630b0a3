use std::time::Duration;

use harvest_core::ProgressSnapshot;

#[test]
fn eta_unknown_until_first_record() {
    let snapshot = ProgressSnapshot::compute(0, 10, 25, Duration::from_secs(5));
    assert_eq!(snapshot.eta, None);
    assert_eq!(snapshot.percent(), 0.0);
    assert_eq!(snapshot.speed(), 0.0);
}

#[test]
fn eta_extrapolates_current_rate() {
    let snapshot = ProgressSnapshot::compute(2, 10, 9, Duration::from_secs(4));
    assert_eq!(snapshot.eta, Some(Duration::from_secs(16)));
    assert_eq!(snapshot.percent(), 20.0);
    assert_eq!(snapshot.speed(), 0.5);
}

#[test]
fn reaching_target_caps_percent_and_zeroes_eta() {
    let snapshot = ProgressSnapshot::compute(12, 10, 30, Duration::from_secs(3));
    assert_eq!(snapshot.eta, Some(Duration::ZERO));
    assert_eq!(snapshot.percent(), 100.0);
}
