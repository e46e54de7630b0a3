use std::sync::Once;
use std::time::Duration;

use harvest_core::{AttemptOutcome, CeilingPolicy, RunBudget, StopReason};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

#[test]
fn budget_exhausts_before_target_when_nothing_yields() {
    init_logging();
    let mut budget = RunBudget::new(3, 2);

    assert_eq!(budget.begin_attempt(), Ok(1));
    budget.record(AttemptOutcome::Failed);
    assert_eq!(budget.begin_attempt(), Ok(2));
    budget.record(AttemptOutcome::Miss);
    assert_eq!(budget.begin_attempt(), Err(StopReason::BudgetExhausted));

    let summary = budget.summary(Duration::from_secs(1));
    assert_eq!(summary.attempts, 2);
    assert_eq!(summary.collected, 0);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.misses, 1);
    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert!(!summary.target_met());
    assert_eq!(summary.shortfall(), 3);
}

#[test]
fn reaching_target_latches_stop() {
    init_logging();
    let mut budget = RunBudget::new(2, 100);

    budget.begin_attempt().unwrap();
    assert_eq!(budget.record(AttemptOutcome::Accepted), Some(1));
    assert!(!budget.is_stopped());
    budget.begin_attempt().unwrap();
    assert_eq!(budget.record(AttemptOutcome::Accepted), Some(2));

    assert_eq!(budget.stop_reason(), Some(StopReason::TargetReached));
    assert_eq!(budget.begin_attempt(), Err(StopReason::TargetReached));
    assert_eq!(budget.attempts(), 2);
}

#[test]
fn in_flight_results_still_count_after_stop() {
    init_logging();
    let mut budget = RunBudget::new(1, 10);
    budget.begin_attempt().unwrap();
    budget.begin_attempt().unwrap();

    assert_eq!(budget.record(AttemptOutcome::Accepted), Some(1));
    assert_eq!(budget.record(AttemptOutcome::Accepted), Some(2));
    assert_eq!(budget.collected(), 2);
    assert_eq!(budget.summary(Duration::ZERO).stop_reason, StopReason::TargetReached);
}

#[test]
fn duplicates_consume_budget_without_yield() {
    init_logging();
    let mut budget = RunBudget::new(1, 2);
    budget.begin_attempt().unwrap();
    assert_eq!(budget.record(AttemptOutcome::Duplicate), None);
    budget.begin_attempt().unwrap();
    assert_eq!(budget.record(AttemptOutcome::Duplicate), None);

    let summary = budget.summary(Duration::ZERO);
    assert_eq!(summary.duplicates, 2);
    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
}

#[test]
fn cancel_does_not_override_latched_reason() {
    init_logging();
    let mut budget = RunBudget::new(1, 1);
    budget.begin_attempt().unwrap();
    assert_eq!(budget.begin_attempt(), Err(StopReason::BudgetExhausted));
    budget.cancel();
    assert_eq!(budget.stop_reason(), Some(StopReason::BudgetExhausted));

    let mut fresh = RunBudget::new(5, 5);
    fresh.cancel();
    assert_eq!(fresh.begin_attempt(), Err(StopReason::Cancelled));
    assert_eq!(fresh.attempts(), 0);
}

#[test]
fn default_ceiling_scales_with_target_and_workers() {
    init_logging();
    let policy = CeilingPolicy::default();
    assert_eq!(policy.ceiling_for(3, 6), 3 * 6 * 6);

    let doubled = CeilingPolicy {
        concurrency_multiplier: 2,
        ..CeilingPolicy::default()
    };
    assert_eq!(doubled.ceiling_for(1, 1), 12);
    assert_eq!(policy.ceiling_for(0, 4), 1);
}

#[test]
fn explicit_ceiling_overrides_policy() {
    init_logging();
    let policy = CeilingPolicy::default();
    assert_eq!(policy.resolve(Some(2), 3, 6), 2);
    assert_eq!(policy.resolve(Some(0), 3, 6), 108);
    assert_eq!(policy.resolve(None, 1, 1), 6);
}
