use harvest_core::{advance, WorkerEvent, WorkerPhase};

#[test]
fn successful_attempt_cycles_back_to_idle() {
    let mut phase = WorkerPhase::default();
    for event in [
        WorkerEvent::Dispatched,
        WorkerEvent::ResponseReceived,
        WorkerEvent::Parsed,
    ] {
        phase = advance(phase, event);
    }
    assert_eq!(phase, WorkerPhase::Recording);
    assert_eq!(advance(phase, WorkerEvent::Recorded), WorkerPhase::Idle);
}

#[test]
fn transport_failure_returns_to_idle() {
    let phase = advance(WorkerPhase::Idle, WorkerEvent::Dispatched);
    assert_eq!(advance(phase, WorkerEvent::TransportFailed), WorkerPhase::Idle);
}

#[test]
fn stop_is_deferred_while_in_flight() {
    assert_eq!(
        advance(WorkerPhase::Requesting, WorkerEvent::StopObserved),
        WorkerPhase::Requesting
    );
    assert_eq!(
        advance(WorkerPhase::Recording, WorkerEvent::StopObserved),
        WorkerPhase::Recording
    );
    assert_eq!(
        advance(WorkerPhase::Idle, WorkerEvent::StopObserved),
        WorkerPhase::Stopped
    );
}

#[test]
fn stopped_is_terminal() {
    assert_eq!(
        advance(WorkerPhase::Stopped, WorkerEvent::Dispatched),
        WorkerPhase::Stopped
    );
}

#[test]
fn every_attempt_ends_idle_so_a_stop_can_end_the_worker() {
    let paths: [&[WorkerEvent]; 2] = [
        &[
            WorkerEvent::Dispatched,
            WorkerEvent::ResponseReceived,
            WorkerEvent::Parsed,
            WorkerEvent::Recorded,
        ],
        &[WorkerEvent::Dispatched, WorkerEvent::TransportFailed],
    ];
    for events in paths {
        let phase = events.iter().fold(WorkerPhase::Idle, |phase, event| advance(phase, *event));
        assert_eq!(phase, WorkerPhase::Idle, "{events:?}");
        assert_eq!(advance(phase, WorkerEvent::StopObserved), WorkerPhase::Stopped);
    }
}
