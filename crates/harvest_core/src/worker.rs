/// Lifecycle of a single harvest worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerPhase {
    #[default]
    Idle,
    Requesting,
    Parsing,
    Recording,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// An attempt was reserved and the request sent.
    Dispatched,
    /// The remote answered.
    ResponseReceived,
    /// The exchange failed; nothing to record.
    TransportFailed,
    /// The response was reduced to a code (or to "no code").
    Parsed,
    /// Bookkeeping for the attempt is done.
    Recorded,
    /// The run-wide stop condition fired.
    StopObserved,
}

/// Pure transition function for [`WorkerPhase`].
///
/// The stop condition only takes effect from `Idle`: an in-flight attempt is
/// always carried through to its bookkeeping. Events that do not apply to
/// the current phase leave it unchanged.
pub fn advance(phase: WorkerPhase, event: WorkerEvent) -> WorkerPhase {
    use WorkerEvent as E;
    use WorkerPhase as P;

    match (phase, event) {
        (P::Stopped, _) => P::Stopped,
        (P::Idle, E::StopObserved) => P::Stopped,
        (P::Idle, E::Dispatched) => P::Requesting,
        (P::Requesting, E::ResponseReceived) => P::Parsing,
        (P::Requesting, E::TransportFailed) => P::Idle,
        (P::Parsing, E::Parsed) => P::Recording,
        (P::Recording, E::Recorded) => P::Idle,
        (current, _) => current,
    }
}
