//! Error types returned by the simulation API.

use thiserror::Error;

use crate::event::EventId;
use crate::process::ProcessId;

/// Errors reported by the scheduler, resources and the interrupt mechanism.
///
/// These cover misuse of the engine API and are returned to the caller that
/// triggered them. Errors raised inside process bodies travel separately as
/// [`Failure`](crate::Failure) payloads attached to events and never abort
/// the driving loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// An event was scheduled with a negative (or NaN) delay.
    #[error("invalid delay {0}: delays must be non-negative")]
    InvalidDelay(f64),
    /// The driving loop was invoked with an empty event heap.
    #[error("no more events in the simulation")]
    NoMoreEvents,
    /// The target of an interrupt is not currently suspended.
    #[error("process {0} is not suspended")]
    ProcessNotSuspended(ProcessId),
    /// The target of an interrupt has already terminated or failed.
    #[error("process {0} has already terminated")]
    ProcessTerminated(ProcessId),
    /// A resource unit was released that is not currently held.
    #[error("released a resource unit that is not currently held")]
    ResourceOverrelease,
    /// An event was triggered or scheduled more than once.
    #[error("event {0} has already been triggered")]
    EventAlreadyTriggered(EventId),
}
