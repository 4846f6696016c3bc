//! Events, event payloads and futures for waiting on events.
//!
//! An [`Event`] is a scheduled occurrence at a virtual time. Processes wait
//! on events via [`EventFuture`]; when the scheduler processes the event,
//! every waiter resumes with a clone of the event's [`Outcome`]. Payloads are
//! arbitrary user types implementing [`EventData`], which allows them to be
//! downcast by the receiver, cloned to several waiters and serialized into
//! log records.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use downcast_rs::{impl_downcast, Downcast};
use dyn_clone::DynClone;

use crate::error::SimulationError;
use crate::log::{payload_json, payload_type};
use crate::process::ProcessId;
use crate::state::SimulationState;

/// Identifier of an event, assigned in creation order.
pub type EventId = u64;

/// Trait for event payloads and interrupt causes.
///
/// Implemented automatically for any `'static` type that is `Clone` and
/// `Serialize`.
pub trait EventData: Downcast + erased_serde::Serialize + DynClone {}

impl_downcast!(EventData);
dyn_clone::clone_trait_object!(EventData);

impl<T: erased_serde::Serialize + DynClone + 'static> EventData for T {}

impl serde::Serialize for dyn EventData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        erased_serde::serialize(self, serializer)
    }
}

/// Boxed event payload.
pub type EventValue = Box<dyn EventData>;

/// The exceptional result delivered to a waiting process.
#[derive(Clone)]
pub enum Failure {
    /// The process was interrupted while suspended; carries the cause value
    /// supplied by the interrupting party.
    Interrupted(Option<EventValue>),
    /// An error raised inside a process body.
    Error(String),
}

impl Failure {
    /// Creates a process failure with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Failure::Error(message.into())
    }

    /// Returns the interrupt cause downcast to `T`, if this failure is an
    /// interrupt carrying a cause of that type.
    pub fn cause<T: EventData>(&self) -> Option<&T> {
        match self {
            Failure::Interrupted(Some(value)) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Whether this failure is an interrupt.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Failure::Interrupted(_))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Interrupted(None) => write!(f, "interrupted"),
            Failure::Interrupted(Some(cause)) => {
                write!(
                    f,
                    "interrupted by {}: {}",
                    payload_type(cause),
                    payload_json(cause)
                )
            }
            Failure::Error(message) => write!(f, "{}", message),
        }
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// thiserror-style conversion so that `?` on engine calls works inside
// process bodies returning `Result<_, Failure>`.
impl From<SimulationError> for Failure {
    fn from(err: SimulationError) -> Self {
        Failure::Error(err.to_string())
    }
}

impl std::error::Error for Failure {}

/// The result an event delivers to its waiters.
pub type Outcome = Result<Option<EventValue>, Failure>;

/// Lifecycle of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventStatus {
    /// Created, possibly sitting in the heap, not yet reached by the clock.
    Pending,
    /// Popped from the heap; its outcome is fixed and waiters are resuming.
    Triggered,
    /// Fully processed; immutable from here on.
    Processed,
    /// Withdrawn before triggering; waiters never resume via this event.
    Cancelled,
}

/// Priority class for events scheduled at the same time; lower is served
/// first, ties are broken by insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// Served before normal events at the same timestamp (used by
    /// interrupts).
    Urgent,
    /// The default class.
    Normal,
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

pub(crate) struct EventState {
    pub(crate) id: EventId,
    pub(crate) status: EventStatus,
    /// Fixed when the event is scheduled with a value (`succeed`/`fail`,
    /// timeouts) or defaulted to `Ok(None)` at trigger time.
    pub(crate) outcome: Option<Outcome>,
    /// Processes to resume when the event triggers, in registration order.
    pub(crate) waiters: Vec<ProcessId>,
    /// Whether the event already sits in the heap; an event is scheduled at
    /// most once.
    pub(crate) scheduled: bool,
}

impl EventState {
    pub(crate) fn new(id: EventId) -> Self {
        Self {
            id,
            status: EventStatus::Pending,
            outcome: None,
            waiters: Vec::new(),
            scheduled: false,
        }
    }
}

/// Cloneable handle to an event.
///
/// Manual events are created via
/// [`SimulationContext::create_event`](crate::SimulationContext::create_event)
/// and completed from any process with [`succeed`](Event::succeed),
/// [`trigger`](Event::trigger) or [`fail`](Event::fail). Waiting is done via
/// [`wait`](Event::wait).
#[derive(Clone)]
pub struct Event {
    pub(crate) state: Rc<RefCell<EventState>>,
    pub(crate) sim: Weak<RefCell<SimulationState>>,
}

impl Event {
    pub(crate) fn new(state: Rc<RefCell<EventState>>, sim: Weak<RefCell<SimulationState>>) -> Self {
        Self { state, sim }
    }

    /// Identifier of this event.
    pub fn id(&self) -> EventId {
        self.state.borrow().id
    }

    /// Current status of this event.
    pub fn status(&self) -> EventStatus {
        self.state.borrow().status
    }

    /// Whether the event has been triggered or processed.
    pub fn is_triggered(&self) -> bool {
        matches!(
            self.status(),
            EventStatus::Triggered | EventStatus::Processed
        )
    }

    /// The outcome delivered to waiters, available once the event triggers.
    pub fn outcome(&self) -> Option<Outcome> {
        let state = self.state.borrow();
        match state.status {
            EventStatus::Triggered | EventStatus::Processed => state.outcome.clone(),
            _ => None,
        }
    }

    /// Completes the event successfully with a payload, scheduling it for
    /// processing at the current time.
    pub fn succeed<T: EventData>(&self, value: T) -> Result<(), SimulationError> {
        self.complete(Ok(Some(Box::new(value))))
    }

    /// Completes the event successfully without a payload.
    pub fn trigger(&self) -> Result<(), SimulationError> {
        self.complete(Ok(None))
    }

    /// Completes the event with a failure, scheduling it for processing at
    /// the current time.
    pub fn fail(&self, failure: Failure) -> Result<(), SimulationError> {
        self.complete(Err(failure))
    }

    /// Withdraws a pending event. Returns `false` if the event has already
    /// triggered or was cancelled before.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.status == EventStatus::Pending {
            state.status = EventStatus::Cancelled;
            true
        } else {
            false
        }
    }

    /// Returns a future resolving with this event's outcome. Must be awaited
    /// inside a process.
    pub fn wait(&self) -> EventFuture {
        EventFuture::new(self.state.clone(), self.sim.clone())
    }

    fn complete(&self, outcome: Outcome) -> Result<(), SimulationError> {
        let sim = self.sim.upgrade().expect("simulation no longer exists");
        let mut sim = sim.borrow_mut();
        let mut state = self.state.borrow_mut();
        if state.status != EventStatus::Pending || state.scheduled {
            return Err(SimulationError::EventAlreadyTriggered(state.id));
        }
        state.outcome = Some(outcome);
        state.scheduled = true;
        let now = sim.time();
        sim.push_entry(self.state.clone(), now, EventPriority::Normal);
        Ok(())
    }
}

/// Future resolving with the [`Outcome`] of an event.
///
/// Created via [`Event::wait`], [`SimulationContext::timeout`] or
/// [`Process::wait`]. Polling outside a process panics: suspension is only
/// meaningful for process bodies driven by the scheduler.
///
/// [`SimulationContext::timeout`]: crate::SimulationContext::timeout
/// [`Process::wait`]: crate::Process::wait
pub struct EventFuture {
    state: Rc<RefCell<EventState>>,
    sim: Weak<RefCell<SimulationState>>,
    registered: bool,
}

impl EventFuture {
    pub(crate) fn new(state: Rc<RefCell<EventState>>, sim: Weak<RefCell<SimulationState>>) -> Self {
        Self {
            state,
            sim,
            registered: false,
        }
    }
}

impl Future for EventFuture {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Outcome> {
        let this = self.get_mut();
        let sim = this.sim.upgrade().expect("simulation no longer exists");
        let mut sim = sim.borrow_mut();
        let current = sim
            .current
            .expect("event futures can only be awaited inside processes");
        // Pending interrupts preempt whatever is being awaited.
        if let Some(failure) = sim
            .processes
            .get_mut(&current)
            .and_then(|p| p.interrupts.pop_front())
        {
            return Poll::Ready(Err(failure));
        }
        let mut state = this.state.borrow_mut();
        match state.status {
            EventStatus::Triggered | EventStatus::Processed => Poll::Ready(
                state
                    .outcome
                    .clone()
                    .expect("triggered event must have an outcome"),
            ),
            EventStatus::Pending => {
                if !this.registered {
                    state.waiters.push(current);
                    if let Some(entry) = sim.processes.get_mut(&current) {
                        entry.waiting_on = Some(Rc::downgrade(&this.state));
                    }
                    this.registered = true;
                }
                Poll::Pending
            }
            EventStatus::Cancelled => Poll::Pending,
        }
    }
}

/// Waits for all events to trigger, failing fast on the first failure.
///
/// Resolves with the payloads of all events in their original order.
pub async fn wait_all_of(events: &[Event]) -> Result<Vec<Option<EventValue>>, Failure> {
    futures::future::try_join_all(events.iter().map(|e| e.wait())).await
}

/// Waits for the first of the given events to trigger.
///
/// Resolves with the index of the winning event and its outcome. Panics if
/// `events` is empty.
pub async fn wait_any_of(events: &[Event]) -> (usize, Outcome) {
    assert!(!events.is_empty(), "wait_any_of requires at least one event");
    let (outcome, index, _rest) =
        futures::future::select_all(events.iter().map(|e| e.wait())).await;
    (index, outcome)
}
