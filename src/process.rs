//! Processes: sequential units of simulated behavior.
//!
//! A process is an `async` body driven by the crate's cooperative executor.
//! It suspends at explicit wait points (timeouts, event waits, resource
//! acquisition) and resumes when the scheduler processes the awaited event.
//! Exactly one process body executes at any virtual instant; all concurrency
//! is purely conceptual.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::SimulationError;
use crate::event::{
    Event, EventData, EventFuture, EventPriority, EventState, EventValue, Failure, Outcome,
};
use crate::resource::ResourceCore;
use crate::state::SimulationState;

/// Identifier of a process, assigned in spawn order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub(crate) u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Spawned but not yet polled.
    Created,
    /// Its body is currently executing.
    Running,
    /// Suspended at a wait point.
    Suspended,
    /// The body completed normally.
    Terminated,
    /// The body returned a failure.
    Failed,
}

/// A resource unit held by a process, tracked for cleanup on termination.
pub(crate) struct HeldGrant {
    pub resource: Weak<RefCell<ResourceCore>>,
    pub grant: u64,
}

pub(crate) struct ProcessEntry {
    pub name: Rc<str>,
    pub status: ProcessStatus,
    /// Triggered with the body's return value (or failure) on termination.
    pub completion: Rc<RefCell<EventState>>,
    /// The event the process is currently suspended on, detached by interrupts.
    pub waiting_on: Option<Weak<RefCell<EventState>>>,
    /// Interrupt causes queued for delivery at the next wait point.
    pub interrupts: VecDeque<Failure>,
    pub held: Vec<HeldGrant>,
}

/// Conversion of a process body's return value into the outcome delivered to
/// waiters of its completion event.
pub trait ProcessReturn: 'static {
    /// Converts the return value into an event outcome.
    fn into_outcome(self) -> Outcome;
}

impl ProcessReturn for () {
    fn into_outcome(self) -> Outcome {
        Ok(None)
    }
}

impl<T: EventData> ProcessReturn for Result<T, Failure> {
    fn into_outcome(self) -> Outcome {
        self.map(|value| Some(Box::new(value) as EventValue))
    }
}

/// Cloneable handle to a spawned process.
#[derive(Clone)]
pub struct Process {
    pub(crate) id: ProcessId,
    pub(crate) completion: Rc<RefCell<EventState>>,
    pub(crate) sim: Weak<RefCell<SimulationState>>,
}

impl Process {
    /// Identifier of this process.
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ProcessStatus {
        let sim = self.sim.upgrade().expect("simulation no longer exists");
        let sim = sim.borrow();
        if let Some(entry) = sim.processes.get(&self.id) {
            return entry.status;
        }
        // Finished processes are pruned from the registry; the completion
        // event records how they ended.
        match self.completion.borrow().outcome {
            Some(Err(_)) => ProcessStatus::Failed,
            _ => ProcessStatus::Terminated,
        }
    }

    /// The event triggered when this process terminates or fails.
    pub fn completion_event(&self) -> Event {
        Event::new(self.completion.clone(), self.sim.clone())
    }

    /// Waits for this process to finish, resolving with its return value or
    /// failure.
    pub fn wait(&self) -> EventFuture {
        EventFuture::new(self.completion.clone(), self.sim.clone())
    }

    /// Interrupts this process with a cause value.
    ///
    /// The target's current wait is detached (the awaited event, if any,
    /// still triggers for its other waiters) and the target resumes
    /// immediately with [`Failure::Interrupted`] carrying the cause. The
    /// engine does not re-establish the original wait; the interrupted
    /// process decides how to proceed.
    pub fn interrupt<T: EventData>(&self, cause: T) -> Result<(), SimulationError> {
        self.interrupt_with(Some(Box::new(cause)))
    }

    /// Interrupts this process with an optional boxed cause.
    ///
    /// Fails with [`SimulationError::ProcessTerminated`] if the target
    /// already finished and [`SimulationError::ProcessNotSuspended`] if it is
    /// not currently suspended at a wait point.
    pub fn interrupt_with(&self, cause: Option<EventValue>) -> Result<(), SimulationError> {
        let sim = self.sim.upgrade().expect("simulation no longer exists");
        let mut sim = sim.borrow_mut();
        // The registry only holds live processes; finished ones are pruned.
        let status = match sim.processes.get(&self.id) {
            Some(entry) => entry.status,
            None => return Err(SimulationError::ProcessTerminated(self.id)),
        };
        if status != ProcessStatus::Suspended {
            return Err(SimulationError::ProcessNotSuspended(self.id));
        }
        let detached = {
            let entry = sim
                .processes
                .get_mut(&self.id)
                .expect("unknown process");
            entry.interrupts.push_back(Failure::Interrupted(cause));
            entry.waiting_on.take()
        };
        if let Some(weak) = detached {
            if let Some(event) = weak.upgrade() {
                let id = self.id;
                event.borrow_mut().waiters.retain(|w| *w != id);
            }
        }
        // An urgent zero-delay event resumes the target before any normal
        // event at the current timestamp.
        let wake = sim.create_event_state();
        {
            let mut state = wake.borrow_mut();
            state.outcome = Some(Ok(None));
            state.scheduled = true;
            state.waiters.push(self.id);
        }
        let now = sim.time();
        sim.push_entry(wake, now, EventPriority::Urgent);
        Ok(())
    }
}
