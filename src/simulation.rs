//! The simulation facade and its driving loop.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use crate::container::Container;
use crate::context::SimulationContext;
use crate::error::SimulationError;
use crate::event::{Event, EventStatus};
use crate::executor;
use crate::log::log_unconsumed_failure;
use crate::process::{Process, ProcessReturn};
use crate::resource::Resource;
use crate::state::{SimulationState, EPSILON};

/// A single simulation run: owns the virtual clock, the event heap, the
/// process registry and the seeded random number generator.
///
/// The driving loop repeatedly pops the earliest `(time, priority, sequence)`
/// entry, advances the clock to its time, resumes every process waiting on
/// the popped event and runs them to quiescence before the next pop. Events
/// at identical times are processed in strict creation order (after the
/// optional priority class), so runs are fully deterministic for a given
/// seed.
pub struct Simulation {
    sim: Rc<RefCell<SimulationState>>,
}

impl Simulation {
    /// Creates a simulation starting at time 0 with the given random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim: Rc::new(RefCell::new(SimulationState::new(seed))),
        }
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.sim.borrow().time()
    }

    /// Number of processed events.
    pub fn event_count(&self) -> u64 {
        self.sim.borrow().processed_count()
    }

    /// Number of live (not yet finished) processes.
    pub fn process_count(&self) -> usize {
        self.sim.borrow().processes.len()
    }

    /// Whether any live (non-cancelled) events remain in the heap.
    pub fn has_pending_events(&self) -> bool {
        self.sim.borrow().has_live_entries()
    }

    /// Creates a named context for spawning processes and emitting events.
    pub fn create_context<S: AsRef<str>>(&mut self, name: S) -> SimulationContext {
        SimulationContext::new(Rc::downgrade(&self.sim), name.as_ref())
    }

    /// Spawns a named process; shorthand for creating a context and spawning
    /// through it.
    pub fn spawn<F, R>(&mut self, name: &str, body: F) -> Process
    where
        F: Future<Output = R> + 'static,
        R: ProcessReturn,
    {
        self.create_context(name).spawn(body)
    }

    /// Creates a resource with the given fixed capacity.
    pub fn create_resource(&mut self, name: &str, capacity: usize) -> Resource {
        Resource::new(name, capacity, Rc::downgrade(&self.sim))
    }

    /// Creates a level-based container with the given capacity and initial
    /// level.
    pub fn create_container(&mut self, name: &str, capacity: f64, init: f64) -> Container {
        Container::new(name, capacity, init, Rc::downgrade(&self.sim))
    }

    /// Processes the next event. Returns `false` if the heap is drained.
    pub fn step(&mut self) -> bool {
        // Pick up processes spawned since the last step.
        executor::drain(&self.sim);
        let entry = { self.sim.borrow_mut().pop_next() };
        let Some(entry) = entry else {
            return false;
        };
        {
            let mut sim = self.sim.borrow_mut();
            sim.advance(entry.time);
            let waiters = {
                let mut state = entry.event.borrow_mut();
                state.status = EventStatus::Triggered;
                if state.outcome.is_none() {
                    state.outcome = Some(Ok(None));
                }
                std::mem::take(&mut state.waiters)
            };
            if waiters.is_empty() {
                let state = entry.event.borrow();
                if let Some(Err(failure)) = state.outcome.as_ref() {
                    log_unconsumed_failure(sim.time(), state.id, failure);
                }
            }
            for waiter in &waiters {
                if let Some(process) = sim.processes.get_mut(waiter) {
                    process.waiting_on = None;
                }
            }
            sim.ready.extend(waiters);
        }
        executor::drain(&self.sim);
        entry.event.borrow_mut().status = EventStatus::Processed;
        true
    }

    /// Runs until no events remain.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Processes every event with time at most `time` and advances the clock
    /// to `time`. Later events stay pending, so the run can be resumed.
    pub fn step_until_time(&mut self, time: f64) {
        loop {
            let next = { self.sim.borrow_mut().peek_time() };
            match next {
                Some(t) if t <= time + EPSILON => {
                    self.step();
                }
                _ => break,
            }
        }
        self.sim.borrow_mut().advance_to_bound(time);
    }

    /// Processes events until the given event has been processed (or
    /// cancelled) or the heap drains.
    pub fn step_until_event(&mut self, event: &Event) {
        while !matches!(
            event.status(),
            EventStatus::Processed | EventStatus::Cancelled
        ) && self.step()
        {}
    }

    /// Runs until no events remain, returning the final time. Fails with
    /// [`SimulationError::NoMoreEvents`] when invoked with nothing to do.
    pub fn run(&mut self) -> Result<f64, SimulationError> {
        if !self.has_pending_events() && self.sim.borrow().ready.is_empty() {
            return Err(SimulationError::NoMoreEvents);
        }
        self.step_until_no_events();
        Ok(self.time())
    }
}
