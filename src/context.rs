//! Access point to the simulation state for client code.
//!
//! A [`SimulationContext`] is a named, cloneable handle through which
//! processes read the clock, draw random numbers, create timers and events,
//! and spawn further processes. Global simulation state is never implicit:
//! every component receives its context explicitly, so several independent
//! simulations can coexist in one OS process.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use rand::distributions::uniform::{SampleRange, SampleUniform};

use crate::error::SimulationError;
use crate::event::{Event, EventFuture, EventPriority};
use crate::executor;
use crate::process::{Process, ProcessEntry, ProcessReturn, ProcessStatus};
use crate::state::SimulationState;

/// Named handle to the simulation, held by processes and client components.
#[derive(Clone)]
pub struct SimulationContext {
    sim: Weak<RefCell<SimulationState>>,
    name: Rc<str>,
}

impl SimulationContext {
    pub(crate) fn new(sim: Weak<RefCell<SimulationState>>, name: &str) -> Self {
        Self {
            sim,
            name: name.into(),
        }
    }

    /// Name of this context, used in log records and as the name of spawned
    /// processes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derives a context with a different name sharing the same simulation.
    pub fn create_context<S: AsRef<str>>(&self, name: S) -> SimulationContext {
        SimulationContext::new(self.sim.clone(), name.as_ref())
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.upgrade().borrow().time()
    }

    /// Returns a future triggering exactly at `current time + delay`.
    ///
    /// Panics on a negative delay: that is a programming error, reported
    /// immediately rather than silently clamped. Use
    /// [`try_timeout`](Self::try_timeout) for delays that need validation.
    pub fn timeout(&self, delay: f64) -> EventFuture {
        self.try_timeout(delay)
            .unwrap_or_else(|err| panic!("timeout: {}", err))
    }

    /// Fallible form of [`timeout`](Self::timeout); fails with
    /// [`SimulationError::InvalidDelay`] on a negative or NaN delay.
    pub fn try_timeout(&self, delay: f64) -> Result<EventFuture, SimulationError> {
        let sim_rc = self.upgrade();
        let mut sim = sim_rc.borrow_mut();
        if !(delay >= 0.0) {
            return Err(SimulationError::InvalidDelay(delay));
        }
        let event = sim.create_event_state();
        {
            let mut state = event.borrow_mut();
            state.outcome = Some(Ok(None));
            state.scheduled = true;
        }
        let time = sim.time() + delay;
        sim.push_entry(event.clone(), time, EventPriority::Normal);
        Ok(EventFuture::new(event, self.sim.clone()))
    }

    /// Creates a manual event in pending state. Complete it with
    /// [`Event::succeed`], [`Event::trigger`] or [`Event::fail`], or place it
    /// in the heap with [`schedule`](Self::schedule).
    pub fn create_event(&self) -> Event {
        let sim_rc = self.upgrade();
        let state = sim_rc.borrow_mut().create_event_state();
        Event::new(state, self.sim.clone())
    }

    /// Schedules a pending event at `current time + delay` with the given
    /// priority class. Its outcome defaults to an empty success at trigger
    /// time.
    pub fn schedule(
        &self,
        event: &Event,
        delay: f64,
        priority: EventPriority,
    ) -> Result<(), SimulationError> {
        let sim_rc = self.upgrade();
        let mut sim = sim_rc.borrow_mut();
        sim.schedule(&event.state, delay, priority)
    }

    /// Spawns a process running `body`, named after this context.
    ///
    /// The process starts immediately and runs until its first suspension
    /// point. The body may return `()` or `Result<T, Failure>`; the return
    /// value is delivered through the process's completion event.
    pub fn spawn<F, R>(&self, body: F) -> Process
    where
        F: Future<Output = R> + 'static,
        R: ProcessReturn,
    {
        let sim_rc = self.upgrade();
        let (id, completion) = {
            let mut sim = sim_rc.borrow_mut();
            let id = sim.next_process_id();
            let completion = sim.create_event_state();
            sim.processes.insert(
                id,
                ProcessEntry {
                    name: self.name.clone(),
                    status: ProcessStatus::Created,
                    completion: completion.clone(),
                    waiting_on: None,
                    interrupts: Default::default(),
                    held: Vec::new(),
                },
            );
            sim.tasks
                .insert(id, Box::pin(async move { body.await.into_outcome() }));
            sim.ready.push_back(id);
            log::trace!("[{:.3}] process '{}' {} spawned", sim.time(), self.name, id);
            (id, completion)
        };
        // Run the new process up to its first suspension point. When spawned
        // from inside another process the active drain picks it up instead.
        executor::drain(&sim_rc);
        Process {
            id,
            completion,
            sim: self.sim.clone(),
        }
    }

    /// Uniformly distributed random float in `[0, 1)` from the
    /// simulation-wide generator.
    pub fn rand(&self) -> f64 {
        self.upgrade().borrow_mut().rand()
    }

    /// Random value uniformly distributed in `range` from the
    /// simulation-wide generator.
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.upgrade().borrow_mut().gen_range(range)
    }

    fn upgrade(&self) -> Rc<RefCell<SimulationState>> {
        self.sim.upgrade().expect("simulation no longer exists")
    }
}
