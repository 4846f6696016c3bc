//! SimProc is a process-oriented discrete event simulation framework. It provides a cooperative
//! scheduler that advances a virtual clock, processes that suspend on timers, events and shared
//! resources, and deterministic resolution of contention, which together form the foundation for
//! building queueing and logistics models.
//!
//! ## Basic Concepts
//!
//! **Process.** A process is a sequential unit of simulated behavior written as an `async` body.
//! It suspends at explicit wait points - awaiting a timer, an event or a resource unit - and
//! resumes exactly where it suspended, receiving the outcome of the awaited event. Exactly one
//! process body executes at any virtual instant: concurrency is purely conceptual, so no locking
//! is ever needed inside a model. Processes are spawned through a named [`SimulationContext`] and
//! start running immediately, up to their first suspension point.
//!
//! **Event.** An event occurs at a specific virtual time and carries an outcome: an optional
//! user-defined payload on success, or a [`Failure`] value. Timer events are created with
//! [`SimulationContext::timeout`]; manual events with [`SimulationContext::create_event`] and
//! completed from any process via [`Event::succeed`] or [`Event::fail`]. Every process finishing
//! triggers its completion event, so waiting for another process is just waiting for an event.
//! Composite waits - first-of and all-of - are built from the same futures with [`wait_any_of`]
//! and [`wait_all_of`].
//!
//! **Resource.** A [`Resource`] holds a fixed number of interchangeable units. Acquiring suspends
//! the caller while all units are taken; releasing hands the freed unit to the best queued
//! request (by priority, then arrival order) within the same virtual instant. A [`Container`]
//! models a continuous quantity with blocking `get`/`put` instead of discrete units.
//!
//! **Simulation.** The [`Simulation`] owns the clock, the event heap and the seeded random number
//! generator. Its driving loop pops the event with the smallest `(time, priority, sequence)` key,
//! advances the clock, resumes the waiting processes and runs them to quiescence before the next
//! pop. Ties in time are broken by creation order, which makes every run fully reproducible for a
//! given seed.
//!
//! ## Example
//!
//! Two customers compete for a single server; the second one queues behind the first:
//!
//! ```rust
//! use simproc::{Failure, Simulation};
//!
//! let mut sim = Simulation::new(123);
//! let server = sim.create_resource("server", 1);
//!
//! for i in 0..2 {
//!     let ctx = sim.create_context(format!("customer{}", i));
//!     let server = server.clone();
//!     let pctx = ctx.clone();
//!     ctx.spawn(async move {
//!         let grant = server.acquire().await?;
//!         pctx.timeout(3.0).await?;
//!         server.release(&grant)?;
//!         Ok::<(), Failure>(())
//!     });
//! }
//!
//! sim.step_until_no_events();
//! assert_eq!(sim.time(), 6.0);
//! ```
//!
//! ## Interrupts
//!
//! One process can force another out of its current wait with
//! [`Process::interrupt`], delivering an arbitrary cause value as a
//! [`Failure::Interrupted`] outcome. The originally awaited event is unaffected and still
//! triggers for its other waiters; the interrupted process decides whether to re-establish its
//! wait or take a different path. This is also the building block for preemptive resource use:
//! interrupt a lower-priority holder and let it release early.
//!
//! ## Failures
//!
//! An error raised inside a process body does not stop the simulation. The process transitions to
//! a failed state and its completion event triggers with the failure, so only code explicitly
//! waiting on that process observes it; a failure nobody consumes is reported through the `log`
//! facade. Engine misuse - negative delays, releasing a unit that is not held, interrupting a
//! finished process - is reported immediately to the caller as a [`SimulationError`].
//!
//! ## Logging
//!
//! The [`log_info!`], [`log_debug!`], [`log_warn!`], [`log_error!`] and [`log_trace!`] macros
//! emit records through the `log` facade prefixed with the current simulation time and the name
//! of the emitting context, which keeps traces of concurrent activities readable.

#![warn(missing_docs)]

pub mod container;
pub mod context;
pub mod error;
pub mod event;
pub mod log;
pub mod process;
pub mod resource;
pub mod simulation;

mod executor;
mod state;

pub use container::{Container, ExchangeFuture};
pub use context::SimulationContext;
pub use error::SimulationError;
pub use event::{
    wait_all_of, wait_any_of, Event, EventData, EventFuture, EventId, EventPriority, EventStatus,
    EventValue, Failure, Outcome,
};
pub use process::{Process, ProcessId, ProcessReturn, ProcessStatus};
pub use resource::{AcquireFuture, Grant, Resource};
pub use simulation::Simulation;
pub use state::EPSILON;
