//! Single-threaded cooperative executor driving process bodies.
//!
//! Tasks are polled only when the scheduler decides to resume them (event
//! trigger, spawn, interrupt wake), so a no-op waker is sufficient: every
//! leaf future registers the current process with the engine instead of
//! relying on waker calls.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::event::{EventPriority, Outcome};
use crate::process::ProcessStatus;
use crate::resource;
use crate::state::SimulationState;

/// Polls every ready task until quiescence.
///
/// Re-entrant calls (spawns from inside a process body) return immediately;
/// the active drain picks the new task up within the same virtual instant.
pub(crate) fn drain(sim: &Rc<RefCell<SimulationState>>) {
    {
        let mut s = sim.borrow_mut();
        if s.executor_active {
            return;
        }
        s.executor_active = true;
    }
    let waker = futures::task::noop_waker();
    loop {
        let popped = { sim.borrow_mut().ready.pop_front() };
        let Some(id) = popped else { break };
        let fut = { sim.borrow_mut().tasks.remove(&id) };
        // A task may be woken after it already finished (stale registration);
        // such wakes are ignored.
        let Some(mut fut) = fut else { continue };
        {
            let mut s = sim.borrow_mut();
            s.current = Some(id);
            let entry = s.processes.get_mut(&id).expect("unknown process");
            entry.status = ProcessStatus::Running;
            entry.waiting_on = None;
        }
        let mut cx = Context::from_waker(&waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Pending => {
                let mut s = sim.borrow_mut();
                s.tasks.insert(id, fut);
                if let Some(entry) = s.processes.get_mut(&id) {
                    entry.status = ProcessStatus::Suspended;
                }
                s.current = None;
            }
            Poll::Ready(outcome) => {
                // Drop the body first so that any resource futures it still
                // owns run their cancellation before cleanup looks at holders.
                drop(fut);
                { sim.borrow_mut().current = None; }
                finish(sim, id, outcome);
            }
        }
    }
    sim.borrow_mut().executor_active = false;
}

/// Finalizes a finished process: triggers its completion event, cleans up any
/// resource units it still holds and removes it from the registry. Handles
/// derive the final status from the completion event, so the registry only
/// ever holds live processes.
fn finish(sim: &Rc<RefCell<SimulationState>>, id: crate::process::ProcessId, outcome: Outcome) {
    let held = {
        let mut s = sim.borrow_mut();
        let entry = s.processes.remove(&id).expect("unknown process");
        let (completion, held, name) = (entry.completion, entry.held, entry.name);
        if let Err(failure) = &outcome {
            log::debug!(
                "[{:.3}] process '{}' {} failed: {}",
                s.time(),
                name,
                id,
                failure
            );
        } else {
            log::trace!("[{:.3}] process '{}' {} terminated", s.time(), name, id);
        }
        {
            let mut state = completion.borrow_mut();
            state.outcome = Some(outcome);
            state.scheduled = true;
        }
        let now = s.time();
        s.push_entry(completion, now, EventPriority::Normal);
        held
    };
    for h in held {
        if let Some(core) = h.resource.upgrade() {
            resource::cleanup_grant(&core, h.grant);
        }
    }
}
