//! Capacity-limited shared resources with a priority wait queue.
//!
//! A [`Resource`] has a fixed capacity and grants units to processes via
//! [`acquire`](Resource::acquire). When all units are taken, requests queue
//! up ordered by `(priority, arrival order)`. Releasing a unit reassigns it
//! to the best queued request synchronously, so no event at the same
//! timestamp ever observes a free unit that is not yet reassigned; the
//! grantee itself resumes via a zero-delay event at the release timestamp.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use rustc_hash::FxHashMap;

use crate::error::SimulationError;
use crate::event::{EventPriority, EventState, EventStatus, Failure};
use crate::process::{HeldGrant, ProcessId};
use crate::state::SimulationState;

pub(crate) struct QueuedRequest {
    priority: i64,
    seq: u64,
    process: ProcessId,
    event: Rc<RefCell<EventState>>,
    /// Filled with the grant id when the unit is reassigned to this request.
    slot: Rc<Cell<Option<u64>>>,
}

pub(crate) struct ResourceCore {
    name: Rc<str>,
    capacity: usize,
    auto_release: bool,
    holders: FxHashMap<u64, ProcessId>,
    queue: Vec<QueuedRequest>,
    request_seq: u64,
    sim: Weak<RefCell<SimulationState>>,
}

impl ResourceCore {
    /// Index of the queued request to serve next: lowest priority value,
    /// then earliest arrival.
    fn best_request(&self) -> Option<usize> {
        self.queue
            .iter()
            .enumerate()
            .min_by_key(|(_, q)| (q.priority, q.seq))
            .map(|(i, _)| i)
    }
}

/// A held resource unit. Released exactly once via [`Resource::release`];
/// releasing it again is [`SimulationError::ResourceOverrelease`].
#[derive(Clone, Debug)]
pub struct Grant {
    pub(crate) id: u64,
}

/// Cloneable handle to a capacity-limited resource.
#[derive(Clone)]
pub struct Resource {
    pub(crate) core: Rc<RefCell<ResourceCore>>,
}

impl Resource {
    pub(crate) fn new(
        name: &str,
        capacity: usize,
        sim: Weak<RefCell<SimulationState>>,
    ) -> Self {
        assert!(capacity >= 1, "resource capacity must be at least 1");
        Self {
            core: Rc::new(RefCell::new(ResourceCore {
                name: name.into(),
                capacity,
                auto_release: false,
                holders: FxHashMap::default(),
                queue: Vec::new(),
                request_seq: 0,
                sim,
            })),
        }
    }

    /// Name of this resource, used in log records.
    pub fn name(&self) -> Rc<str> {
        self.core.borrow().name.clone()
    }

    /// Fixed capacity of this resource.
    pub fn capacity(&self) -> usize {
        self.core.borrow().capacity
    }

    /// Number of units currently held.
    pub fn holder_count(&self) -> usize {
        self.core.borrow().holders.len()
    }

    /// Number of queued requests.
    pub fn queue_len(&self) -> usize {
        self.core.borrow().queue.len()
    }

    /// Configures whether units still held by a process when it terminates
    /// or fails are released automatically. Off by default: a leaked hold is
    /// then logged and kept, so that the leak stays observable.
    pub fn set_auto_release(&self, enabled: bool) {
        self.core.borrow_mut().auto_release = enabled;
    }

    /// Requests one unit with default priority. Grants immediately if a unit
    /// is free, otherwise suspends the calling process until one is.
    pub fn acquire(&self) -> AcquireFuture {
        self.acquire_with_priority(0)
    }

    /// Requests one unit with an explicit priority; lower values are served
    /// first, ties by arrival order.
    pub fn acquire_with_priority(&self, priority: i64) -> AcquireFuture {
        AcquireFuture {
            core: self.core.clone(),
            priority,
            stage: AcquireStage::Init,
        }
    }

    /// Releases a held unit, granting it to the best queued request if any.
    pub fn release(&self, grant: &Grant) -> Result<(), SimulationError> {
        release_grant(&self.core, grant.id)
    }
}

/// Removes a grant from the holder set and hands the freed unit to the next
/// queued request. Shared by explicit release, request cancellation and
/// cleanup on process termination.
pub(crate) fn release_grant(
    core_rc: &Rc<RefCell<ResourceCore>>,
    grant: u64,
) -> Result<(), SimulationError> {
    let sim_weak = core_rc.borrow().sim.clone();
    let Some(sim) = sim_weak.upgrade() else {
        // Simulation teardown: nothing left to reassign.
        return Ok(());
    };
    let mut sim = sim.borrow_mut();
    let mut core = core_rc.borrow_mut();
    let holder = core
        .holders
        .remove(&grant)
        .ok_or(SimulationError::ResourceOverrelease)?;
    if let Some(entry) = sim.processes.get_mut(&holder) {
        entry.held.retain(|h| h.grant != grant);
    }
    if let Some(idx) = core.best_request() {
        let request = core.queue.remove(idx);
        let next_grant = sim.next_grant_id();
        core.holders.insert(next_grant, request.process);
        request.slot.set(Some(next_grant));
        if let Some(entry) = sim.processes.get_mut(&request.process) {
            entry.held.push(HeldGrant {
                resource: Rc::downgrade(core_rc),
                grant: next_grant,
            });
        }
        {
            let mut state = request.event.borrow_mut();
            state.outcome = Some(Ok(None));
            state.scheduled = true;
        }
        let now = sim.time();
        log::trace!(
            "[{:.3}] resource '{}': unit reassigned to process {}",
            now,
            core.name,
            request.process
        );
        sim.push_entry(request.event, now, EventPriority::Normal);
    }
    Ok(())
}

/// Cleanup for units still held when their process finishes. Auto-release
/// returns the unit to the pool; otherwise the leak is logged and kept.
pub(crate) fn cleanup_grant(core_rc: &Rc<RefCell<ResourceCore>>, grant: u64) {
    let auto = core_rc.borrow().auto_release;
    if auto {
        let _ = release_grant(core_rc, grant);
    } else {
        let core = core_rc.borrow();
        log::warn!(
            "resource '{}': unit {} leaked by a finished process",
            core.name,
            grant
        );
    }
}

enum AcquireStage {
    Init,
    Queued {
        seq: u64,
        event: Rc<RefCell<EventState>>,
        slot: Rc<Cell<Option<u64>>>,
    },
    Done,
}

/// Future resolving with a [`Grant`] once a unit is available.
///
/// Dropping it cancels a queued request; a unit that was already reassigned
/// to a dropped future is returned to the pool.
pub struct AcquireFuture {
    core: Rc<RefCell<ResourceCore>>,
    priority: i64,
    stage: AcquireStage,
}

impl Future for AcquireFuture {
    type Output = Result<Grant, Failure>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let sim_rc = {
            let core = this.core.borrow();
            core.sim.upgrade().expect("simulation no longer exists")
        };
        let mut sim = sim_rc.borrow_mut();
        let current = sim
            .current
            .expect("resources can only be acquired inside processes");
        if let Some(failure) = sim
            .processes
            .get_mut(&current)
            .and_then(|p| p.interrupts.pop_front())
        {
            return Poll::Ready(Err(failure));
        }
        match &this.stage {
            AcquireStage::Init => {
                let mut core = this.core.borrow_mut();
                if core.holders.len() < core.capacity {
                    // A free unit implies an empty queue: freed units are
                    // reassigned synchronously at release time.
                    debug_assert!(core.queue.is_empty());
                    let grant = sim.next_grant_id();
                    core.holders.insert(grant, current);
                    if let Some(entry) = sim.processes.get_mut(&current) {
                        entry.held.push(HeldGrant {
                            resource: Rc::downgrade(&this.core),
                            grant,
                        });
                    }
                    this.stage = AcquireStage::Done;
                    return Poll::Ready(Ok(Grant { id: grant }));
                }
                let event = sim.create_event_state();
                let seq = core.request_seq;
                core.request_seq += 1;
                let slot = Rc::new(Cell::new(None));
                core.queue.push(QueuedRequest {
                    priority: this.priority,
                    seq,
                    process: current,
                    event: event.clone(),
                    slot: slot.clone(),
                });
                event.borrow_mut().waiters.push(current);
                if let Some(entry) = sim.processes.get_mut(&current) {
                    entry.waiting_on = Some(Rc::downgrade(&event));
                }
                this.stage = AcquireStage::Queued { seq, event, slot };
                Poll::Pending
            }
            AcquireStage::Queued { slot, .. } => {
                if let Some(grant) = slot.get() {
                    this.stage = AcquireStage::Done;
                    Poll::Ready(Ok(Grant { id: grant }))
                } else {
                    Poll::Pending
                }
            }
            AcquireStage::Done => panic!("acquire future polled after completion"),
        }
    }
}

impl Drop for AcquireFuture {
    fn drop(&mut self) {
        if let AcquireStage::Queued { seq, event, slot } = &self.stage {
            if let Some(grant) = slot.get() {
                // The unit was reassigned to us but never consumed.
                let _ = release_grant(&self.core, grant);
            } else {
                let mut core = self.core.borrow_mut();
                let seq = *seq;
                core.queue.retain(|q| q.seq != seq);
                event.borrow_mut().status = EventStatus::Cancelled;
            }
        }
    }
}
