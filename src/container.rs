//! Level-based shared stores.
//!
//! A [`Container`] models a homogeneous, continuous quantity (fuel in a
//! tank, water in a reservoir) with a fixed capacity. Processes take from it
//! with [`get`](Container::get) and add to it with [`put`](Container::put);
//! both suspend the caller until the exchange fits. Each queue is strictly
//! FIFO: a blocked head blocks everything behind it, so large exchanges are
//! not starved by small ones.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use crate::event::{EventPriority, EventState, EventStatus, Failure};
use crate::state::{SimulationState, EPSILON};

struct PendingExchange {
    amount: f64,
    seq: u64,
    event: Rc<RefCell<EventState>>,
    done: Rc<Cell<bool>>,
}

pub(crate) struct ContainerCore {
    name: Rc<str>,
    capacity: f64,
    level: f64,
    get_queue: VecDeque<PendingExchange>,
    put_queue: VecDeque<PendingExchange>,
    exchange_seq: u64,
    sim: Weak<RefCell<SimulationState>>,
}

impl ContainerCore {
    /// Serves queued exchanges for as long as any head fits, applying the
    /// level change at grant time and waking the granted process via a
    /// zero-delay event.
    fn settle(&mut self, sim: &mut SimulationState) {
        loop {
            let mut progressed = false;
            while let Some(head) = self.get_queue.front() {
                if self.level + EPSILON >= head.amount {
                    let request = self.get_queue.pop_front().expect("non-empty queue");
                    self.level -= request.amount;
                    Self::grant(sim, request);
                    progressed = true;
                } else {
                    break;
                }
            }
            while let Some(head) = self.put_queue.front() {
                if self.level + head.amount <= self.capacity + EPSILON {
                    let request = self.put_queue.pop_front().expect("non-empty queue");
                    self.level += request.amount;
                    Self::grant(sim, request);
                    progressed = true;
                } else {
                    break;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn grant(sim: &mut SimulationState, request: PendingExchange) {
        request.done.set(true);
        {
            let mut state = request.event.borrow_mut();
            state.outcome = Some(Ok(None));
            state.scheduled = true;
        }
        let now = sim.time();
        sim.push_entry(request.event, now, EventPriority::Normal);
    }
}

/// Cloneable handle to a level-based store.
#[derive(Clone)]
pub struct Container {
    core: Rc<RefCell<ContainerCore>>,
}

impl Container {
    pub(crate) fn new(
        name: &str,
        capacity: f64,
        init: f64,
        sim: Weak<RefCell<SimulationState>>,
    ) -> Self {
        assert!(capacity > 0.0, "container capacity must be positive");
        assert!(
            (0.0..=capacity).contains(&init),
            "initial level must be within capacity"
        );
        Self {
            core: Rc::new(RefCell::new(ContainerCore {
                name: name.into(),
                capacity,
                level: init,
                get_queue: VecDeque::new(),
                put_queue: VecDeque::new(),
                exchange_seq: 0,
                sim,
            })),
        }
    }

    /// Name of this container, used in log records.
    pub fn name(&self) -> Rc<str> {
        self.core.borrow().name.clone()
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> f64 {
        self.core.borrow().capacity
    }

    /// Current level.
    pub fn level(&self) -> f64 {
        self.core.borrow().level
    }

    /// Takes `amount` out of the container, suspending the caller until the
    /// level covers it. Panics if `amount` is not positive or exceeds the
    /// capacity (such a get could never complete).
    pub fn get(&self, amount: f64) -> ExchangeFuture {
        assert!(amount > 0.0, "get amount must be positive");
        assert!(
            amount <= self.capacity(),
            "get amount exceeds container capacity"
        );
        ExchangeFuture {
            core: self.core.clone(),
            amount,
            kind: ExchangeKind::Get,
            stage: ExchangeStage::Init,
        }
    }

    /// Adds `amount` into the container, suspending the caller until there
    /// is room. Panics if `amount` is not positive or exceeds the capacity.
    pub fn put(&self, amount: f64) -> ExchangeFuture {
        assert!(amount > 0.0, "put amount must be positive");
        assert!(
            amount <= self.capacity(),
            "put amount exceeds container capacity"
        );
        ExchangeFuture {
            core: self.core.clone(),
            amount,
            kind: ExchangeKind::Put,
            stage: ExchangeStage::Init,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ExchangeKind {
    Get,
    Put,
}

enum ExchangeStage {
    Init,
    Queued {
        seq: u64,
        event: Rc<RefCell<EventState>>,
        done: Rc<Cell<bool>>,
    },
    Done,
}

/// Future resolving once a container exchange completed.
///
/// Dropping it cancels a queued exchange; a completed but unconsumed
/// exchange is rolled back.
pub struct ExchangeFuture {
    core: Rc<RefCell<ContainerCore>>,
    amount: f64,
    kind: ExchangeKind,
    stage: ExchangeStage,
}

impl Future for ExchangeFuture {
    type Output = Result<(), Failure>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let sim_rc = {
            let core = this.core.borrow();
            core.sim.upgrade().expect("simulation no longer exists")
        };
        let mut sim = sim_rc.borrow_mut();
        let current = sim
            .current
            .expect("container exchanges can only be awaited inside processes");
        if let Some(failure) = sim
            .processes
            .get_mut(&current)
            .and_then(|p| p.interrupts.pop_front())
        {
            return Poll::Ready(Err(failure));
        }
        match &this.stage {
            ExchangeStage::Init => {
                let mut core = this.core.borrow_mut();
                let fits = match this.kind {
                    ExchangeKind::Get => {
                        core.get_queue.is_empty() && core.level + EPSILON >= this.amount
                    }
                    ExchangeKind::Put => {
                        core.put_queue.is_empty()
                            && core.level + this.amount <= core.capacity + EPSILON
                    }
                };
                if fits {
                    match this.kind {
                        ExchangeKind::Get => core.level -= this.amount,
                        ExchangeKind::Put => core.level += this.amount,
                    }
                    // A put may unblock a queued get and vice versa.
                    core.settle(&mut sim);
                    this.stage = ExchangeStage::Done;
                    return Poll::Ready(Ok(()));
                }
                let event = sim.create_event_state();
                let seq = core.exchange_seq;
                core.exchange_seq += 1;
                let done = Rc::new(Cell::new(false));
                let pending = PendingExchange {
                    amount: this.amount,
                    seq,
                    event: event.clone(),
                    done: done.clone(),
                };
                match this.kind {
                    ExchangeKind::Get => core.get_queue.push_back(pending),
                    ExchangeKind::Put => core.put_queue.push_back(pending),
                }
                event.borrow_mut().waiters.push(current);
                if let Some(entry) = sim.processes.get_mut(&current) {
                    entry.waiting_on = Some(Rc::downgrade(&event));
                }
                this.stage = ExchangeStage::Queued { seq, event, done };
                Poll::Pending
            }
            ExchangeStage::Queued { done, .. } => {
                if done.get() {
                    this.stage = ExchangeStage::Done;
                    Poll::Ready(Ok(()))
                } else {
                    Poll::Pending
                }
            }
            ExchangeStage::Done => panic!("exchange future polled after completion"),
        }
    }
}

impl Drop for ExchangeFuture {
    fn drop(&mut self) {
        if let ExchangeStage::Queued { seq, event, done } = &self.stage {
            let sim_rc = {
                let core = self.core.borrow();
                core.sim.upgrade()
            };
            let mut core = self.core.borrow_mut();
            if done.get() {
                // Completed but never consumed: roll the level change back.
                match self.kind {
                    ExchangeKind::Get => core.level += self.amount,
                    ExchangeKind::Put => core.level -= self.amount,
                }
                if let Some(sim_rc) = sim_rc {
                    let mut sim = sim_rc.borrow_mut();
                    core.settle(&mut sim);
                }
            } else {
                let seq = *seq;
                match self.kind {
                    ExchangeKind::Get => core.get_queue.retain(|q| q.seq != seq),
                    ExchangeKind::Put => core.put_queue.retain(|q| q.seq != seq),
                }
                event.borrow_mut().status = EventStatus::Cancelled;
                // The withdrawn exchange may have been the head blocking
                // smaller ones behind it.
                if let Some(sim_rc) = sim_rc {
                    let mut sim = sim_rc.borrow_mut();
                    core.settle(&mut sim);
                }
            }
        }
    }
}
