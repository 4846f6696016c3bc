//! Core simulation state: virtual clock, event heap, process registry and
//! the simulation-wide random number generator.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rustc_hash::FxHashMap;

use crate::error::SimulationError;
use crate::event::{EventId, EventPriority, EventState, EventStatus, Outcome};
use crate::process::{ProcessEntry, ProcessId};

/// Epsilon for comparison of simulation times.
pub const EPSILON: f64 = 1e-12;

pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = Outcome>>>;

/// Heap entry ordered by `(time, priority, insertion sequence)`.
///
/// The comparator carries the full ordering key instead of relying on heap
/// insertion behavior: `BinaryHeap` gives no FIFO guarantee for equal keys.
pub(crate) struct HeapEntry {
    pub time: f64,
    pub priority: EventPriority,
    pub seq: u64,
    pub event: Rc<RefCell<EventState>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we need the earliest entry on top.
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub(crate) struct SimulationState {
    clock: f64,
    event_seq: u64,
    entry_seq: u64,
    grant_seq: u64,
    process_seq: u64,
    processed_count: u64,
    heap: BinaryHeap<HeapEntry>,
    rand: Pcg64,

    pub(crate) processes: FxHashMap<ProcessId, ProcessEntry>,
    pub(crate) tasks: FxHashMap<ProcessId, TaskFuture>,
    pub(crate) ready: VecDeque<ProcessId>,
    pub(crate) current: Option<ProcessId>,
    pub(crate) executor_active: bool,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0.0,
            event_seq: 0,
            entry_seq: 0,
            grant_seq: 0,
            process_seq: 0,
            processed_count: 0,
            heap: BinaryHeap::new(),
            rand: Pcg64::seed_from_u64(seed),
            processes: FxHashMap::default(),
            tasks: FxHashMap::default(),
            ready: VecDeque::new(),
            current: None,
            executor_active: false,
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn create_event_state(&mut self) -> Rc<RefCell<EventState>> {
        let id: EventId = self.event_seq;
        self.event_seq += 1;
        Rc::new(RefCell::new(EventState::new(id)))
    }

    pub fn next_grant_id(&mut self) -> u64 {
        self.grant_seq += 1;
        self.grant_seq
    }

    pub fn next_process_id(&mut self) -> ProcessId {
        let id = ProcessId(self.process_seq);
        self.process_seq += 1;
        id
    }

    /// Inserts an already-completed or timer event into the heap at an
    /// absolute time. The caller guarantees `time >= clock`.
    pub fn push_entry(&mut self, event: Rc<RefCell<EventState>>, time: f64, priority: EventPriority) {
        debug_assert!(time + EPSILON >= self.clock);
        let seq = self.entry_seq;
        self.entry_seq += 1;
        self.heap.push(HeapEntry {
            time,
            priority,
            seq,
            event,
        });
    }

    /// Schedules a pending event at `clock + delay`, validating the delay.
    pub fn schedule(
        &mut self,
        event: &Rc<RefCell<EventState>>,
        delay: f64,
        priority: EventPriority,
    ) -> Result<(), SimulationError> {
        if !(delay >= 0.0) {
            return Err(SimulationError::InvalidDelay(delay));
        }
        {
            let mut state = event.borrow_mut();
            if state.status != EventStatus::Pending || state.scheduled {
                return Err(SimulationError::EventAlreadyTriggered(state.id));
            }
            state.scheduled = true;
        }
        let time = self.clock + delay;
        self.push_entry(event.clone(), time, priority);
        Ok(())
    }

    /// Removes and returns the earliest live entry, skipping cancelled events.
    pub fn pop_next(&mut self) -> Option<HeapEntry> {
        while let Some(entry) = self.heap.pop() {
            if entry.event.borrow().status == EventStatus::Cancelled {
                continue;
            }
            return Some(entry);
        }
        None
    }

    /// Time of the earliest live entry, removing cancelled ones on the way.
    pub fn peek_time(&mut self) -> Option<f64> {
        while let Some(entry) = self.heap.peek() {
            if entry.event.borrow().status == EventStatus::Cancelled {
                self.heap.pop();
                continue;
            }
            return Some(entry.time);
        }
        None
    }

    pub fn has_live_entries(&self) -> bool {
        self.heap
            .iter()
            .any(|e| e.event.borrow().status != EventStatus::Cancelled)
    }

    /// Advances the clock to the time of a popped entry.
    pub fn advance(&mut self, time: f64) {
        debug_assert!(time + EPSILON >= self.clock, "clock must never move backward");
        self.clock = self.clock.max(time);
        self.processed_count += 1;
    }

    /// Moves the clock forward without processing events (end of a bounded run).
    pub fn advance_to_bound(&mut self, time: f64) {
        if time > self.clock {
            self.clock = time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time: f64, priority: EventPriority, state: &mut SimulationState) -> HeapEntry {
        let event = state.create_event_state();
        let seq = {
            // mirror push_entry's sequence assignment without inserting
            let s = state.entry_seq;
            state.entry_seq += 1;
            s
        };
        HeapEntry {
            time,
            priority,
            seq,
            event,
        }
    }

    #[test]
    fn heap_orders_by_time_priority_sequence() {
        let mut state = SimulationState::new(1);
        let mut heap = BinaryHeap::new();
        heap.push(entry(5.0, EventPriority::Normal, &mut state));
        heap.push(entry(1.0, EventPriority::Normal, &mut state));
        heap.push(entry(1.0, EventPriority::Urgent, &mut state));
        heap.push(entry(1.0, EventPriority::Normal, &mut state));

        let order: Vec<(f64, EventPriority, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|e| (e.time, e.priority, e.seq))
            .collect();
        assert_eq!(
            order,
            vec![
                (1.0, EventPriority::Urgent, 2),
                (1.0, EventPriority::Normal, 1),
                (1.0, EventPriority::Normal, 3),
                (5.0, EventPriority::Normal, 0),
            ]
        );
    }

    #[test]
    fn negative_delay_is_rejected() {
        let mut state = SimulationState::new(1);
        let event = state.create_event_state();
        let err = state
            .schedule(&event, -1.0, EventPriority::Normal)
            .unwrap_err();
        assert_eq!(err, SimulationError::InvalidDelay(-1.0));
        let err = state
            .schedule(&event, f64::NAN, EventPriority::Normal)
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvalidDelay(_)));
    }
}
