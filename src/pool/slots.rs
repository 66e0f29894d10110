//! Worker slot bookkeeping
//!
//! The pool has a fixed cardinality; slots are recycled, never created or
//! destroyed during normal operation. Admission never exceeds the number of
//! idle slots, which is the engine's primary backpressure mechanism.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::request::ExecutionMode;

/// Occupancy state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// Available for dispatch
    Idle,
    /// Executing a request
    Busy,
}

/// One execution slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSlot {
    /// Stable slot id
    pub id: usize,
    /// Execution mode of the current occupant
    pub mode: Option<ExecutionMode>,
    /// Occupancy state
    pub state: SlotState,
    /// Request currently running on this slot
    pub current: Option<Uuid>,
}

impl WorkerSlot {
    fn idle(id: usize) -> Self {
        Self {
            id,
            mode: None,
            state: SlotState::Idle,
            current: None,
        }
    }
}

/// Fixed-size set of execution slots
#[derive(Debug)]
pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
}

impl WorkerPool {
    /// Create a pool with `size` slots (minimum 1)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: (0..size).map(WorkerSlot::idle).collect(),
        }
    }

    /// Total slot count (the hard concurrency bound)
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of idle slots
    pub fn idle_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Idle)
            .count()
    }

    /// Number of busy slots
    pub fn busy_count(&self) -> usize {
        self.size() - self.idle_count()
    }

    /// Claim an idle slot for `request`; returns the slot id
    pub fn claim(&mut self, request: Uuid, mode: ExecutionMode) -> Option<usize> {
        let slot = self.slots.iter_mut().find(|s| s.state == SlotState::Idle)?;
        slot.state = SlotState::Busy;
        slot.mode = Some(mode);
        slot.current = Some(request);
        Some(slot.id)
    }

    /// Recycle a slot; returns the request it was running
    pub fn free(&mut self, slot_id: usize) -> Option<Uuid> {
        let slot = self.slots.get_mut(slot_id)?;
        let previous = slot.current.take();
        slot.state = SlotState::Idle;
        slot.mode = None;
        previous
    }

    /// Ids of requests currently occupying slots
    pub fn running_requests(&self) -> Vec<Uuid> {
        self.slots.iter().filter_map(|s| s.current).collect()
    }

    /// Slot currently running `request`, if any
    pub fn slot_for(&self, request: Uuid) -> Option<usize> {
        self.slots
            .iter()
            .find(|s| s.current == Some(request))
            .map(|s| s.id)
    }
}
