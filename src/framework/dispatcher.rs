//! Shared queue of coordinate ranges.
//!
//! The queue and the claim chain are the only state workers share. Both sit
//! behind one mutex; every claim checks for a remaining range and takes it
//! inside the same critical section.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::framework::{CoordinateRange, FrameworkError};

/// Identifies one claim: the claiming worker and the claim's index among
/// that worker's claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId {
    /// Claiming worker.
    pub worker_id: usize,
    /// 0-based index of the claim within the worker's output.
    pub segment: usize,
}

/// Range handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Claim identity.
    pub id: TicketId,
    /// Range to process.
    pub range: CoordinateRange,
}

#[derive(Debug, Default)]
struct WorkerSlot {
    claims: usize,
    finished: bool,
}

#[derive(Debug, Default)]
struct DispatchState {
    queue: VecDeque<CoordinateRange>,
    workers: Vec<WorkerSlot>,
    first: Option<TicketId>,
    last: Option<TicketId>,
    links: HashMap<TicketId, TicketId>,
    claimed: usize,
}

/// Hands out coordinate ranges and records the order they were claimed in.
#[derive(Debug, Default)]
pub struct CoordinateDispatcher {
    state: Mutex<DispatchState>,
}

/// Exclusive access to the dispatcher state.
#[derive(Debug)]
pub struct DispatchGuard<'a> {
    state: MutexGuard<'a, DispatchState>,
}

impl DispatchGuard<'_> {
    /// Whether an unclaimed range remains.
    pub fn has_next(&self) -> bool {
        !self.state.queue.is_empty()
    }

    /// Claim the next range for `worker_id` and append it to the chain.
    pub fn next(&mut self, worker_id: usize) -> Result<Ticket, FrameworkError> {
        let state = &mut *self.state;
        let slot = state
            .workers
            .get_mut(worker_id)
            .ok_or(FrameworkError::UnknownWorker(worker_id))?;
        let range = state.queue.pop_front().ok_or(FrameworkError::Exhausted)?;

        let id = TicketId {
            worker_id,
            segment: slot.claims,
        };
        slot.claims += 1;
        match state.last.replace(id) {
            Some(previous) => {
                state.links.insert(previous, id);
            }
            None => state.first = Some(id),
        }
        state.claimed += 1;
        Ok(Ticket { id, range })
    }
}

impl CoordinateDispatcher {
    /// Dispatcher over `ranges`, handed out in iteration order.
    pub fn new(ranges: impl IntoIterator<Item = CoordinateRange>) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                queue: ranges.into_iter().collect(),
                ..DispatchState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter the exclusive section.
    pub fn lock(&self) -> DispatchGuard<'_> {
        DispatchGuard {
            state: self.state(),
        }
    }

    /// Register a worker and return its id.
    pub fn register_worker(&self) -> usize {
        let mut state = self.state();
        state.workers.push(WorkerSlot::default());
        state.workers.len() - 1
    }

    /// Claim the next range if one remains.
    pub fn claim(&self, worker_id: usize) -> Result<Option<Ticket>, FrameworkError> {
        let mut guard = self.lock();
        if !guard.has_next() {
            return Ok(None);
        }
        let ticket = guard.next(worker_id)?;
        debug!(
            worker = worker_id,
            segment = ticket.id.segment,
            range = %ticket.range,
            "claimed range"
        );
        Ok(Some(ticket))
    }

    /// Mark `worker_id` as done.
    pub fn finish(&self, worker_id: usize) {
        if let Some(slot) = self.state().workers.get_mut(worker_id) {
            slot.finished = true;
        }
    }

    /// Ranges not yet claimed.
    pub fn remaining(&self) -> usize {
        self.state().queue.len()
    }

    /// Whether every registered worker has finished.
    pub fn all_finished(&self) -> bool {
        self.state().workers.iter().all(|slot| slot.finished)
    }

    /// Claims made by `worker_id`.
    pub fn claims_of(&self, worker_id: usize) -> usize {
        self.state().workers.get(worker_id).map_or(0, |slot| slot.claims)
    }

    /// Resolve the chain into the sequence claims were made in.
    pub fn claim_order(&self) -> Result<Vec<TicketId>, FrameworkError> {
        let state = self.state();
        let mut order = Vec::with_capacity(state.claimed);
        let mut cursor = state.first;
        while let Some(id) = cursor {
            if order.len() == state.claimed {
                return Err(FrameworkError::BrokenChain(format!(
                    "chain longer than {} claims",
                    state.claimed
                )));
            }
            order.push(id);
            cursor = state.links.get(&id).copied();
        }
        if order.len() != state.claimed || order.last().copied() != state.last {
            return Err(FrameworkError::BrokenChain(format!(
                "resolved {} of {} claims",
                order.len(),
                state.claimed
            )));
        }
        Ok(order)
    }
}
