// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fixed-capacity in-memory job slot table (§3 "Job Record", §4.1 "Job
// Manager").
//
// Every job lives in one of `capacity` slots for its entire lifetime; there
// is no separate allocation step. A `JobHandle` names `(index, generation)`
// so a stale handle pointing at a slot that has since been recycled for a
// different job is always detectable, without reference counting.

use mprint_core::error::{PrintCoreError, Result};
use mprint_core::types::{JobHandle, JobParams, JobState};

/// One job slot. `Free` slots are reused in round-robin order so a job's
/// generation keeps climbing rather than being immediately recycled.
struct Slot {
    state: JobState,
    generation: u16,
    params: Option<JobParams>,
    printer_uri: Option<String>,
}

impl Slot {
    fn free() -> Self {
        Self {
            state: JobState::Free,
            generation: 0,
            params: None,
            printer_uri: None,
        }
    }
}

/// The job table. Not `Send`-guarded itself — the Job Manager wraps one
/// instance in a `tokio::sync::Mutex`.
pub struct JobTable {
    slots: Vec<Slot>,
    next_free_hint: usize,
}

impl JobTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::free()).collect(),
            next_free_hint: 0,
        }
    }

    /// Claim a free slot for a new job, transitioning it to `Queued`.
    /// Returns [`PrintCoreError::JobTableFull`] if every slot is occupied.
    pub fn allocate(&mut self, params: JobParams, printer_uri: String) -> Result<JobHandle> {
        let capacity = self.slots.len();
        for offset in 0..capacity {
            let index = (self.next_free_hint + offset) % capacity;
            if self.slots[index].state == JobState::Free {
                let slot = &mut self.slots[index];
                slot.state = JobState::Queued;
                slot.generation = slot.generation.wrapping_add(1);
                slot.params = Some(params);
                slot.printer_uri = Some(printer_uri);
                self.next_free_hint = (index + 1) % capacity;
                return Ok(JobHandle::encode(index as u16, slot.generation));
            }
        }
        Err(PrintCoreError::JobTableFull { capacity })
    }

    /// Look up the current state of a handle's slot, verifying the
    /// generation still matches.
    pub fn state(&self, handle: JobHandle) -> Result<JobState> {
        Ok(self.slot(handle)?.state)
    }

    pub fn params(&self, handle: JobHandle) -> Result<&JobParams> {
        self.slot(handle)?
            .params
            .as_ref()
            .ok_or(PrintCoreError::UnknownHandle)
    }

    pub fn printer_uri(&self, handle: JobHandle) -> Result<&str> {
        self.slot(handle)?
            .printer_uri
            .as_deref()
            .ok_or(PrintCoreError::UnknownHandle)
    }

    /// Transition a slot to a new state. Does not validate that the
    /// transition is legal under the state machine — callers (the worker
    /// loop) are the single writer and are expected to drive the machine
    /// correctly; this just records the result.
    pub fn set_state(&mut self, handle: JobHandle, state: JobState) -> Result<()> {
        let generation = self.slot(handle)?.generation;
        let index = handle.index() as usize;
        self.slots[index].state = state;
        let _ = generation;

        if state.is_terminal() {
            // Held open for the caller to read one more time (e.g. the
            // terminal callback) before `release` frees it.
        }
        Ok(())
    }

    /// Return a slot to `Free` once its terminal callback has fired.
    pub fn release(&mut self, handle: JobHandle) -> Result<()> {
        let index = handle.index() as usize;
        self.slot(handle)?;
        self.slots[index] = Slot {
            state: JobState::Free,
            generation: self.slots[index].generation,
            params: None,
            printer_uri: None,
        };
        Ok(())
    }

    fn slot(&self, handle: JobHandle) -> Result<&Slot> {
        let index = handle.index() as usize;
        let slot = self.slots.get(index).ok_or(PrintCoreError::UnknownHandle)?;
        if slot.state == JobState::Free || slot.generation != handle.generation() {
            return Err(PrintCoreError::UnknownHandle);
        }
        Ok(slot)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state != JobState::Free).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_lookup_round_trips() {
        let mut table = JobTable::new(4);
        let handle = table
            .allocate(JobParams::default(), "ipp://printer/".into())
            .expect("allocate");
        assert_eq!(table.state(handle).unwrap(), JobState::Queued);
    }

    fn job_table_full_returns_error() -> Result<()> {
        let mut table = JobTable::new(1);
        table.allocate(JobParams::default(), "ipp://p/".into())?;
        let result = table.allocate(JobParams::default(), "ipp://p/".into());
        assert!(matches!(result, Err(PrintCoreError::JobTableFull { capacity: 1 })));
        Ok(())
    }

    #[test]
    fn table_full_is_reported() {
        job_table_full_returns_error().unwrap();
    }

    #[test]
    fn stale_handle_after_release_is_rejected() {
        let mut table = JobTable::new(1);
        let handle = table
            .allocate(JobParams::default(), "ipp://p/".into())
            .expect("allocate");
        table.set_state(handle, JobState::Completed).unwrap();
        table.release(handle).unwrap();
        assert!(table.state(handle).is_err());
    }

    #[test]
    fn released_slot_is_reused_with_higher_generation() {
        let mut table = JobTable::new(1);
        let first = table
            .allocate(JobParams::default(), "ipp://p/".into())
            .expect("allocate");
        table.set_state(first, JobState::Completed).unwrap();
        table.release(first).unwrap();

        let second = table
            .allocate(JobParams::default(), "ipp://p/".into())
            .expect("allocate");
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(table.state(first).is_err());
        assert_eq!(table.state(second).unwrap(), JobState::Queued);
    }

    #[test]
    fn active_count_tracks_occupied_slots() {
        let mut table = JobTable::new(4);
        assert_eq!(table.active_count(), 0);
        table.allocate(JobParams::default(), "ipp://p/".into()).unwrap();
        assert_eq!(table.active_count(), 1);
    }
}
