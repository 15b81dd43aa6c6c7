// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generation-checked buffer storage with serial lookup.
//!
//! Each registered buffer occupies a slot. Released slots are recycled via a
//! free list and their generation is bumped, so a [`HandleId`] kept past
//! release fails validation instead of aliasing the slot's next occupant.
//!
//! Every registry has a process-unique id stamped into its handles, so a
//! handle presented to the wrong channel is rejected rather than resolving to
//! whatever buffer occupies the same slot there.
//!
//! Serials are the externally visible key: the server only ever talks about
//! serials, so the registry keeps a serial → slot index for constant-time
//! event correlation.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use hashbrown::HashMap;

use crate::error::RegistryError;
use crate::id::{BufferId, HandleId, Serial};

/// Lifecycle record of one registered buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferRecord {
    pub(crate) buffer: BufferId,
    pub(crate) serial: Serial,
    pub(crate) released: bool,
    pub(crate) completion_pending: bool,
    pub(crate) last_was_flip: bool,
}

impl BufferRecord {
    fn new(buffer: BufferId, serial: Serial) -> Self {
        Self {
            buffer,
            serial,
            released: true,
            completion_pending: false,
            last_was_flip: false,
        }
    }

    /// The server-side buffer.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Serial tagging every present request of this buffer.
    #[inline]
    #[must_use]
    pub const fn serial(&self) -> Serial {
        self.serial
    }

    /// Whether the server has signalled that it stopped reading the buffer.
    #[inline]
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Whether a presentation of this buffer awaits its completion notice.
    #[inline]
    #[must_use]
    pub const fn is_completion_pending(&self) -> bool {
        self.completion_pending
    }

    /// Whether the last completed presentation was a flip.
    #[inline]
    #[must_use]
    pub const fn last_transfer_was_flip(&self) -> bool {
        self.last_was_flip
    }

    /// Whether the buffer may be rendered to, presented or freed.
    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.released && !self.completion_pending
    }
}

/// Source of registry ids.
static NEXT_REGISTRY: AtomicU32 = AtomicU32::new(1);

/// Slot arena of [`BufferRecord`]s addressed by [`HandleId`].
#[derive(Debug)]
pub struct BufferRegistry {
    id: u32,
    slots: Vec<Option<BufferRecord>>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
    by_serial: HashMap<Serial, u32>,
    last_serial: u32,
}

impl BufferRegistry {
    /// Creates an empty registry with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            by_serial: HashMap::new(),
            last_serial: 0,
        }
    }

    /// Registers a buffer and returns its handle.
    ///
    /// The buffer starts released with no presentation pending, and receives
    /// a serial greater than any serial handed out before (modulo wrap-around,
    /// which skips the reserved value and every serial still registered).
    pub fn register(&mut self, buffer: BufferId) -> HandleId {
        let serial = self.allocate_serial();
        let record = BufferRecord::new(buffer, serial);

        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot; its generation was bumped on release.
            self.slots[idx as usize] = Some(record);
            idx
        } else {
            let idx = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Some(record));
            self.generation.push(0);
            idx
        };

        self.by_serial.insert(serial, idx);
        HandleId {
            owner: self.id,
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns whether the given handle refers to a registered buffer.
    #[must_use]
    pub fn is_alive(&self, handle: HandleId) -> bool {
        self.slot(handle).is_some()
    }

    /// Returns the record for `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StaleHandle`] if the handle was released.
    pub fn get(&self, handle: HandleId) -> Result<&BufferRecord, RegistryError> {
        self.slot(handle).ok_or(RegistryError::StaleHandle(handle))
    }

    pub(crate) fn get_mut(&mut self, handle: HandleId) -> Result<&mut BufferRecord, RegistryError> {
        if !self.is_alive(handle) {
            return Err(RegistryError::StaleHandle(handle));
        }
        self.slots[handle.idx as usize]
            .as_mut()
            .ok_or(RegistryError::StaleHandle(handle))
    }

    /// Looks up the handle owning `serial`.
    #[must_use]
    pub fn find_by_serial(&self, serial: Serial) -> Option<HandleId> {
        let idx = *self.by_serial.get(&serial)?;
        Some(HandleId {
            owner: self.id,
            idx,
            generation: self.generation[idx as usize],
        })
    }

    pub(crate) fn by_serial_mut(&mut self, serial: Serial) -> Option<&mut BufferRecord> {
        let idx = *self.by_serial.get(&serial)?;
        self.slots[idx as usize].as_mut()
    }

    /// Removes a free buffer from the registry and returns its final record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StaleHandle`] for a released handle and
    /// [`RegistryError::Busy`] while the server still owns the buffer. A busy
    /// buffer stays registered.
    pub fn release(&mut self, handle: HandleId) -> Result<BufferRecord, RegistryError> {
        let record = *self.get(handle)?;
        if !record.is_free() {
            return Err(RegistryError::Busy(record.buffer));
        }
        self.remove_slot(handle.idx);
        Ok(record)
    }

    /// Removes every buffer regardless of state and returns their records.
    ///
    /// Only sound once no notification can arrive any more, i.e. after a
    /// drain.
    pub fn clear(&mut self) -> Vec<BufferRecord> {
        let mut records = Vec::with_capacity(self.len());
        for idx in 0..self.slots.len() {
            if let Some(record) = self.slots[idx] {
                records.push(record);
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "slot count is bounded by u32 handles"
                )]
                self.remove_slot(idx as u32);
            }
        }
        records
    }

    /// Returns the number of registered buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_serial.len()
    }

    /// Returns `true` when no buffer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_serial.is_empty()
    }

    /// Iterates over registered buffers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (HandleId, &BufferRecord)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            let record = slot.as_ref()?;
            #[expect(
                clippy::cast_possible_truncation,
                reason = "slot count is bounded by u32 handles"
            )]
            let idx = idx as u32;
            Some((
                HandleId {
                    owner: self.id,
                    idx,
                    generation: self.generation[idx as usize],
                },
                record,
            ))
        })
    }

    /// Returns the handles of all registered buffers.
    #[must_use]
    pub fn handles(&self) -> Vec<HandleId> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    fn slot(&self, handle: HandleId) -> Option<&BufferRecord> {
        let idx = handle.idx as usize;
        if handle.owner != self.id
            || idx >= self.slots.len()
            || self.generation[idx] != handle.generation
        {
            return None;
        }
        self.slots[idx].as_ref()
    }

    fn remove_slot(&mut self, idx: u32) {
        if let Some(record) = self.slots[idx as usize].take() {
            self.by_serial.remove(&record.serial);
            // Bump generation so old handles immediately fail validation.
            self.generation[idx as usize] = self.generation[idx as usize].wrapping_add(1);
            self.free_list.push(idx);
        }
    }

    fn allocate_serial(&mut self) -> Serial {
        loop {
            self.last_serial = self.last_serial.wrapping_add(1);
            let serial = Serial(self.last_serial);
            if !serial.is_wake() && !self.by_serial.contains_key(&serial) {
                return serial;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_last_serial(&mut self, last: u32) {
        self.last_serial = last;
    }
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_buffers_start_free() {
        let mut registry = BufferRegistry::new();
        let handle = registry.register(BufferId(7));
        let record = registry.get(handle).unwrap();

        assert!(record.is_released(), "new buffers are released");
        assert!(!record.is_completion_pending(), "new buffers have nothing pending");
        assert_eq!(record.buffer(), BufferId(7));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn serials_strictly_increase() {
        let mut registry = BufferRegistry::new();
        let a = registry.register(BufferId(1));
        let b = registry.register(BufferId(2));
        registry.release(a).unwrap();
        let c = registry.register(BufferId(3));

        let sa = Serial(1);
        let sb = registry.get(b).unwrap().serial();
        let sc = registry.get(c).unwrap().serial();
        assert!(sa < sb && sb < sc, "serials must increase: {sa:?} {sb:?} {sc:?}");
    }

    #[test]
    fn released_slot_is_reused_with_new_generation() {
        let mut registry = BufferRegistry::new();
        let a = registry.register(BufferId(1));
        registry.release(a).unwrap();
        let b = registry.register(BufferId(2));

        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(!registry.is_alive(a), "old handle must be stale");
        assert_eq!(registry.get(a), Err(RegistryError::StaleHandle(a)));
        assert_eq!(registry.get(b).unwrap().buffer(), BufferId(2));
    }

    #[test]
    fn busy_buffer_cannot_be_released() {
        let mut registry = BufferRegistry::new();
        let handle = registry.register(BufferId(5));
        registry.get_mut(handle).unwrap().released = false;

        assert_eq!(registry.release(handle), Err(RegistryError::Busy(BufferId(5))));
        assert!(registry.is_alive(handle), "busy buffer stays registered");

        let record = registry.get_mut(handle).unwrap();
        record.released = true;
        record.completion_pending = true;
        assert_eq!(registry.release(handle), Err(RegistryError::Busy(BufferId(5))));
    }

    #[test]
    fn serial_lookup_follows_registration() {
        let mut registry = BufferRegistry::new();
        let a = registry.register(BufferId(10));
        let b = registry.register(BufferId(11));
        let serial_b = registry.get(b).unwrap().serial();

        assert_eq!(registry.find_by_serial(serial_b), Some(b));
        registry.release(a).unwrap();
        assert_eq!(registry.find_by_serial(Serial(1)), None);
        assert_eq!(registry.find_by_serial(serial_b), Some(b));
    }

    #[test]
    fn wrap_around_skips_zero_and_live_serials() {
        let mut registry = BufferRegistry::new();
        let first = registry.register(BufferId(1));
        assert_eq!(registry.get(first).unwrap().serial(), Serial(1));

        registry.set_last_serial(u32::MAX - 1);
        let high = registry.register(BufferId(2));
        let wrapped = registry.register(BufferId(3));

        assert_eq!(registry.get(high).unwrap().serial(), Serial(u32::MAX));
        // 0 is reserved and 1 is still owned by `first`.
        assert_eq!(registry.get(wrapped).unwrap().serial(), Serial(2));
    }

    #[test]
    fn clear_removes_everything_and_invalidates_handles() {
        let mut registry = BufferRegistry::new();
        let a = registry.register(BufferId(1));
        let b = registry.register(BufferId(2));
        registry.get_mut(b).unwrap().released = false;

        let records = registry.clear();
        assert_eq!(records.len(), 2);
        assert!(registry.is_empty(), "clear empties the registry");
        assert!(!registry.is_alive(a), "handles die with the registry");
        assert!(!registry.is_alive(b), "busy handles die too");
        assert_eq!(registry.find_by_serial(Serial(1)), None);
    }

    #[test]
    fn iter_visits_live_slots_only() {
        let mut registry = BufferRegistry::new();
        let a = registry.register(BufferId(1));
        let b = registry.register(BufferId(2));
        let c = registry.register(BufferId(3));
        registry.release(b).unwrap();

        let handles = registry.handles();
        assert_eq!(handles, [a, c]);
    }

    #[test]
    fn handles_of_another_registry_are_rejected() {
        let mut first = BufferRegistry::new();
        let mut second = BufferRegistry::new();
        first.register(BufferId(0x111));
        let foreign = second.register(BufferId(0x222));

        assert_eq!(foreign.index(), 0);
        assert_eq!(foreign.generation(), 0);
        assert!(!first.is_alive(foreign), "same slot and generation, other owner");
        assert_eq!(first.get(foreign), Err(RegistryError::StaleHandle(foreign)));
        assert_eq!(first.release(foreign), Err(RegistryError::StaleHandle(foreign)));
        assert_eq!(first.len(), 1);
    }
}
