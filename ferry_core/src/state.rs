// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-channel presentation state machine.
//!
//! [`ChannelState`] owns everything a channel knows about its destination
//! surface and its buffers. It performs no I/O: transports feed it events
//! through [`apply`](ChannelState::apply), and the scheduler asks it for
//! [`Submission`]s and commits them once the server accepted the request.
//!
//! # Buffer lifecycle
//!
//! ```text
//!            submit + commit
//!   free ─────────────────────► pending (released = false,
//!    ▲                            │      completion_pending = true)
//!    │ idle notice                │ completion notice
//!    │                            ▼
//!    └─────────────────────── presented (released = false,
//!                                        completion_pending = false)
//! ```
//!
//! The pending count always equals the number of registered buffers with a
//! completion pending.

use alloc::vec::Vec;

use crate::error::{ProtocolViolation, SubmitRefusal};
use crate::event::{CompleteMode, PresentEvent};
use crate::id::{BufferId, HandleId, Serial, SubscriptionId, SurfaceId};
use crate::pacing::{PresentInterval, target_sequence};
use crate::registry::BufferRegistry;

/// What applying an event changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Applied {
    /// A presentation completed.
    Completed {
        /// The presented buffer.
        handle: HandleId,
        /// How it reached the surface.
        mode: CompleteMode,
    },
    /// A buffer became idle.
    Released {
        /// The released buffer.
        handle: HandleId,
    },
    /// A drain fence arrived.
    Fence,
    /// A wake-up notification arrived; nothing changed.
    Wake,
}

/// A checked, not yet committed present of one buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Submission {
    /// The buffer's handle.
    pub handle: HandleId,
    /// The buffer.
    pub buffer: BufferId,
    /// Serial to tag the request with.
    pub serial: Serial,
    /// Sequence count the presentation should take effect at.
    pub target_sequence: u64,
}

/// Point-in-time view of a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChannelStats {
    /// Current destination surface, if attached.
    pub target: Option<SurfaceId>,
    /// Sequence count of the latest completion.
    pub last_sequence: u64,
    /// Sequence count targeted by the latest submission.
    pub last_target: u64,
    /// Presentations awaiting completion.
    pub pending: u32,
    /// Registered buffers.
    pub buffers: usize,
    /// Server timestamp of the latest completion, in microseconds.
    pub last_ust: u64,
}

/// Synchronization state of one presentation channel.
#[derive(Debug, Default)]
pub struct ChannelState {
    target: Option<SurfaceId>,
    subscription: Option<SubscriptionId>,
    last_sequence: u64,
    last_target: u64,
    last_ust: u64,
    pending: u32,
    fence_pending: bool,
    registry: BufferRegistry,
}

impl ChannelState {
    /// Creates a detached channel with no buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The surface the channel presents to, if attached.
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<SurfaceId> {
        self.target
    }

    /// The active event subscription. Present exactly when attached.
    #[inline]
    #[must_use]
    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    /// Sequence count of the latest completion.
    #[inline]
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Sequence count targeted by the latest submission.
    #[inline]
    #[must_use]
    pub fn last_target(&self) -> u64 {
        self.last_target
    }

    /// Presentations awaiting their completion notice.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Whether a drain fence was submitted and has not arrived yet.
    #[inline]
    #[must_use]
    pub fn fence_pending(&self) -> bool {
        self.fence_pending
    }

    /// The channel's buffers.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    /// Mutable access to the channel's buffers.
    #[inline]
    pub fn registry_mut(&mut self) -> &mut BufferRegistry {
        &mut self.registry
    }

    /// Records a successful subscription to `surface`.
    pub fn attach(&mut self, surface: SurfaceId, subscription: SubscriptionId) {
        self.target = Some(surface);
        self.subscription = Some(subscription);
    }

    /// Forgets the current target and returns the subscription to cancel.
    ///
    /// Sequence counters restart: they are per-surface.
    pub fn detach(&mut self) -> Option<SubscriptionId> {
        self.target = None;
        self.last_sequence = 0;
        self.last_target = 0;
        self.fence_pending = false;
        self.subscription.take()
    }

    /// Applies one inbound event.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] when the event cannot correspond to any
    /// request this channel made. State is left untouched in that case.
    pub fn apply(&mut self, event: PresentEvent) -> Result<Applied, ProtocolViolation> {
        match event {
            PresentEvent::SequenceComplete { serial, .. } => {
                if serial.is_wake() {
                    Ok(Applied::Wake)
                } else {
                    self.fence_pending = false;
                    Ok(Applied::Fence)
                }
            }
            PresentEvent::PixmapComplete {
                serial,
                sequence,
                ust,
                mode,
            } => {
                let handle = self
                    .registry
                    .find_by_serial(serial)
                    .ok_or(ProtocolViolation::UnknownSerial(serial))?;
                let record = self
                    .registry
                    .by_serial_mut(serial)
                    .ok_or(ProtocolViolation::UnknownSerial(serial))?;
                if !record.completion_pending || self.pending == 0 {
                    return Err(ProtocolViolation::UnexpectedCompletion(serial));
                }
                record.completion_pending = false;
                record.last_was_flip = mode.is_flip();
                self.pending -= 1;
                self.last_sequence = sequence;
                self.last_ust = ust;
                Ok(Applied::Completed { handle, mode })
            }
            PresentEvent::Idle { serial, buffer } => {
                let handle = self
                    .registry
                    .find_by_serial(serial)
                    .ok_or(ProtocolViolation::UnknownSerial(serial))?;
                let record = self
                    .registry
                    .by_serial_mut(serial)
                    .ok_or(ProtocolViolation::UnknownSerial(serial))?;
                if record.buffer != buffer {
                    return Err(ProtocolViolation::IdleBufferMismatch {
                        serial,
                        reported: buffer,
                        expected: record.buffer,
                    });
                }
                record.released = true;
                Ok(Applied::Released { handle })
            }
        }
    }

    /// Checks that `handle` may be presented and computes its target.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitRefusal::Registry`] for a stale handle and
    /// [`SubmitRefusal::Protocol`] when the buffer is still owned by the
    /// server.
    pub fn submission(
        &self,
        handle: HandleId,
        interval: PresentInterval,
    ) -> Result<Submission, SubmitRefusal> {
        let record = self.registry.get(handle)?;
        if !record.is_free() {
            return Err(ProtocolViolation::BufferBusy {
                buffer: record.buffer,
                serial: record.serial,
            }
            .into());
        }
        Ok(Submission {
            handle,
            buffer: record.buffer,
            serial: record.serial,
            target_sequence: target_sequence(self.last_sequence, interval, self.pending),
        })
    }

    /// Marks an accepted submission as in flight.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitRefusal::Registry`] if the handle went stale in the
    /// meantime.
    pub fn commit(&mut self, submission: &Submission) -> Result<(), SubmitRefusal> {
        self.mark_in_flight(submission.handle)?;
        self.last_target = submission.target_sequence;
        Ok(())
    }

    /// Marks a fire-and-forget copy of `handle` as in flight.
    ///
    /// Used to pry a flipped buffer off the screen. The sequence target is not
    /// recorded: the request is asynchronous and targets nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitRefusal::Registry`] for a stale handle.
    pub fn commit_forced_copy(&mut self, handle: HandleId) -> Result<(), SubmitRefusal> {
        self.mark_in_flight(handle)
    }

    fn mark_in_flight(&mut self, handle: HandleId) -> Result<(), SubmitRefusal> {
        let record = self.registry.get_mut(handle)?;
        record.completion_pending = true;
        record.released = false;
        self.pending += 1;
        Ok(())
    }

    /// Arms a drain fence and returns the sequence it must target.
    ///
    /// The fence fires `lookahead` ticks after the latest submission's
    /// target, so its arrival proves every earlier submission has completed.
    pub fn arm_fence(&mut self, lookahead: u64) -> u64 {
        self.fence_pending = true;
        self.last_target.saturating_add(lookahead)
    }

    /// Hands every buffer back to the client after a failed drain.
    ///
    /// Once the subscription is gone no notice can arrive for buffers still
    /// in flight, so their completion and release are assumed. Returns the
    /// handles that were not free.
    pub fn forget_in_flight(&mut self) -> Vec<HandleId> {
        let forgotten = self.unreleased_or_pending();
        for &handle in &forgotten {
            if let Ok(record) = self.registry.get_mut(handle) {
                record.completion_pending = false;
                record.released = true;
            }
        }
        self.pending = 0;
        self.fence_pending = false;
        forgotten
    }

    fn unreleased_or_pending(&self) -> Vec<HandleId> {
        self.registry
            .iter()
            .filter(|(_, record)| !record.is_free())
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Buffers the server has not released yet.
    #[must_use]
    pub fn unreleased(&self) -> Vec<HandleId> {
        self.registry
            .iter()
            .filter(|(_, record)| !record.released)
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Returns a snapshot of the channel's counters.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            target: self.target,
            last_sequence: self.last_sequence,
            last_target: self.last_target,
            pending: self.pending,
            buffers: self.registry.len(),
            last_ust: self.last_ust,
        }
    }
}
