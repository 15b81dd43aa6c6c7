// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Quiescence: proving no notification can still arrive for a channel.
//!
//! A drain runs inside an exclusive operation, so the draining thread is the
//! only one that reads events once any previous waiter has been evicted.
//!
//! 1. If a waiter was blocked, wake it and wait for it to return. It may
//!    have consumed events this thread never saw, so queued events are
//!    handled and a sequence fence is requested a few ticks past the latest
//!    target. Its arrival proves every earlier presentation has completed.
//! 2. Wait until no presentation is pending, then handle trailing idle
//!    notices.
//! 3. Buffers still not released are on screen after a flip (or their idle
//!    notice went to the evicted waiter). Each is presented once more as an
//!    asynchronous copy of a tiny area, which makes the server let go of it.
//!    Any other unreleased buffer is a consistency fault.

use ferry_core::{HandleId, Placement, PresentOptions, ProtocolViolation, Serial};
use tracing::{debug, error};

use crate::channel::{Guard, Shared};
use crate::error::PresentError;
use crate::transport::{PresentRequest, PresentTransport};

impl<T: PresentTransport> Shared<T> {
    /// Waits until every registered buffer is free and nothing is in flight.
    pub(crate) fn drain(&self, guard: &mut Guard<'_>) -> Result<(), PresentError> {
        let Some(surface) = guard.channel.target() else {
            return Ok(());
        };
        let evicted = guard.waiter_active;
        debug!(
            ?surface,
            pending = guard.channel.pending(),
            evicted,
            "draining"
        );

        if evicted {
            self.evict_waiter(guard)?;
            self.pump(guard, true)?;
            let target = guard.channel.arm_fence(self.config.fence_lookahead);
            debug!(?surface, target, "requesting drain fence");
            self.transport
                .notify_sequence(surface, Serial::FENCE, target)?;
            while guard.channel.fence_pending() {
                self.wait_one(guard)?;
            }
        }
        while guard.channel.pending() > 0 {
            self.wait_one(guard)?;
        }
        self.pump(guard, true)?;

        for handle in guard.channel.unreleased() {
            self.force_release(guard, handle, evicted)?;
        }
        debug!(?surface, "drained");
        Ok(())
    }

    fn force_release(
        &self,
        guard: &mut Guard<'_>,
        handle: HandleId,
        evicted: bool,
    ) -> Result<(), PresentError> {
        let record = *guard.channel.registry().get(handle)?;
        if !record.last_transfer_was_flip() && !evicted {
            let violation = ProtocolViolation::UnreleasedAfterDrain {
                buffer: record.buffer(),
                serial: record.serial(),
            };
            error!(%violation, ?handle, "buffer not released for no reason");
            return Err(violation.into());
        }
        let surface = guard.channel.target().ok_or(PresentError::Detached)?;
        let area = self.config.force_release_area;
        let placement = Placement::Partial {
            x_off: 0,
            y_off: 0,
            valid: area,
            update: vec![area],
        };
        let request = PresentRequest {
            surface,
            buffer: record.buffer(),
            serial: record.serial(),
            placement: &placement,
            options: PresentOptions::COPY | PresentOptions::ASYNC,
            target_sequence: 0,
        };
        debug!(buffer = ?record.buffer(), ?handle, "forcing release");
        self.transport.present_unchecked(&request)?;
        guard.channel.commit_forced_copy(handle)?;
        while !guard.channel.registry().get(handle)?.is_free() {
            self.wait_one(guard)?;
        }
        Ok(())
    }
}
