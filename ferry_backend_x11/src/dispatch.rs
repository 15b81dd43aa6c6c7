// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event dispatch and the waiter handoff.

use ferry_core::{Applied, HandleId, PresentEvent, Serial};
use parking_lot::MutexGuard;
use tracing::{debug, error, trace};

use crate::channel::{Guard, Inner, Shared};
use crate::error::PresentError;
use crate::transport::PresentTransport;

impl<T: PresentTransport> Shared<T> {
    /// Applies one event, logging consistency faults.
    fn handle(&self, inner: &mut Inner, event: PresentEvent) -> Result<Applied, PresentError> {
        match inner.channel.apply(event) {
            Ok(applied) => {
                trace!(?event, ?applied, pending = inner.channel.pending(), "handled event");
                Ok(applied)
            }
            Err(violation) => {
                error!(
                    ?event,
                    %violation,
                    target = ?inner.channel.target(),
                    pending = inner.channel.pending(),
                    buffers = inner.channel.registry().len(),
                    "event does not match channel state"
                );
                Err(violation.into())
            }
        }
    }

    /// Handles every queued event without blocking.
    ///
    /// Skipped while another thread is the waiter unless `assert_safe` is
    /// set, so queued events are not taken from under it.
    pub(crate) fn pump(&self, guard: &mut Guard<'_>, assert_safe: bool) -> Result<(), PresentError> {
        if guard.waiter_active && !assert_safe {
            return Ok(());
        }
        let Some(subscription) = guard.channel.subscription() else {
            return Ok(());
        };
        let mut handled = false;
        let result = loop {
            match self.transport.poll_event(subscription) {
                Ok(Some(event)) => {
                    if let Err(err) = self.handle(guard, event) {
                        break Err(err);
                    }
                    handled = true;
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err.into()),
            }
        };
        if handled {
            self.handoff.notify_all();
        }
        result
    }

    /// Blocks for one event as the waiter and handles it.
    ///
    /// The caller must have checked that nobody else is the waiter.
    pub(crate) fn wait_one(&self, guard: &mut Guard<'_>) -> Result<Applied, PresentError> {
        let subscription = guard
            .channel
            .subscription()
            .ok_or(PresentError::Detached)?;
        guard.waiter_active = true;
        let received = MutexGuard::unlocked(guard, || self.transport.wait_event(subscription));
        guard.waiter_active = false;
        let result = match received {
            Ok(event) => self.handle(guard, event),
            Err(err) => Err(err.into()),
        };
        self.handoff.notify_all();
        result
    }

    /// Forces the current waiter out of the transport and waits until it
    /// has returned.
    pub(crate) fn evict_waiter(&self, guard: &mut Guard<'_>) -> Result<(), PresentError> {
        if !guard.waiter_active {
            return Ok(());
        }
        let Some(surface) = guard.channel.target() else {
            return Ok(());
        };
        debug!(?surface, "waking blocked waiter");
        guard.handoff_requests += 1;
        let sent = self.transport.notify_sequence(surface, Serial::WAKE, 0);
        if sent.is_ok() {
            while guard.waiter_active {
                self.handoff.wait(guard);
            }
        }
        guard.handoff_requests -= 1;
        self.handoff.notify_all();
        sent.map_err(Into::into)
    }

    /// Blocks until `handle` is free.
    pub(crate) fn wait_released(
        &self,
        guard: &mut Guard<'_>,
        handle: HandleId,
    ) -> Result<(), PresentError> {
        self.pump(guard, false)?;
        loop {
            if guard.channel.registry().get(handle)?.is_free() {
                return Ok(());
            }
            if guard.waiter_active || guard.handoff_requests > 0 || guard.exclusive {
                // Someone else owns the event stream and broadcasts after
                // every event it handles.
                self.handoff.wait_for(guard, self.config.handoff_retry);
                continue;
            }
            self.wait_one(guard)?;
        }
    }
}
