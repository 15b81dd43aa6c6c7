// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Thread-safe presentation channels.
//!
//! A [`PresentChannel`] presents registered buffers to one surface at a time
//! and tells producers when a buffer is theirs again. It is cheap to clone;
//! clones share the same channel.
//!
//! # Locking
//!
//! Channel state sits behind one mutex that is never held across a blocking
//! event wait. At most one thread reads the event stream at a time (the
//! *waiter*). Everyone else sleeps on the `handoff` condition variable, which
//! is broadcast after every handled event and whenever the waiter steps
//! aside:
//!
//! ```text
//!   wait_released ─► own buffer free? ──yes──► return
//!                        │ no
//!                        ▼
//!                 waiter active, handoff requested or draining?
//!                        │ yes                      │ no
//!                        ▼                          ▼
//!           sleep on handoff (bounded)     become waiter, read one event
//!                                          unlocked, apply it, broadcast
//! ```
//!
//! A thread that needs the waiter out of the transport (a present or a
//! drain) requests a sequence notification that fires at once and sleeps on
//! `handoff` until the waiter has returned.
//!
//! Attach, detach and destroy run *exclusively*: while one runs, every other
//! operation waits at entry and no new waiter starts, so the drain owns the
//! event stream.

use std::fmt;
use std::sync::Arc;

use ferry_core::{BufferId, ChannelState, ChannelStats, HandleId, SurfaceId};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::config::{ChannelConfig, PresentParams};
use crate::error::PresentError;
use crate::transport::PresentTransport;

/// Channel state plus the handoff bookkeeping guarded with it.
#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) channel: ChannelState,
    /// A thread is blocked reading the event stream.
    pub(crate) waiter_active: bool,
    /// Threads waiting for the waiter to step aside.
    pub(crate) handoff_requests: u32,
    /// An exclusive operation is running.
    pub(crate) exclusive: bool,
}

pub(crate) struct Shared<T> {
    pub(crate) transport: Arc<T>,
    pub(crate) config: ChannelConfig,
    pub(crate) state: Mutex<Inner>,
    pub(crate) handoff: Condvar,
}

pub(crate) type Guard<'a> = MutexGuard<'a, Inner>;

impl<T: PresentTransport> Shared<T> {
    /// Waits until no exclusive operation runs.
    pub(crate) fn settle(&self, guard: &mut Guard<'_>) {
        while guard.exclusive {
            self.handoff.wait(guard);
        }
    }

    /// Runs `op` with the channel to itself.
    pub(crate) fn exclusive<R>(
        &self,
        op: impl FnOnce(&mut Guard<'_>) -> Result<R, PresentError>,
    ) -> Result<R, PresentError> {
        let mut guard = self.state.lock();
        self.settle(&mut guard);
        guard.exclusive = true;
        let result = op(&mut guard);
        guard.exclusive = false;
        self.handoff.notify_all();
        result
    }

    /// Drains the current target and switches to `surface`.
    ///
    /// The old subscription is cancelled even when the drain fails. The
    /// channel then stays detached and reports the drain error.
    pub(crate) fn retarget(
        &self,
        guard: &mut Guard<'_>,
        surface: Option<SurfaceId>,
    ) -> Result<(), PresentError> {
        let current = guard.channel.target();
        if current == surface {
            return Ok(());
        }
        let drained = self.drain(guard);
        if let Err(err) = &drained {
            let forgotten = guard.channel.forget_in_flight();
            error!(surface = ?current, %err, ?forgotten, "drain failed; detaching anyway");
        }
        let unsubscribed = match guard.channel.detach() {
            Some(subscription) => {
                debug!(surface = ?current, "detaching");
                self.transport.unsubscribe(subscription)
            }
            None => Ok(()),
        };
        drained?;
        unsubscribed?;
        let Some(surface) = surface else {
            return Ok(());
        };
        match self.transport.subscribe(surface) {
            Ok(subscription) => {
                guard.channel.attach(surface, subscription);
                debug!(?surface, ?subscription, "attached");
                Ok(())
            }
            Err(source) => {
                warn!(?surface, %source, "failed to subscribe; channel is detached");
                Err(PresentError::AttachFailed { surface, source })
            }
        }
    }
}

/// A presentation channel to one surface at a time.
pub struct PresentChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PresentChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for PresentChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PresentChannel");
        match self.shared.state.try_lock() {
            Some(inner) => s
                .field("target", &inner.channel.target())
                .field("pending", &inner.channel.pending())
                .field("buffers", &inner.channel.registry().len())
                .field("waiter_active", &inner.waiter_active),
            None => s.field("state", &format_args!("<locked>")),
        };
        s.field("config", &self.shared.config).finish_non_exhaustive()
    }
}

impl<T: PresentTransport> PresentChannel<T> {
    /// Creates a detached channel.
    #[must_use]
    pub fn new(transport: Arc<T>, config: ChannelConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                state: Mutex::new(Inner::default()),
                handoff: Condvar::new(),
            }),
        }
    }

    /// Creates a channel attached to `surface`.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError::AttachFailed`] when the surface's events
    /// cannot be subscribed to.
    pub fn create(
        transport: Arc<T>,
        surface: SurfaceId,
        config: ChannelConfig,
    ) -> Result<Self, PresentError> {
        let channel = Self::new(transport, config);
        channel.attach(surface)?;
        Ok(channel)
    }

    /// The transport this channel presents through.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.shared.transport
    }

    /// Points the channel at `surface`.
    ///
    /// Does nothing if the channel already targets `surface`. Otherwise
    /// blocks until nothing is in flight against the current target, then
    /// moves the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError::AttachFailed`] when subscribing fails; the
    /// channel is then detached. Drain failures are returned as is.
    pub fn attach(&self, surface: SurfaceId) -> Result<(), PresentError> {
        self.shared
            .exclusive(|guard| self.shared.retarget(guard, Some(surface)))
    }

    /// Drains the current target and detaches.
    ///
    /// # Errors
    ///
    /// Returns drain and unsubscribe failures.
    pub fn detach(&self) -> Result<(), PresentError> {
        self.shared.exclusive(|guard| self.shared.retarget(guard, None))
    }

    /// Registers a server-side buffer with the channel.
    ///
    /// The channel takes ownership of the buffer: releasing the handle or
    /// destroying the channel frees it on the server.
    pub fn register_buffer(&self, buffer: BufferId) -> HandleId {
        let mut guard = self.shared.state.lock();
        self.shared.settle(&mut guard);
        let handle = guard.channel.registry_mut().register(buffer);
        debug!(?buffer, ?handle, "registered buffer");
        handle
    }

    /// Presents a buffer.
    ///
    /// When [`PresentParams::surface`] names a surface other than the
    /// current target, the channel is first retargeted as by
    /// [`attach`](Self::attach). Returns once the request is accepted; never
    /// waits for the presentation itself.
    ///
    /// # Errors
    ///
    /// - [`PresentError::Detached`] without a target.
    /// - Retargeting failures, as for [`attach`](Self::attach).
    /// - [`PresentError::ProtocolViolation`] when the buffer is still owned
    ///   by the server.
    /// - [`PresentError::SubmissionRejected`] when the server refuses the
    ///   request. The buffer's state is unchanged.
    pub fn present(&self, handle: HandleId, params: &PresentParams) -> Result<(), PresentError> {
        loop {
            let mut guard = self.shared.state.lock();
            self.shared.settle(&mut guard);
            match params.surface {
                Some(surface) if guard.channel.target() != Some(surface) => {
                    drop(guard);
                    self.attach(surface)?;
                }
                _ => return self.shared.submit(&mut guard, handle, params),
            }
        }
    }

    /// Blocks until the server no longer uses the buffer.
    ///
    /// Any number of threads may wait on the same channel.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError::StaleHandle`] for unknown handles and fatal
    /// transport or consistency failures.
    pub fn wait_released(&self, handle: HandleId) -> Result<(), PresentError> {
        let mut guard = self.shared.state.lock();
        self.shared.wait_released(&mut guard, handle)
    }

    /// Returns whether the buffer is free, after handling queued events.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError::StaleHandle`] for unknown handles and fatal
    /// consistency failures.
    pub fn is_released(&self, handle: HandleId) -> Result<bool, PresentError> {
        let mut guard = self.shared.state.lock();
        self.shared.pump(&mut guard, false)?;
        Ok(guard.channel.registry().get(handle)?.is_free())
    }

    /// Unregisters a free buffer and destroys it on the server.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError::Busy`] while the server still uses the buffer
    /// (it stays registered) and [`PresentError::StaleHandle`] for unknown
    /// handles.
    pub fn release_buffer(&self, handle: HandleId) -> Result<(), PresentError> {
        let mut guard = self.shared.state.lock();
        self.shared.settle(&mut guard);
        self.shared.pump(&mut guard, false)?;
        let record = guard.channel.registry_mut().release(handle)?;
        debug!(buffer = ?record.buffer(), ?handle, "released buffer");
        self.shared.transport.free_buffer(record.buffer())?;
        Ok(())
    }

    /// Copies what the target currently shows into a free buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError::Detached`] without a target,
    /// [`PresentError::Busy`] while the buffer is in use and transport
    /// failures of the copy.
    pub fn copy_front(&self, handle: HandleId) -> Result<(), PresentError> {
        let mut guard = self.shared.state.lock();
        self.shared.settle(&mut guard);
        self.shared.pump(&mut guard, false)?;
        let surface = guard.channel.target().ok_or(PresentError::Detached)?;
        let record = guard.channel.registry().get(handle)?;
        if !record.is_free() {
            return Err(PresentError::Busy(record.buffer()));
        }
        self.shared
            .transport
            .copy_surface_to_buffer(surface, record.buffer())?;
        Ok(())
    }

    /// Returns a snapshot of the channel's counters.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.shared.state.lock().channel.stats()
    }

    /// Drains, detaches and frees every registered buffer.
    ///
    /// Other clones of the channel remain usable but empty and detached.
    ///
    /// # Errors
    ///
    /// Returns the first failure among draining, unsubscribing and freeing.
    /// Buffers are unregistered and freed on the server in every case.
    pub fn destroy(self) -> Result<(), PresentError> {
        let shared = &*self.shared;
        shared.exclusive(|guard| {
            let mut first_error = shared.retarget(guard, None).err();
            for record in guard.channel.registry_mut().clear() {
                if let Err(err) = shared.transport.free_buffer(record.buffer()) {
                    warn!(buffer = ?record.buffer(), %err, "failed to free buffer");
                    first_error.get_or_insert(err.into());
                }
            }
            debug!("channel destroyed");
            first_error.map_or(Ok(()), Err)
        })
    }
}
