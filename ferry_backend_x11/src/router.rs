// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-subscription routing of a shared event stream.
//!
//! An X11 connection delivers the events of every subscription on one queue.
//! [`Router`] splits that stream by subscription id with a leader/follower
//! scheme:
//!
//! ```text
//!   wait(eid) ──► own queue non-empty? ──yes──► pop
//!                      │ no
//!                      ▼
//!               someone reading? ──yes──► sleep on `readable`, retry
//!                      │ no
//!                      ▼
//!               become reader, read one event unlocked,
//!               route it, wake everyone, retry
//! ```
//!
//! Non-blocking polls only read from the socket while nobody is blocked in
//! a read, so a poll never takes the socket away from a waiter.

use std::collections::VecDeque;

use ferry_core::{PresentEvent, SurfaceId};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::trace;

use crate::error::TransportError;

/// One event read from the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Routed {
    /// A presentation event for subscription `eid`.
    Present {
        /// Subscription the event was selected with.
        eid: u32,
        /// The decoded event.
        event: PresentEvent,
    },
    /// Anything else; dropped.
    Other,
}

/// Raw access to the shared event queue.
pub(crate) trait EventSource {
    /// Returns the next event already received, without blocking.
    fn poll(&self) -> Result<Option<Routed>, TransportError>;

    /// Blocks until the next event arrives.
    fn wait(&self) -> Result<Routed, TransportError>;
}

#[derive(Debug)]
struct Route {
    surface: SurfaceId,
    queue: VecDeque<PresentEvent>,
}

#[derive(Debug, Default)]
struct RouterState {
    routes: HashMap<u32, Route>,
    reading: bool,
}

impl RouterState {
    fn route(&mut self, routed: Routed) {
        match routed {
            Routed::Present { eid, event } => match self.routes.get_mut(&eid) {
                Some(route) => route.queue.push_back(event),
                None => trace!(eid, ?event, "dropping event of closed subscription"),
            },
            Routed::Other => trace!("dropping unrelated event"),
        }
    }
}

/// Demultiplexes a shared event stream into per-subscription queues.
#[derive(Debug, Default)]
pub(crate) struct Router {
    state: Mutex<RouterState>,
    readable: Condvar,
}

impl Router {
    /// Opens a queue for subscription `eid` on `surface`.
    pub(crate) fn add(&self, eid: u32, surface: SurfaceId) {
        self.state.lock().routes.insert(
            eid,
            Route {
                surface,
                queue: VecDeque::new(),
            },
        );
    }

    /// Closes the queue of `eid`, dropping whatever it still holds.
    ///
    /// Returns the surface the subscription was on.
    pub(crate) fn remove(&self, eid: u32) -> Option<SurfaceId> {
        let route = self.state.lock().routes.remove(&eid)?;
        if !route.queue.is_empty() {
            trace!(eid, dropped = route.queue.len(), "closing non-empty subscription");
        }
        // Waiters of `eid` must see the queue is gone.
        self.readable.notify_all();
        Some(route.surface)
    }

    /// Returns a queued event of `eid`, reading from `source` only when no
    /// other thread is blocked on it.
    pub(crate) fn poll(
        &self,
        eid: u32,
        source: &impl EventSource,
    ) -> Result<Option<PresentEvent>, TransportError> {
        let mut state = self.state.lock();
        if !state.reading {
            let mut routed_any = false;
            while let Some(routed) = source.poll()? {
                state.route(routed);
                routed_any = true;
            }
            if routed_any {
                self.readable.notify_all();
            }
        }
        let route = state.routes.get_mut(&eid).ok_or(TransportError::Closed)?;
        Ok(route.queue.pop_front())
    }

    /// Blocks until an event of `eid` is available.
    pub(crate) fn wait(
        &self,
        eid: u32,
        source: &impl EventSource,
    ) -> Result<PresentEvent, TransportError> {
        let mut state = self.state.lock();
        loop {
            let route = state.routes.get_mut(&eid).ok_or(TransportError::Closed)?;
            if let Some(event) = route.queue.pop_front() {
                return Ok(event);
            }
            if state.reading {
                self.readable.wait(&mut state);
                continue;
            }
            state.reading = true;
            let read = MutexGuard::unlocked(&mut state, || source.wait());
            state.reading = false;
            self.readable.notify_all();
            state.route(read?);
        }
    }
}
