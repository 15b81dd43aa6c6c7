// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scripted in-process display server for tests.
//!
//! Presentations either complete as soon as they are submitted or wait in
//! flight until the test completes them. Asynchronous presentations always
//! complete at once. A fence notification stands for time passing: every
//! presentation in flight completes before the fence fires.
//!
//! Completion follows the server's buffer rules: a copy completes and idles
//! together; a flip stays on screen and idles when the next presentation on
//! that surface replaces it.

use std::collections::VecDeque;

use ferry_core::{
    BufferId, BufferSize, CompleteMode, Placement, PresentEvent, PresentOptions, Serial,
    SubscriptionId, SurfaceId,
};
use hashbrown::{HashMap, HashSet};
use parking_lot::{Condvar, Mutex};

use crate::error::TransportError;
use crate::transport::{BufferGeometry, PresentRequest, PresentTransport};

/// Protocol error code of a rejected request.
const BAD_MATCH: u8 = 8;

/// When submitted presentations complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Only when the test calls [`FakeServer::complete_next`] or
    /// [`FakeServer::complete_all`], or a fence fires.
    Manual,
    /// At once, as a copy.
    Copy,
    /// At once, as a flip unless the copy option is set.
    Flip,
}

/// A present request as the server saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Presented {
    pub(crate) surface: SurfaceId,
    pub(crate) buffer: BufferId,
    pub(crate) serial: Serial,
    pub(crate) placement: Placement,
    pub(crate) options: PresentOptions,
    pub(crate) target_sequence: u64,
}

#[derive(Debug)]
struct Subscription {
    surface: SurfaceId,
    queue: VecDeque<PresentEvent>,
}

#[derive(Debug)]
struct FakeState {
    completion: Completion,
    next_id: u32,
    sequence: u64,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    fail_subscribe: HashSet<SurfaceId>,
    reject_next: bool,
    closed: bool,
    in_flight: VecDeque<Presented>,
    on_screen: HashMap<SurfaceId, (BufferId, Serial)>,
    geometry: HashMap<BufferId, BufferGeometry>,
    presented: Vec<Presented>,
    notifications: Vec<(SurfaceId, Serial, u64)>,
    copies: Vec<(SurfaceId, BufferId)>,
    freed: Vec<BufferId>,
    blocked_readers: usize,
}

impl FakeState {
    fn deliver(&mut self, surface: SurfaceId, event: PresentEvent) {
        for subscription in self.subscriptions.values_mut() {
            if subscription.surface == surface {
                subscription.queue.push_back(event);
            }
        }
    }

    fn complete(&mut self, presented: Presented) {
        let flip = self.completion == Completion::Flip
            && !presented.options.contains(PresentOptions::COPY);
        self.sequence = self.sequence.max(presented.target_sequence).saturating_add(1);
        let surface = presented.surface;
        let replaced = if flip {
            self.on_screen
                .insert(surface, (presented.buffer, presented.serial))
        } else {
            self.on_screen.remove(&surface)
        };
        self.deliver(
            surface,
            PresentEvent::PixmapComplete {
                serial: presented.serial,
                sequence: self.sequence,
                ust: self.sequence * 16_667,
                mode: if flip {
                    CompleteMode::Flip
                } else {
                    CompleteMode::Copy
                },
            },
        );
        if let Some((buffer, serial)) = replaced {
            self.deliver(surface, PresentEvent::Idle { serial, buffer });
        }
        // A copy of the buffer that was on screen idles once.
        if !flip && replaced != Some((presented.buffer, presented.serial)) {
            self.deliver(
                surface,
                PresentEvent::Idle {
                    serial: presented.serial,
                    buffer: presented.buffer,
                },
            );
        }
    }
}

/// In-process [`PresentTransport`] with scripted completion.
#[derive(Debug)]
pub(crate) struct FakeServer {
    state: Mutex<FakeState>,
    arrived: Condvar,
}

impl FakeServer {
    pub(crate) fn new(completion: Completion) -> Self {
        Self {
            state: Mutex::new(FakeState {
                completion,
                next_id: 0x40_0000,
                sequence: 0,
                subscriptions: HashMap::new(),
                fail_subscribe: HashSet::new(),
                reject_next: false,
                closed: false,
                in_flight: VecDeque::new(),
                on_screen: HashMap::new(),
                geometry: HashMap::new(),
                presented: Vec::new(),
                notifications: Vec::new(),
                copies: Vec::new(),
                freed: Vec::new(),
                blocked_readers: 0,
            }),
            arrived: Condvar::new(),
        }
    }

    pub(crate) fn set_completion(&self, completion: Completion) {
        self.state.lock().completion = completion;
    }

    pub(crate) fn set_geometry(&self, buffer: BufferId, width: u16, height: u16) {
        self.state.lock().geometry.insert(
            buffer,
            BufferGeometry {
                size: BufferSize::new(width, height),
                depth: 24,
            },
        );
    }

    pub(crate) fn fail_subscribe(&self, surface: SurfaceId) {
        self.state.lock().fail_subscribe.insert(surface);
    }

    pub(crate) fn reject_next_present(&self) {
        self.state.lock().reject_next = true;
    }

    /// Completes the oldest presentation in flight.
    pub(crate) fn complete_next(&self) -> bool {
        let mut state = self.state.lock();
        let Some(presented) = state.in_flight.pop_front() else {
            return false;
        };
        state.complete(presented);
        self.arrived.notify_all();
        true
    }

    /// Completes every presentation in flight.
    pub(crate) fn complete_all(&self) {
        while self.complete_next() {}
    }

    /// Delivers an arbitrary event on `surface`.
    pub(crate) fn inject(&self, surface: SurfaceId, event: PresentEvent) {
        self.state.lock().deliver(surface, event);
        self.arrived.notify_all();
    }

    /// Fails every current and future read.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.arrived.notify_all();
    }

    pub(crate) fn presented(&self) -> Vec<Presented> {
        self.state.lock().presented.clone()
    }

    pub(crate) fn notifications(&self) -> Vec<(SurfaceId, Serial, u64)> {
        self.state.lock().notifications.clone()
    }

    pub(crate) fn copies(&self) -> Vec<(SurfaceId, BufferId)> {
        self.state.lock().copies.clone()
    }

    pub(crate) fn freed(&self) -> Vec<BufferId> {
        self.state.lock().freed.clone()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Number of live subscriptions on `surface`.
    pub(crate) fn subscriptions_on(&self, surface: SurfaceId) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.surface == surface)
            .count()
    }

    /// Number of threads blocked in [`PresentTransport::wait_event`].
    pub(crate) fn blocked_readers(&self) -> usize {
        self.state.lock().blocked_readers
    }

    /// Spins until `count` threads are blocked reading events.
    pub(crate) fn await_blocked_readers(&self, count: usize) {
        while self.blocked_readers() < count {
            std::thread::yield_now();
        }
    }

    fn submit(&self, request: &PresentRequest<'_>, checked: bool) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if checked && std::mem::take(&mut state.reject_next) {
            return Err(TransportError::Rejected {
                request: "PresentPixmap",
                code: BAD_MATCH,
            });
        }
        let presented = Presented {
            surface: request.surface,
            buffer: request.buffer,
            serial: request.serial,
            placement: request.placement.clone(),
            options: request.options,
            target_sequence: request.target_sequence,
        };
        state.presented.push(presented.clone());
        if state.completion == Completion::Manual && !request.options.contains(PresentOptions::ASYNC)
        {
            state.in_flight.push_back(presented);
        } else {
            state.complete(presented);
            self.arrived.notify_all();
        }
        Ok(())
    }
}

impl PresentTransport for FakeServer {
    fn subscribe(&self, surface: SurfaceId) -> Result<SubscriptionId, TransportError> {
        let mut state = self.state.lock();
        if state.fail_subscribe.contains(&surface) {
            return Err(TransportError::Rejected {
                request: "PresentSelectInput",
                code: BAD_MATCH,
            });
        }
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscriptions.insert(
            id,
            Subscription {
                surface,
                queue: VecDeque::new(),
            },
        );
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError> {
        let removed = self.state.lock().subscriptions.remove(&subscription);
        self.arrived.notify_all();
        removed.map(drop).ok_or(TransportError::Closed)
    }

    fn buffer_geometry(&self, buffer: BufferId) -> Result<BufferGeometry, TransportError> {
        Ok(self
            .state
            .lock()
            .geometry
            .get(&buffer)
            .copied()
            .unwrap_or(BufferGeometry {
                size: BufferSize::new(64, 64),
                depth: 24,
            }))
    }

    fn present(&self, request: &PresentRequest<'_>) -> Result<(), TransportError> {
        self.submit(request, true)
    }

    fn present_unchecked(&self, request: &PresentRequest<'_>) -> Result<(), TransportError> {
        self.submit(request, false)
    }

    fn notify_sequence(
        &self,
        surface: SurfaceId,
        serial: Serial,
        target: u64,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.notifications.push((surface, serial, target));
        if !serial.is_wake() {
            while let Some(presented) = state.in_flight.pop_front() {
                state.complete(presented);
            }
            state.sequence = state.sequence.max(target);
        }
        let sequence = state.sequence;
        state.deliver(surface, PresentEvent::SequenceComplete { serial, sequence });
        self.arrived.notify_all();
        Ok(())
    }

    fn poll_event(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Option<PresentEvent>, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let subscription = state
            .subscriptions
            .get_mut(&subscription)
            .ok_or(TransportError::Closed)?;
        Ok(subscription.queue.pop_front())
    }

    fn wait_event(&self, subscription: SubscriptionId) -> Result<PresentEvent, TransportError> {
        let mut state = self.state.lock();
        state.blocked_readers += 1;
        let result = loop {
            if state.closed {
                break Err(TransportError::Closed);
            }
            let Some(queue) = state.subscriptions.get_mut(&subscription) else {
                break Err(TransportError::Closed);
            };
            if let Some(event) = queue.queue.pop_front() {
                break Ok(event);
            }
            self.arrived.wait(&mut state);
        };
        state.blocked_readers -= 1;
        result
    }

    fn copy_surface_to_buffer(
        &self,
        surface: SurfaceId,
        buffer: BufferId,
    ) -> Result<(), TransportError> {
        self.state.lock().copies.push((surface, buffer));
        Ok(())
    }

    fn free_buffer(&self, buffer: BufferId) -> Result<(), TransportError> {
        self.state.lock().freed.push(buffer);
        Ok(())
    }
}

/// Routes engine logs to the test output; filter with `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Surface most tests present to.
pub(crate) const SURFACE: SurfaceId = SurfaceId(0x20_0001);

/// A server in the given mode and a channel attached to [`SURFACE`].
pub(crate) fn attached_channel(
    completion: Completion,
) -> (std::sync::Arc<FakeServer>, crate::PresentChannel<FakeServer>) {
    init_tracing();
    let server = std::sync::Arc::new(FakeServer::new(completion));
    let channel = crate::PresentChannel::create(
        std::sync::Arc::clone(&server),
        SURFACE,
        crate::ChannelConfig::default(),
    )
    .unwrap();
    (server, channel)
}
