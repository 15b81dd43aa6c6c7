// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The display-server seam of a presentation channel.
//!
//! A [`PresentChannel`](crate::PresentChannel) never talks to the server
//! directly. Everything it sends and receives goes through a
//! [`PresentTransport`], which [`X11Transport`](crate::X11Transport)
//! implements over a shared X11 connection.
//!
//! # Event stream contract
//!
//! Events are delivered per subscription. For a given subscription:
//!
//! - [`poll_event`](PresentTransport::poll_event) returns an already queued
//!   event or `None`, and never blocks.
//! - [`wait_event`](PresentTransport::wait_event) blocks until one event
//!   arrives. The channel guarantees that at most one thread per
//!   subscription is inside `wait_event` at a time.
//! - A sequence notification requested with
//!   [`notify_sequence`](PresentTransport::notify_sequence) is delivered on
//!   every subscription of its surface; a target in the past fires at once.

use ferry_core::{
    BufferId, BufferSize, Placement, PresentEvent, PresentOptions, Serial, SubscriptionId,
    SurfaceId,
};

use crate::error::TransportError;

/// Size and depth of a server-side buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferGeometry {
    /// Pixel dimensions.
    pub size: BufferSize,
    /// Bits per pixel of color depth.
    pub depth: u8,
}

/// One present request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresentRequest<'a> {
    /// Destination surface.
    pub surface: SurfaceId,
    /// Buffer to show.
    pub buffer: BufferId,
    /// Serial echoed by the completion and idle notices.
    pub serial: Serial,
    /// Offset and regions.
    pub placement: &'a Placement,
    /// Option bits.
    pub options: PresentOptions,
    /// Sequence count at which the presentation takes effect.
    pub target_sequence: u64,
}

/// Requests and notifications a presentation channel needs from the server.
pub trait PresentTransport: Send + Sync {
    /// Starts delivering completion and idle notices of `surface`.
    fn subscribe(&self, surface: SurfaceId) -> Result<SubscriptionId, TransportError>;

    /// Stops a subscription. Queued and future events for it are dropped.
    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError>;

    /// Queries the size and depth of a buffer.
    fn buffer_geometry(&self, buffer: BufferId) -> Result<BufferGeometry, TransportError>;

    /// Submits a present request and waits for the server to accept it.
    ///
    /// Returns [`TransportError::Rejected`] when the server refuses it.
    fn present(&self, request: &PresentRequest<'_>) -> Result<(), TransportError>;

    /// Submits a present request without waiting for acceptance.
    fn present_unchecked(&self, request: &PresentRequest<'_>) -> Result<(), TransportError>;

    /// Requests a sequence notification tagged `serial` at `target`.
    fn notify_sequence(
        &self,
        surface: SurfaceId,
        serial: Serial,
        target: u64,
    ) -> Result<(), TransportError>;

    /// Returns a queued event of `subscription` without blocking.
    fn poll_event(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Option<PresentEvent>, TransportError>;

    /// Blocks until an event of `subscription` arrives.
    fn wait_event(&self, subscription: SubscriptionId) -> Result<PresentEvent, TransportError>;

    /// Copies the visible content of `surface` into `buffer`.
    fn copy_surface_to_buffer(
        &self,
        surface: SurfaceId,
        buffer: BufferId,
    ) -> Result<(), TransportError>;

    /// Destroys a server-side buffer.
    fn free_buffer(&self, buffer: BufferId) -> Result<(), TransportError>;
}
