// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! X11 backend for ferry.
//!
//! This crate hands buffers rendered by the client to an X server with the
//! Present extension and tells producer threads when a buffer is theirs
//! again:
//!
//! - [`Connection`]: DRI3 and Present capability checks, device access and
//!   buffer import/export
//! - [`PresentChannel`]: per-surface presentation with thread-safe waits for
//!   buffer release and drain-before-retarget
//! - [`PresentTransport`]: the seam between channels and the server, with
//!   [`X11Transport`] as the X11 implementation
//!
//! ```text
//!   producer thread                 consumer thread(s)
//!        │                                 │
//!        ▼                                 ▼
//!   PresentChannel::present      PresentChannel::wait_released
//!        │                                 │
//!        ▼                                 ▼
//!   ChannelState::submission     one waiter reads events,
//!   PresentTransport::present    ChannelState::apply, broadcast
//!   ChannelState::commit
//! ```

mod channel;
mod config;
mod connection;
mod dispatch;
mod drain;
mod error;
mod router;
mod scheduler;
mod transport;
mod x11;

#[cfg(test)]
mod fake;

pub use channel::PresentChannel;
pub use config::{ChannelConfig, ConnectOptions, PresentParams};
pub use connection::{Connection, ExportedBuffer};
pub use error::{PresentError, TransportError};
pub use ferry_core::{
    BufferId, ChannelStats, CompleteMode, HandleId, Placement, PresentEvent, PresentInterval,
    PresentOptions, RegionRect, Serial, SubscriptionId, SurfaceId, SwapEffect,
};
pub use transport::{BufferGeometry, PresentRequest, PresentTransport};
pub use x11::X11Transport;
