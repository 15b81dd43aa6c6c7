// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Buffer registry and presentation state machine for asynchronous buffer
//! hand-off.
//!
//! `ferry_core` holds the transport-agnostic half of a presentation engine:
//! a client renders into shared buffers, hands them to a display server with
//! a present request, and must not touch a buffer again until the server
//! reports that it stopped reading it. It is `no_std` compatible (with
//! `alloc`) and performs no I/O.
//!
//! # Architecture
//!
//! ```text
//!   producer ──► ChannelState::submission() ──► Submission
//!                                                   │
//!                     ┌─────────────────────────────┘
//!                     ▼
//!   transport present request ──► ChannelState::commit()
//!
//!   transport notifications ──► PresentEvent ──► ChannelState::apply()
//!                                                   │
//!                     ┌─────────────────────────────┘
//!                     ▼
//!   Applied { Completed | Released | Fence | Wake }
//! ```
//!
//! **[`id`]**: Opaque protocol identifiers, serials and buffer handles.
//!
//! **[`registry`]**: Generation-checked slot arena of buffer records with a
//! serial index for constant-time event correlation.
//!
//! **[`event`]**: Completion, sequence and idle notifications.
//!
//! **[`pacing`]**: Target-sequence computation and present option bits.
//!
//! **[`region`]**: Translation of source, destination and dirty rectangles
//! into a buffer offset plus valid and update regions.
//!
//! **[`state`]**: The per-channel state machine tying the above together.
//!
//! **[`error`]**: Consistency faults and registry errors.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod error;
pub mod event;
pub mod id;
pub mod pacing;
pub mod region;
pub mod registry;
pub mod state;

pub use error::{ProtocolViolation, RegistryError, SubmitRefusal};
pub use event::{CompleteMode, PresentEvent};
pub use id::{BufferId, HandleId, Serial, SubscriptionId, SurfaceId};
pub use pacing::{PresentInterval, PresentOptions, SwapEffect, target_sequence};
pub use region::{BufferSize, Placement, RegionRect};
pub use registry::{BufferRecord, BufferRegistry};
pub use state::{Applied, ChannelState, ChannelStats, Submission};
