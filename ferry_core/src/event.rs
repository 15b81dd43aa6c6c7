// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inbound notification contracts.
//!
//! Transports decode server notifications into [`PresentEvent`] values. Each
//! event is handed to [`ChannelState::apply`](crate::state::ChannelState::apply)
//! exactly once and then discarded; nothing here is buffered beyond the
//! transport's own queue.

use crate::id::{BufferId, Serial};

/// How the server carried out a presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompleteMode {
    /// The buffer was blitted into the surface.
    Copy,
    /// Scanout was retargeted to the buffer (zero-copy).
    Flip,
    /// The presentation was superseded before it took effect.
    Skip,
    /// A copy was performed although a flip would have been possible with a
    /// different buffer layout.
    SuboptimalCopy,
}

impl CompleteMode {
    /// Returns `true` when the server may still be scanning out of the buffer.
    #[inline]
    #[must_use]
    pub const fn is_flip(self) -> bool {
        matches!(self, Self::Flip)
    }
}

/// A notification received on a channel's event subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentEvent {
    /// A present request took effect (or was superseded).
    PixmapComplete {
        /// Serial of the present request.
        serial: Serial,
        /// Sequence counter at which the presentation completed.
        sequence: u64,
        /// Server timestamp of the completion, in microseconds.
        ust: u64,
        /// How the buffer reached the surface.
        mode: CompleteMode,
    },
    /// A sequence notification requested by the client completed.
    ///
    /// These carry no buffer; they are fences and wake-ups.
    SequenceComplete {
        /// Serial passed with the notification request.
        serial: Serial,
        /// Sequence counter at which the notification fired.
        sequence: u64,
    },
    /// The server no longer reads from a presented buffer.
    Idle {
        /// Serial of the present request the buffer was submitted with.
        serial: Serial,
        /// The buffer that became idle.
        buffer: BufferId,
    },
}

impl PresentEvent {
    /// Returns the serial carried by this event.
    #[inline]
    #[must_use]
    pub const fn serial(&self) -> Serial {
        match *self {
            Self::PixmapComplete { serial, .. }
            | Self::SequenceComplete { serial, .. }
            | Self::Idle { serial, .. } => serial,
        }
    }
}
