// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for the registry and the channel state machine.

use thiserror::Error;

use crate::id::{BufferId, HandleId, Serial};

/// The client and the server disagree about buffer state.
///
/// Every variant is an internal-consistency fault. Continuing past one risks
/// operating on a buffer the server still reads from (or one that was already
/// freed), so callers must stop processing and surface the error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A buffer was submitted while the server still owns it.
    #[error("buffer {buffer:?} (serial {serial:?}) submitted while busy")]
    BufferBusy {
        /// The busy buffer.
        buffer: BufferId,
        /// Its serial.
        serial: Serial,
    },
    /// A completion or idle notice named a serial no registered buffer owns.
    #[error("notification for unknown serial {0:?}")]
    UnknownSerial(Serial),
    /// An idle notice named a different buffer than the serial's owner.
    #[error("idle notice for serial {serial:?} names {reported:?}, expected {expected:?}")]
    IdleBufferMismatch {
        /// Serial carried by the notice.
        serial: Serial,
        /// Buffer named by the notice.
        reported: BufferId,
        /// Buffer registered under the serial.
        expected: BufferId,
    },
    /// A completion arrived for a buffer with no presentation in flight.
    #[error("completion for serial {0:?} with no presentation pending")]
    UnexpectedCompletion(Serial),
    /// A buffer stayed unreleased after a drain for no legitimate reason.
    #[error("buffer {buffer:?} (serial {serial:?}) still held by the server after drain")]
    UnreleasedAfterDrain {
        /// The unreleased buffer.
        buffer: BufferId,
        /// Its serial.
        serial: Serial,
    },
}

/// Errors from [`BufferRegistry`](crate::registry::BufferRegistry) operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The handle was released (or never belonged to this registry).
    #[error("stale buffer handle {0:?}")]
    StaleHandle(HandleId),
    /// The buffer is still in flight and cannot be freed yet.
    #[error("buffer {0:?} is still in use by the server")]
    Busy(BufferId),
}

/// Reasons a buffer cannot be submitted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRefusal {
    /// The handle does not name a registered buffer.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The buffer is still owned by the server.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}
