// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for transports and presentation channels.

use ferry_core::{BufferId, HandleId, ProtocolViolation, RegistryError, SubmitRefusal, SurfaceId};
use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

/// Failures reported by a [`PresentTransport`](crate::PresentTransport).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The display server could not be reached.
    #[error("failed to connect to the display server")]
    Connect(#[from] ConnectError),
    /// The connection broke while sending or receiving.
    #[error("display connection failed")]
    Connection(#[from] ConnectionError),
    /// The server answered a request with an error.
    #[error("{request} rejected by the server (error code {code})")]
    Rejected {
        /// Name of the rejected request.
        request: &'static str,
        /// Protocol error code.
        code: u8,
    },
    /// The client ran out of resource ids.
    #[error("resource ids exhausted")]
    IdsExhausted,
    /// A device open returned the wrong number of descriptors.
    #[error("expected exactly one device descriptor, got {0}")]
    DescriptorCount(u8),
    /// A received descriptor could not be configured.
    #[error("failed to configure descriptor")]
    Descriptor(#[from] rustix::io::Errno),
    /// The event stream was shut down.
    #[error("event stream closed")]
    Closed,
}

impl TransportError {
    /// Adapts a reply error of the named request.
    pub(crate) fn reply(request: &'static str) -> impl FnOnce(ReplyError) -> Self {
        move |err| match err {
            ReplyError::ConnectionError(err) => Self::Connection(err),
            ReplyError::X11Error(err) => Self::Rejected {
                request,
                code: err.error_code,
            },
        }
    }

    /// Adapts an error of a request that allocated an id.
    pub(crate) fn reply_or_id(request: &'static str) -> impl FnOnce(ReplyOrIdError) -> Self {
        move |err| match err {
            ReplyOrIdError::IdsExhausted => Self::IdsExhausted,
            ReplyOrIdError::ConnectionError(err) => Self::Connection(err),
            ReplyOrIdError::X11Error(err) => Self::Rejected {
                request,
                code: err.error_code,
            },
        }
    }
}

/// Errors returned by [`PresentChannel`](crate::PresentChannel) operations
/// and the capability layer.
#[derive(Error, Debug)]
pub enum PresentError {
    /// A required extension is missing or too old. Callers should fall back
    /// to another presentation path.
    #[error("{extension} {major}.{minor} is not available")]
    CapabilityUnavailable {
        /// Extension name.
        extension: &'static str,
        /// Required major version.
        major: u32,
        /// Required minor version.
        minor: u32,
    },
    /// The server or client ran out of resources.
    #[error("presentation resources exhausted")]
    ResourceExhausted,
    /// Client and server disagree about buffer state. Not recoverable.
    #[error("presentation state desynchronized")]
    ProtocolViolation(#[source] ProtocolViolation),
    /// The transport failed.
    #[error("presentation transport failed")]
    Transport(#[source] TransportError),
    /// The server refused a present request. Buffer state is unchanged.
    #[error("present request rejected")]
    SubmissionRejected(#[source] TransportError),
    /// Subscribing to the new surface failed; the channel is detached.
    #[error("failed to attach to surface {surface:?}")]
    AttachFailed {
        /// The surface that could not be attached.
        surface: SurfaceId,
        /// The underlying failure.
        #[source]
        source: TransportError,
    },
    /// The operation needs an attached channel.
    #[error("channel is not attached to a surface")]
    Detached,
    /// The handle does not name a registered buffer.
    #[error("stale buffer handle {0:?}")]
    StaleHandle(HandleId),
    /// The buffer is still in use by the server.
    #[error("buffer {0:?} is still in use by the server")]
    Busy(BufferId),
}

impl PresentError {
    /// Returns `true` for faults after which the channel must not be used.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_) | Self::Transport(_))
    }
}

impl From<TransportError> for PresentError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::IdsExhausted => Self::ResourceExhausted,
            err => Self::Transport(err),
        }
    }
}

impl From<ProtocolViolation> for PresentError {
    fn from(violation: ProtocolViolation) -> Self {
        Self::ProtocolViolation(violation)
    }
}

impl From<RegistryError> for PresentError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::StaleHandle(handle) => Self::StaleHandle(handle),
            RegistryError::Busy(buffer) => Self::Busy(buffer),
        }
    }
}

impl From<SubmitRefusal> for PresentError {
    fn from(refusal: SubmitRefusal) -> Self {
        match refusal {
            SubmitRefusal::Registry(err) => err.into(),
            SubmitRefusal::Protocol(violation) => violation.into(),
        }
    }
}
