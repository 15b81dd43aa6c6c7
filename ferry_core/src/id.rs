// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identity types shared between the state machine and transports.
//!
//! Server-side objects ([`SurfaceId`], [`BufferId`], [`SubscriptionId`]) are
//! opaque protocol ids; core code passes them through without interpreting
//! the value. [`Serial`] correlates a present request with the completion and
//! idle notices the server sends back for it. [`HandleId`] is the
//! client-side handle to a registered buffer.

use core::fmt;

/// A destination surface (a window on X11).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u32);

impl fmt::Debug for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceId({:#x})", self.0)
    }
}

/// A shared buffer known to the server (a pixmap on X11).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u32);

impl fmt::Debug for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({:#x})", self.0)
    }
}

/// An event subscription on a surface.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u32);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({:#x})", self.0)
    }
}

/// Per-channel identifier tagging every present request of one buffer.
///
/// Serials are allocated by the [`BufferRegistry`](crate::registry::BufferRegistry)
/// and are never handed out twice while the owning handle is registered.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Serial(pub u32);

impl Serial {
    /// Serial used for wake-up requests. Never assigned to a buffer.
    pub const WAKE: Self = Self(0);

    /// Serial carried by drain fences.
    ///
    /// Fences travel as sequence notifications, which live in a different
    /// event kind than pixmap completions, so this value may coincide with a
    /// buffer serial without ambiguity. Only its non-zero-ness matters.
    pub const FENCE: Self = Self(1);

    /// Returns `true` for the reserved wake-up serial.
    #[inline]
    #[must_use]
    pub const fn is_wake(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serial({})", self.0)
    }
}

/// A handle to a buffer registered with a [`BufferRegistry`](crate::registry::BufferRegistry).
///
/// Contains the id of the issuing registry, a slot index and a generation
/// counter, so that handles of another registry and stale handles left over
/// after a slot is reused are both rejected.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    /// Id of the registry that issued the handle.
    pub(crate) owner: u32,
    /// Slot index into the registry.
    pub(crate) idx: u32,
    /// Generation counter; must match the registry's generation for this slot.
    pub(crate) generation: u32,
}

impl HandleId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId({}@gen{}/r{})", self.idx, self.generation, self.owner)
    }
}
