// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed configuration for connections, channels and presentations.

use std::time::Duration;

use ferry_core::{
    BufferSize, Placement, PresentInterval, PresentOptions, RegionRect, SurfaceId, SwapEffect,
};
use kurbo::Rect;

/// Parameters for opening a [`Connection`](crate::Connection).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Display name; `None` uses the `DISPLAY` environment variable.
    pub display: Option<String>,
    /// Minimum DRI3 version, as `(major, minor)`.
    pub dri3_version: (u32, u32),
    /// Minimum Present version, as `(major, minor)`.
    pub present_version: (u32, u32),
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            display: None,
            dri3_version: (1, 0),
            present_version: (1, 0),
        }
    }
}

impl ConnectOptions {
    /// Connects to the named display instead of `DISPLAY`.
    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Requires at least the given DRI3 version.
    #[must_use]
    pub fn with_dri3_version(mut self, major: u32, minor: u32) -> Self {
        self.dri3_version = (major, minor);
        self
    }

    /// Requires at least the given Present version.
    #[must_use]
    pub fn with_present_version(mut self, major: u32, minor: u32) -> Self {
        self.present_version = (major, minor);
        self
    }
}

/// Tuning knobs of a [`PresentChannel`](crate::PresentChannel).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// How long a waiter sleeps on the handoff before re-checking its buffer
    /// while another thread reads the event stream.
    pub handoff_retry: Duration,
    /// How many sequence ticks past the latest target a drain fence fires.
    pub fence_lookahead: u64,
    /// Buffer area presented to pry a flipped buffer off the screen.
    ///
    /// Defaults to an 8×1 strip at the origin, not a single pixel.
    pub force_release_area: RegionRect,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            handoff_retry: Duration::from_millis(10),
            fence_lookahead: 5,
            force_release_area: RegionRect::new(0, 0, 8, 1),
        }
    }
}

impl ChannelConfig {
    /// Sets the handoff retry interval.
    #[must_use]
    pub fn with_handoff_retry(mut self, retry: Duration) -> Self {
        self.handoff_retry = retry;
        self
    }

    /// Sets the drain fence look-ahead.
    #[must_use]
    pub fn with_fence_lookahead(mut self, ticks: u64) -> Self {
        self.fence_lookahead = ticks;
        self
    }

    /// Sets the forced-release area.
    #[must_use]
    pub fn with_force_release_area(mut self, area: RegionRect) -> Self {
        self.force_release_area = area;
        self
    }
}

/// How a single buffer is presented.
///
/// The default presents the whole buffer to the channel's current target on
/// the next refresh with the discard swap effect.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PresentParams {
    /// Surface to present to; the channel retargets first when it differs
    /// from the current one. `None` keeps the current target.
    pub surface: Option<SurfaceId>,
    /// Refreshes between presentations.
    pub interval: PresentInterval,
    /// Treatment of the buffer contents after presentation.
    pub swap_effect: SwapEffect,
    /// Buffer-space rectangle to show.
    pub source: Option<Rect>,
    /// Surface-space rectangle to show it at.
    pub dest: Option<Rect>,
    /// Surface-space rectangles that changed.
    pub dirty: Option<Vec<Rect>>,
}

impl PresentParams {
    /// Presents to `surface`, retargeting the channel if needed.
    #[must_use]
    pub fn with_surface(mut self, surface: SurfaceId) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Sets the presentation interval.
    #[must_use]
    pub fn with_interval(mut self, interval: PresentInterval) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the swap effect.
    #[must_use]
    pub fn with_swap_effect(mut self, swap_effect: SwapEffect) -> Self {
        self.swap_effect = swap_effect;
        self
    }

    /// Sets the source rectangle.
    #[must_use]
    pub fn with_source(mut self, source: Rect) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the destination rectangle.
    #[must_use]
    pub fn with_dest(mut self, dest: Rect) -> Self {
        self.dest = Some(dest);
        self
    }

    /// Sets the dirty rectangles.
    #[must_use]
    pub fn with_dirty(mut self, dirty: impl Into<Vec<Rect>>) -> Self {
        self.dirty = Some(dirty.into());
        self
    }

    /// Returns `true` when the buffer geometry is needed to place the
    /// presentation.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.source.is_some()
            || self.dest.is_some()
            || self.dirty.as_ref().is_some_and(|dirty| !dirty.is_empty())
    }

    /// Computes the placement for a buffer of the given size.
    #[must_use]
    pub fn placement(&self, size: BufferSize) -> Placement {
        Placement::compute(size, self.source, self.dest, self.dirty.as_deref())
    }

    /// Option bits for the present request.
    #[must_use]
    pub fn options(&self) -> PresentOptions {
        self.interval.options() | self.swap_effect.options()
    }
}
