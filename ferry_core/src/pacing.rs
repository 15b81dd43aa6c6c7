// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sequence pacing and present options.
//!
//! A present request names the refresh tick (sequence count) at which it
//! should take effect. Back-to-back submissions are spread across future
//! ticks: with `n` presentations still pending and a pace step of `k`, the
//! next one targets `last_observed + k * (n + 1)`.

use bitflags::bitflags;

bitflags! {
    /// Option bits attached to a present request.
    ///
    /// Values match the X11 Present extension's `PresentOption` mask.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PresentOptions: u32 {
        /// Present as soon as possible, even if that tears.
        const ASYNC = 1;
        /// Force a copy; never flip.
        const COPY = 2;
        /// Interpret the target as a timestamp rather than a sequence count.
        const UST = 4;
        /// Allow a suboptimal copy completion.
        const SUBOPTIMAL = 8;
    }
}

/// How many refreshes to wait between presentations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PresentInterval {
    /// No vsync: present immediately.
    Immediate,
    /// Every refresh.
    #[default]
    One,
    /// Every second refresh.
    Two,
    /// Every third refresh.
    Three,
    /// Every fourth refresh.
    Four,
}

impl PresentInterval {
    /// Number of sequence ticks between consecutive presentations.
    #[inline]
    #[must_use]
    pub const fn pace_step(self) -> u64 {
        match self {
            Self::Immediate => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }

    /// Maps a raw interval count, as found in presentation parameters, to an
    /// interval. Anything outside `1..=4` presents immediately.
    #[must_use]
    pub const fn from_count(count: u32) -> Self {
        match count {
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Three,
            4 => Self::Four,
            _ => Self::Immediate,
        }
    }

    /// Option bits implied by this interval.
    #[inline]
    #[must_use]
    pub const fn options(self) -> PresentOptions {
        match self {
            Self::Immediate => PresentOptions::ASYNC,
            _ => PresentOptions::empty(),
        }
    }
}

/// How the producer treats the buffer contents after presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SwapEffect {
    /// Contents are undefined after presentation.
    #[default]
    Discard,
    /// Buffers rotate through a flip chain.
    Flip,
    /// Contents must be preserved; the server must copy.
    Copy,
}

impl SwapEffect {
    /// Option bits implied by this swap effect.
    #[inline]
    #[must_use]
    pub const fn options(self) -> PresentOptions {
        match self {
            Self::Copy => PresentOptions::COPY,
            Self::Discard | Self::Flip => PresentOptions::empty(),
        }
    }
}

/// Computes the sequence count a new presentation should target.
#[inline]
#[must_use]
pub const fn target_sequence(last_observed: u64, interval: PresentInterval, pending: u32) -> u64 {
    let step = interval.pace_step();
    last_observed.saturating_add(step.saturating_mul(pending as u64 + 1))
}
