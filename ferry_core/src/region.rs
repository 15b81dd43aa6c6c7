// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Translation of presentation rectangles into buffer-space regions.
//!
//! A present request places the buffer's origin at an offset inside the
//! destination surface and names two regions, both relative to the buffer:
//! the *valid* region (what may be shown at all) and the *update* region
//! (what changed since the last presentation).
//!
//! Callers describe a presentation with an optional source rectangle (in
//! buffer space), an optional destination rectangle and an optional dirty
//! list (both in surface space):
//!
//! - With none of the three, the whole buffer is presented at offset zero and
//!   no region objects are needed ([`Placement::Whole`]).
//! - Otherwise `offset = dest origin - source origin`, the valid region is
//!   the source rectangle clamped to the buffer, and the update region is the
//!   dirty list translated into buffer space (or the valid region when no
//!   dirty list is given).

use alloc::vec;
use alloc::vec::Vec;

use kurbo::{Point, Rect, Size};

/// Pixel dimensions of a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferSize {
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
}

impl BufferSize {
    /// Creates a size from its dimensions.
    #[inline]
    #[must_use]
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// The buffer's extent as a rectangle at the origin.
    #[must_use]
    pub fn bounds(self) -> Rect {
        Rect::from_origin_size(
            Point::ORIGIN,
            Size::new(f64::from(self.width), f64::from(self.height)),
        )
    }
}

/// An integer rectangle in the wire representation of region objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegionRect {
    /// Left edge.
    pub x: i16,
    /// Top edge.
    pub y: i16,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
}

impl RegionRect {
    /// Creates a rectangle from its origin and size.
    #[inline]
    #[must_use]
    pub const fn new(x: i16, y: i16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Snaps a rectangle outward to whole pixels.
    ///
    /// Coordinates outside the wire range saturate.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "float to int casts saturate, which is the intended clamping"
    )]
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.abs().expand();
        Self {
            x: rect.x0 as i16,
            y: rect.y0 as i16,
            width: rect.width() as u16,
            height: rect.height() as u16,
        }
    }

    /// Converts back to a floating-point rectangle.
    #[must_use]
    pub fn to_rect(self) -> Rect {
        Rect::from_origin_size(
            Point::new(f64::from(self.x), f64::from(self.y)),
            Size::new(f64::from(self.width), f64::from(self.height)),
        )
    }

    /// Returns `true` when the rectangle covers no pixel.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where and how much of a buffer a present request shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// The whole buffer at offset zero; no region objects.
    Whole,
    /// A sub-rectangle at an offset.
    Partial {
        /// Horizontal position of the buffer origin in the surface.
        x_off: i16,
        /// Vertical position of the buffer origin in the surface.
        y_off: i16,
        /// Buffer-space region that may be shown.
        valid: RegionRect,
        /// Buffer-space region that changed. Never empty.
        update: Vec<RegionRect>,
    },
}

impl Placement {
    /// Computes the placement of a presentation.
    ///
    /// An empty dirty list is treated like no dirty list. Dirty rectangles
    /// that fall entirely outside the valid region are dropped; if none
    /// survive, the update region degenerates to an empty rectangle at the
    /// valid region's origin.
    #[must_use]
    pub fn compute(
        size: BufferSize,
        source: Option<Rect>,
        dest: Option<Rect>,
        dirty: Option<&[Rect]>,
    ) -> Self {
        let dirty = dirty.filter(|rects| !rects.is_empty());
        if source.is_none() && dest.is_none() && dirty.is_none() {
            return Self::Whole;
        }

        let bounds = size.bounds();
        let source_origin = source.map_or(Point::ORIGIN, |r| r.abs().origin());
        let dest_origin = dest.map_or(Point::ORIGIN, |r| r.abs().origin());
        let offset = dest_origin - source_origin;

        let valid = match (source, dest) {
            (Some(source), _) => source.abs(),
            (None, Some(dest)) => Rect::from_origin_size(Point::ORIGIN, dest.abs().size()),
            (None, None) => bounds,
        }
        .intersect(bounds);
        let valid_px = RegionRect::from_rect(valid);

        let update = match dirty {
            Some(rects) => {
                let mut update: Vec<RegionRect> = rects
                    .iter()
                    .map(|r| (r.abs() - offset).intersect(valid))
                    .map(RegionRect::from_rect)
                    .filter(|r| !r.is_empty())
                    .collect();
                if update.is_empty() {
                    update.push(RegionRect::new(valid_px.x, valid_px.y, 0, 0));
                }
                update
            }
            None => vec![valid_px],
        };

        let (x_off, y_off) = wire_offset(offset.x, offset.y);
        Self::Partial {
            x_off,
            y_off,
            valid: valid_px,
            update,
        }
    }

    /// Position of the buffer origin in the surface.
    #[must_use]
    pub fn offset(&self) -> (i16, i16) {
        match self {
            Self::Whole => (0, 0),
            Self::Partial { x_off, y_off, .. } => (*x_off, *y_off),
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "float to int casts saturate, which is the intended clamping"
)]
fn wire_offset(x: f64, y: f64) -> (i16, i16) {
    (x as i16, y as i16)
}
