// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`PresentTransport`] over an X11 connection.
//!
//! Surfaces are windows, buffers are pixmaps and subscriptions are Present
//! event ids selecting complete and idle notifications. Regions are XFixes
//! region objects created per request and destroyed right after it is sent;
//! the server keeps its own copy.

use ferry_core::{
    BufferId, BufferSize, CompleteMode, Placement, PresentEvent, RegionRect, Serial,
    SubscriptionId, SurfaceId,
};
use tracing::trace;
use x11rb::connection::Connection as _;
use x11rb::cookie::VoidCookie;
use x11rb::protocol::Event;
use x11rb::protocol::present::{self, ConnectionExt as _};
use x11rb::protocol::xfixes::{ConnectionExt as _, Region};
use x11rb::protocol::xproto::{ConnectionExt as _, CreateGCAux, Rectangle};
use x11rb::rust_connection::RustConnection;

use crate::config::ConnectOptions;
use crate::connection::Connection;
use crate::error::{PresentError, TransportError};
use crate::router::{EventSource, Routed, Router};
use crate::transport::{BufferGeometry, PresentRequest, PresentTransport};

/// Presentation transport over a dedicated X11 connection.
///
/// Share one transport between all channels of a connection (wrap it in an
/// [`Arc`](std::sync::Arc)). Events that are not Present notifications are
/// discarded.
#[derive(Debug)]
pub struct X11Transport {
    connection: Connection,
    router: Router,
}

impl X11Transport {
    /// Wraps a connection whose capabilities were checked.
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            router: Router::default(),
        }
    }

    /// Connects to the display and wraps the connection.
    ///
    /// # Errors
    ///
    /// See [`Connection::connect`].
    pub fn connect(options: &ConnectOptions) -> Result<Self, PresentError> {
        Connection::connect(options).map(Self::new)
    }

    /// The capability layer, for device access and buffer import/export.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn x11(&self) -> &RustConnection {
        self.connection.x11()
    }

    fn create_region(&self, rects: &[RegionRect]) -> Result<Region, TransportError> {
        let conn = self.x11();
        let region = conn
            .generate_id()
            .map_err(TransportError::reply_or_id("CreateRegion"))?;
        let rects: Vec<Rectangle> = rects
            .iter()
            .map(|r| Rectangle {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
            })
            .collect();
        conn.xfixes_create_region(region, &rects)?;
        Ok(region)
    }

    fn send_present(
        &self,
        request: &PresentRequest<'_>,
    ) -> Result<VoidCookie<'_, RustConnection>, TransportError> {
        let conn = self.x11();
        let regions = match request.placement {
            Placement::Whole => None,
            Placement::Partial { valid, update, .. } => Some(region_pair(
                || self.create_region(&[*valid]),
                || self.create_region(update),
                |region| {
                    conn.xfixes_destroy_region(region)?;
                    Ok(())
                },
            )?),
        };
        let (valid, update) = regions.unwrap_or((x11rb::NONE, x11rb::NONE));
        let (x_off, y_off) = request.placement.offset();
        trace!(
            window = request.surface.0,
            pixmap = request.buffer.0,
            serial = request.serial.0,
            target_msc = request.target_sequence,
            options = request.options.bits(),
            "PresentPixmap"
        );
        let cookie = conn.present_pixmap(
            request.surface.0,
            request.buffer.0,
            request.serial.0,
            valid,
            update,
            x_off,
            y_off,
            x11rb::NONE,
            x11rb::NONE,
            x11rb::NONE,
            request.options.bits(),
            request.target_sequence,
            0,
            0,
            &[],
        )?;
        if let Some((valid, update)) = regions {
            conn.xfixes_destroy_region(valid)?;
            conn.xfixes_destroy_region(update)?;
        }
        Ok(cookie)
    }
}

impl PresentTransport for X11Transport {
    fn subscribe(&self, surface: SurfaceId) -> Result<SubscriptionId, TransportError> {
        let conn = self.x11();
        let eid = conn
            .generate_id()
            .map_err(TransportError::reply_or_id("PresentSelectInput"))?;
        // Route before selecting so no early event is dropped.
        self.router.add(eid, surface);
        let mask = present::EventMask::COMPLETE_NOTIFY | present::EventMask::IDLE_NOTIFY;
        let selected = conn
            .present_select_input(eid, surface.0, mask)
            .map_err(TransportError::from)
            .and_then(|cookie| {
                cookie
                    .check()
                    .map_err(TransportError::reply("PresentSelectInput"))
            });
        if let Err(err) = selected {
            self.router.remove(eid);
            return Err(err);
        }
        Ok(SubscriptionId(eid))
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError> {
        let surface = self
            .router
            .remove(subscription.0)
            .ok_or(TransportError::Closed)?;
        let conn = self.x11();
        conn.present_select_input(subscription.0, surface.0, present::EventMask::NO_EVENT)?;
        conn.flush()?;
        Ok(())
    }

    fn buffer_geometry(&self, buffer: BufferId) -> Result<BufferGeometry, TransportError> {
        let reply = self
            .x11()
            .get_geometry(buffer.0)?
            .reply()
            .map_err(TransportError::reply("GetGeometry"))?;
        Ok(BufferGeometry {
            size: BufferSize::new(reply.width, reply.height),
            depth: reply.depth,
        })
    }

    fn present(&self, request: &PresentRequest<'_>) -> Result<(), TransportError> {
        self.send_present(request)?
            .check()
            .map_err(TransportError::reply("PresentPixmap"))
    }

    fn present_unchecked(&self, request: &PresentRequest<'_>) -> Result<(), TransportError> {
        self.send_present(request)?.ignore_error();
        self.x11().flush()?;
        Ok(())
    }

    fn notify_sequence(
        &self,
        surface: SurfaceId,
        serial: Serial,
        target: u64,
    ) -> Result<(), TransportError> {
        let conn = self.x11();
        conn.present_notify_msc(surface.0, serial.0, target, 0, 0)?;
        conn.flush()?;
        Ok(())
    }

    fn poll_event(
        &self,
        subscription: SubscriptionId,
    ) -> Result<Option<PresentEvent>, TransportError> {
        self.router.poll(subscription.0, &Source(self.x11()))
    }

    fn wait_event(&self, subscription: SubscriptionId) -> Result<PresentEvent, TransportError> {
        self.x11().flush()?;
        self.router.wait(subscription.0, &Source(self.x11()))
    }

    fn copy_surface_to_buffer(
        &self,
        surface: SurfaceId,
        buffer: BufferId,
    ) -> Result<(), TransportError> {
        let geometry = self.buffer_geometry(buffer)?;
        let conn = self.x11();
        let gc = conn
            .generate_id()
            .map_err(TransportError::reply_or_id("CreateGC"))?;
        conn.create_gc(gc, buffer.0, &CreateGCAux::new().graphics_exposures(0))?;
        let copied = conn
            .copy_area(
                surface.0,
                buffer.0,
                gc,
                0,
                0,
                0,
                0,
                geometry.size.width,
                geometry.size.height,
            )?
            .check();
        conn.free_gc(gc)?;
        conn.flush()?;
        copied.map_err(TransportError::reply("CopyArea"))
    }

    fn free_buffer(&self, buffer: BufferId) -> Result<(), TransportError> {
        self.connection.free_buffer(buffer)
    }
}

/// Creates the valid and update regions of a request, or neither.
fn region_pair<R: Copy>(
    valid: impl FnOnce() -> Result<R, TransportError>,
    update: impl FnOnce() -> Result<R, TransportError>,
    destroy: impl FnOnce(R) -> Result<(), TransportError>,
) -> Result<(R, R), TransportError> {
    let valid = valid()?;
    match update() {
        Ok(update) => Ok((valid, update)),
        Err(err) => {
            destroy(valid)?;
            Err(err)
        }
    }
}

/// The shared event queue of a connection.
struct Source<'a>(&'a RustConnection);

impl EventSource for Source<'_> {
    fn poll(&self) -> Result<Option<Routed>, TransportError> {
        Ok(self.0.poll_for_event()?.map(decode))
    }

    fn wait(&self) -> Result<Routed, TransportError> {
        Ok(decode(self.0.wait_for_event()?))
    }
}

fn decode(event: Event) -> Routed {
    match event {
        Event::PresentCompleteNotify(ev) => {
            let serial = Serial(ev.serial);
            let event = if ev.kind == present::CompleteKind::NOTIFY_MSC {
                PresentEvent::SequenceComplete {
                    serial,
                    sequence: ev.msc,
                }
            } else {
                PresentEvent::PixmapComplete {
                    serial,
                    sequence: ev.msc,
                    ust: ev.ust,
                    mode: complete_mode(ev.mode),
                }
            };
            Routed::Present {
                eid: ev.event,
                event,
            }
        }
        Event::PresentIdleNotify(ev) => Routed::Present {
            eid: ev.event,
            event: PresentEvent::Idle {
                serial: Serial(ev.serial),
                buffer: BufferId(ev.pixmap),
            },
        },
        _ => Routed::Other,
    }
}

fn complete_mode(mode: present::CompleteMode) -> CompleteMode {
    if mode == present::CompleteMode::FLIP {
        CompleteMode::Flip
    } else if mode == present::CompleteMode::SKIP {
        CompleteMode::Skip
    } else if mode == present::CompleteMode::SUBOPTIMAL_COPY {
        CompleteMode::SuboptimalCopy
    } else {
        CompleteMode::Copy
    }
}
