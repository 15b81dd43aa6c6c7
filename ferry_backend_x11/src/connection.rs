// Copyright 2026 the Ferry Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! X11 connection and capability layer.
//!
//! Capability probes and buffer import/export are one-shot round trips that
//! never touch channel state; they may be called from any thread.

use std::fmt;
use std::os::fd::OwnedFd;

use ferry_core::BufferId;
use rustix::io::{FdFlags, fcntl_getfd, fcntl_setfd};
use tracing::{debug, warn};
use x11rb::connection::{Connection as _, RequestConnection as _};
use x11rb::errors::ReplyError;
use x11rb::protocol::dri3::{self, ConnectionExt as _};
use x11rb::protocol::present::{self, ConnectionExt as _};
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{ConnectionExt as _, Window};
use x11rb::rust_connection::RustConnection;

use crate::config::ConnectOptions;
use crate::error::{PresentError, TransportError};

/// XFixes version needed for region objects.
const XFIXES_VERSION: (u32, u32) = (2, 0);

/// A buffer exported from the server.
#[derive(Debug)]
pub struct ExportedBuffer {
    /// Descriptor of the buffer memory.
    pub fd: OwnedFd,
    /// Size of the memory in bytes.
    pub size: u32,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Bytes per row.
    pub stride: u16,
    /// Color depth.
    pub depth: u8,
    /// Bits per pixel.
    pub bpp: u8,
}

/// A connection to an X server with DRI3 and Present available.
pub struct Connection {
    conn: RustConnection,
    screen: usize,
    root: Window,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("screen", &self.screen)
            .field("root", &format_args!("{:#x}", self.root))
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connects to the display and checks the required extension versions.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError::Transport`] when the display cannot be reached
    /// and [`PresentError::CapabilityUnavailable`] when DRI3, Present or
    /// XFixes is missing or too old.
    pub fn connect(options: &ConnectOptions) -> Result<Self, PresentError> {
        let (conn, screen) =
            x11rb::connect(options.display.as_deref()).map_err(TransportError::from)?;
        let root = conn.setup().roots.get(screen).map_or(x11rb::NONE, |s| s.root);
        let connection = Self { conn, screen, root };

        let (major, minor) = options.dri3_version;
        if !connection.check_dri3(major, minor) {
            return Err(PresentError::CapabilityUnavailable {
                extension: dri3::X11_EXTENSION_NAME,
                major,
                minor,
            });
        }
        let (major, minor) = options.present_version;
        if !connection.check_present(major, minor) {
            return Err(PresentError::CapabilityUnavailable {
                extension: present::X11_EXTENSION_NAME,
                major,
                minor,
            });
        }
        debug!(screen, root = connection.root, "display connection ready");
        Ok(connection)
    }

    /// The underlying x11rb connection.
    #[must_use]
    pub fn x11(&self) -> &RustConnection {
        &self.conn
    }

    /// Root window of the default screen.
    #[must_use]
    pub fn root(&self) -> Window {
        self.root
    }

    /// Returns whether the server supports DRI3 `major.minor` or newer.
    #[must_use]
    pub fn check_dri3(&self, major: u32, minor: u32) -> bool {
        if !self.has_extension(dri3::X11_EXTENSION_NAME) {
            return false;
        }
        let reply = self
            .conn
            .dri3_query_version(major, minor)
            .map_err(ReplyError::from)
            .and_then(|cookie| cookie.reply())
            .map(|reply| (reply.major_version, reply.minor_version));
        negotiated(dri3::X11_EXTENSION_NAME, reply, (major, minor))
    }

    /// Returns whether the server supports Present `major.minor` or newer.
    ///
    /// Also negotiates XFixes, which present requests need for regions.
    #[must_use]
    pub fn check_present(&self, major: u32, minor: u32) -> bool {
        if !self.has_extension(present::X11_EXTENSION_NAME)
            || !self.has_extension(xfixes::X11_EXTENSION_NAME)
        {
            return false;
        }
        let reply = self
            .conn
            .present_query_version(major, minor)
            .map_err(ReplyError::from)
            .and_then(|cookie| cookie.reply())
            .map(|reply| (reply.major_version, reply.minor_version));
        if !negotiated(present::X11_EXTENSION_NAME, reply, (major, minor)) {
            return false;
        }
        let (major, minor) = XFIXES_VERSION;
        let reply = self
            .conn
            .xfixes_query_version(major, minor)
            .map_err(ReplyError::from)
            .and_then(|cookie| cookie.reply())
            .map(|reply| (reply.major_version, reply.minor_version));
        negotiated(xfixes::X11_EXTENSION_NAME, reply, XFIXES_VERSION)
    }

    fn has_extension(&self, name: &'static str) -> bool {
        match self.conn.extension_information(name) {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!(extension = name, "extension not advertised");
                false
            }
            Err(err) => {
                warn!(extension = name, %err, "extension query failed");
                false
            }
        }
    }

    /// Opens the rendering device the server uses for the default screen.
    ///
    /// The descriptor is close-on-exec.
    ///
    /// # Errors
    ///
    /// Fails when the request is rejected or the server does not return
    /// exactly one descriptor.
    pub fn open_device(&self) -> Result<OwnedFd, TransportError> {
        let reply = self
            .conn
            .dri3_open(self.root, x11rb::NONE)?
            .reply()
            .map_err(TransportError::reply("DRI3Open"))?;
        if reply.nfd != 1 {
            return Err(TransportError::DescriptorCount(reply.nfd));
        }
        let fd: OwnedFd = reply.device_fd;
        let flags = fcntl_getfd(&fd)?;
        fcntl_setfd(&fd, flags | FdFlags::CLOEXEC)?;
        Ok(fd)
    }

    /// Wraps externally allocated memory in a server-side buffer.
    ///
    /// # Errors
    ///
    /// Fails when ids are exhausted or the server rejects the format.
    pub fn import_buffer(
        &self,
        fd: OwnedFd,
        width: u16,
        height: u16,
        stride: u16,
        depth: u8,
        bpp: u8,
    ) -> Result<BufferId, TransportError> {
        let pixmap = self
            .conn
            .generate_id()
            .map_err(TransportError::reply_or_id("PixmapFromBuffer"))?;
        let size = u32::from(stride) * u32::from(height);
        self.conn
            .dri3_pixmap_from_buffer(pixmap, self.root, size, width, height, stride, depth, bpp, fd)?
            .check()
            .map_err(TransportError::reply("PixmapFromBuffer"))?;
        debug!(pixmap, width, height, stride, depth, bpp, "imported buffer");
        Ok(BufferId(pixmap))
    }

    /// Exports the memory behind a server-side buffer.
    ///
    /// # Errors
    ///
    /// Fails when the buffer cannot be exported.
    pub fn export_buffer(&self, buffer: BufferId) -> Result<ExportedBuffer, TransportError> {
        let reply = self
            .conn
            .dri3_buffer_from_pixmap(buffer.0)?
            .reply()
            .map_err(TransportError::reply("BufferFromPixmap"))?;
        if reply.nfd != 1 {
            return Err(TransportError::DescriptorCount(reply.nfd));
        }
        Ok(ExportedBuffer {
            fd: reply.pixmap_fd,
            size: reply.size,
            width: reply.width,
            height: reply.height,
            stride: reply.stride,
            depth: reply.depth,
            bpp: reply.bpp,
        })
    }

    /// Destroys a server-side buffer.
    ///
    /// # Errors
    ///
    /// Fails when the connection is broken.
    pub fn free_buffer(&self, buffer: BufferId) -> Result<(), TransportError> {
        self.conn.free_pixmap(buffer.0)?;
        self.conn.flush()?;
        Ok(())
    }
}

fn negotiated(
    extension: &'static str,
    reply: Result<(u32, u32), ReplyError>,
    required: (u32, u32),
) -> bool {
    match reply {
        Ok(actual) if version_at_least(actual, required) => true,
        Ok((major, minor)) => {
            warn!(extension, major, minor, ?required, "extension version too old");
            false
        }
        Err(err) => {
            warn!(extension, %err, "version query failed");
            false
        }
    }
}

fn version_at_least(actual: (u32, u32), required: (u32, u32)) -> bool {
    actual >= required
}
