//! Display Session Module
//!
//! Owns the X connection, negotiates XKB, subscribes to bell notifications
//! and turns each one into a fully resolved [`BellEvent`].

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::Event;
use x11rb::protocol::xkb::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{ConnectionExt as _, Window};
use x11rb::rust_connection::RustConnection;

use crate::bell::event::{BellEvent, RawBell};
use crate::bell::query::{Atoms, X11Windows};
use crate::bell::resolver::IconOptions;

/// Command line usage error (sysexits.h)
pub const EX_USAGE: i32 = 64;
/// Service unavailable (sysexits.h)
pub const EX_UNAVAILABLE: i32 = 69;
/// Internal software error (sysexits.h)
pub const EX_SOFTWARE: i32 = 70;
/// Configuration error (sysexits.h)
pub const EX_CONFIG: i32 = 78;

/// Volume used for bells we send
const SEND_PERCENT: i8 = 100;

/// Fatal errors while opening a display session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(
        "{program} was compiled with XKB version {library_major}.{library_minor:02} \
         found {found_major}.{found_minor:02} in library"
    )]
    LibraryVersion {
        program: String,
        library_major: u16,
        library_minor: u16,
        found_major: u16,
        found_minor: u16,
    },
    #[error(
        "{program} was compiled with XKB version {library_major}.{library_minor:02} \
         found {found_major}.{found_minor:02} in {display}"
    )]
    ServerVersion {
        program: String,
        display: String,
        library_major: u16,
        library_minor: u16,
        found_major: u16,
        found_minor: u16,
    },
    #[error("Could not connect to display {display}: {reason}")]
    ConnectionRefused { display: String, reason: String },
    #[error("X11 Server {display} does not support XKB")]
    NoXkb { display: String },
    #[error("Could not get XKB bell events for display {display}: {reason}")]
    SelectEvents { display: String, reason: String },
    #[error("Unknown error while opening display {display}: {reason}")]
    Unknown { display: String, reason: String },
}

impl SessionError {
    /// Stable process exit status for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::LibraryVersion { .. } | SessionError::ServerVersion { .. } => EX_CONFIG,
            SessionError::ConnectionRefused { .. } | SessionError::NoXkb { .. } => EX_UNAVAILABLE,
            SessionError::SelectEvents { .. } | SessionError::Unknown { .. } => EX_SOFTWARE,
        }
    }
}

/// Classify an XKB version the server refused
fn version_error(
    program: &str,
    display: &str,
    library: (u16, u16),
    server: (u16, u16),
) -> SessionError {
    if server > library {
        SessionError::LibraryVersion {
            program: program.to_owned(),
            library_major: library.0,
            library_minor: library.1,
            found_major: server.0,
            found_minor: server.1,
        }
    } else {
        SessionError::ServerVersion {
            program: program.to_owned(),
            display: display.to_owned(),
            library_major: library.0,
            library_minor: library.1,
            found_major: server.0,
            found_minor: server.1,
        }
    }
}

/// Name shown in diagnostics for the display we connect to
pub fn display_label(display: Option<&str>) -> String {
    display
        .map(str::to_owned)
        .or_else(|| std::env::var("DISPLAY").ok())
        .unwrap_or_else(|| ":0".into())
}

/// Connection to one X display with XKB bell events selected
pub struct DisplaySession {
    conn: RustConnection,
    display: String,
    root: Window,
    atoms: Atoms,
    xkb_version: (u16, u16),
    event_mask: xkb::EventType,
    icon_options: IconOptions,
}

impl DisplaySession {
    /// Connect, negotiate XKB and select bell notifications
    pub fn open(
        program_name: &str,
        display: Option<&str>,
        icon_options: IconOptions,
    ) -> Result<Self, SessionError> {
        let label = display_label(display);
        let unknown = |reason: String| SessionError::Unknown {
            display: label.clone(),
            reason,
        };

        let (conn, screen_num) =
            x11rb::connect(display).map_err(|e| SessionError::ConnectionRefused {
                display: label.clone(),
                reason: e.to_string(),
            })?;

        let extension = conn
            .extension_information(xkb::X11_EXTENSION_NAME)
            .map_err(|e| unknown(e.to_string()))?;
        if extension.is_none() {
            return Err(SessionError::NoXkb {
                display: label.clone(),
            });
        }

        let library = (xkb::X11_XML_VERSION.0 as u16, xkb::X11_XML_VERSION.1 as u16);
        let reply = conn
            .xkb_use_extension(library.0, library.1)
            .map_err(|e| unknown(e.to_string()))?
            .reply()
            .map_err(|e| unknown(e.to_string()))?;
        let server = (reply.server_major, reply.server_minor);
        if !reply.supported {
            return Err(version_error(program_name, &label, library, server));
        }
        debug!("XKB {}.{:02} on {}", server.0, server.1, label);

        let event_mask = xkb::EventType::BELL_NOTIFY;
        conn.xkb_select_events(
            xkb::ID::USE_CORE_KBD.into(),
            0u16.into(),
            event_mask,
            0u16.into(),
            0u16.into(),
            &xkb::SelectEventsAux::new(),
        )
        .map_err(|e| e.to_string())
        .and_then(|cookie| cookie.check().map_err(|e| e.to_string()))
        .map_err(|reason| SessionError::SelectEvents {
            display: label.clone(),
            reason,
        })?;

        let atoms = Atoms::new(&conn).map_err(|e| unknown(format!("{:#}", e)))?;
        let root = conn.setup().roots[screen_num].root;

        debug!("Selected bell events on {}, screen {}", label, screen_num);

        Ok(Self {
            conn,
            display: label,
            root,
            atoms,
            xkb_version: server,
            event_mask,
            icon_options,
        })
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn root(&self) -> Window {
        self.root
    }

    /// XKB version reported by the server
    pub fn xkb_version(&self) -> (u16, u16) {
        self.xkb_version
    }

    pub fn event_mask(&self) -> xkb::EventType {
        self.event_mask
    }

    /// Ring a named bell on the core keyboard (event only, no sound forced)
    pub fn send_bell_event(&self, name: &str) -> Result<()> {
        let atom = self
            .conn
            .intern_atom(false, name.as_bytes())?
            .reply()
            .with_context(|| format!("Failed to intern bell name {:?}", name))?
            .atom;
        self.conn.xkb_bell(
            xkb::ID::USE_CORE_KBD.into(),
            xkb::BellClass::DFLT_XI_CLASS.into(),
            xkb::ID::DFLT_XI_ID.into(),
            SEND_PERCENT,
            false,
            true,
            0,
            0,
            atom,
            x11rb::NONE,
        )?;
        self.conn.flush()?;
        debug!("Sent bell {:?}", name);
        Ok(())
    }

    /// Block until the next bell notification and resolve it
    ///
    /// Other events are skipped; X errors reported as events are logged.
    pub fn next_bell_event(&self) -> Result<BellEvent> {
        loop {
            let (event, sequence) = self
                .conn
                .wait_for_event_with_sequence()
                .context("Failed to wait for X11 event")?;
            match event {
                Event::XkbBellNotify(bell) => {
                    let raw = RawBell::from_event(&bell, sequence);
                    let windows = X11Windows::new(&self.conn, &self.atoms, self.root);
                    let event = BellEvent::resolve(&windows, raw, &self.icon_options);
                    info!("{}", event);
                    return Ok(event);
                }
                Event::Error(error) => warn!("X11 error: {:?}", error),
                other => trace!("Ignoring event {:?}", other),
            }
        }
    }
}

impl Drop for DisplaySession {
    fn drop(&mut self) {
        debug!("Closing display {}", self.display);
    }
}
