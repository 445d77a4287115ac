//! Bell Event Module
//!
//! Immutable snapshot of one XKB bell notification plus the metadata resolved
//! for its window.

use std::fmt;
use tracing::warn;
use x11rb::protocol::xkb::BellNotifyEvent;
use x11rb::protocol::xproto::{Atom, Timestamp, Window};

use crate::bell::icons::IconFiles;
use crate::bell::pixels::IconImage;
use crate::bell::query::WindowQuery;
use crate::bell::resolver::{self, IconOptions, WindowAttributes};

/// Raw fields of a bell notification, before any lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBell {
    pub name: Atom,
    pub pitch: i32,
    pub percent: i32,
    pub duration: u32,
    pub bell_class: u8,
    pub bell_id: u8,
    pub event_only: bool,
    /// `None` when the server reported no window
    pub window: Option<Window>,
    pub sequence: u64,
    pub time: Timestamp,
}

impl RawBell {
    /// Extract the fields of an XKB BellNotify event
    ///
    /// `sequence` is the full (non-wrapping) sequence number of the event.
    pub fn from_event(event: &BellNotifyEvent, sequence: u64) -> Self {
        Self {
            name: event.name,
            pitch: i32::from(event.pitch),
            // percent travels as a signed byte
            percent: i32::from(event.percent as i8),
            duration: u32::from(event.duration),
            bell_class: u8::from(event.bell_class),
            bell_id: event.bell_id,
            event_only: event.event_only,
            window: (event.window != x11rb::NONE).then_some(event.window),
            sequence,
            time: event.time,
        }
    }
}

/// A captured bell and its resolved window metadata
#[derive(Debug)]
pub struct BellEvent {
    raw: RawBell,
    name: String,
    attributes: WindowAttributes,
}

impl BellEvent {
    /// Build the record: bell name, then window attributes, then icon
    pub fn resolve<Q: WindowQuery>(query: &Q, raw: RawBell, options: &IconOptions) -> Self {
        let name = match query.atom_name(raw.name) {
            Ok(name) => name.unwrap_or_default(),
            Err(e) => {
                warn!("Could not get bell name for atom {}: {:#}", raw.name, e);
                String::new()
            }
        };
        let attributes = resolver::resolve(query, raw.window, raw.sequence, options);
        Self {
            raw,
            name,
            attributes,
        }
    }

    /// Bell name (ISO-8859-1 atom name), empty if the bell had none
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window_name(&self) -> &str {
        &self.attributes.title
    }

    /// Host the emitting client runs on, empty if unknown
    pub fn host_name(&self) -> &str {
        &self.attributes.host_name
    }

    pub fn pitch(&self) -> i32 {
        self.raw.pitch
    }

    /// Volume, -100..=100
    pub fn percent(&self) -> i32 {
        self.raw.percent
    }

    pub fn duration(&self) -> u32 {
        self.raw.duration
    }

    pub fn bell_class(&self) -> u8 {
        self.raw.bell_class
    }

    pub fn bell_id(&self) -> u8 {
        self.raw.bell_id
    }

    /// True if no audible bell was rung
    pub fn event_only(&self) -> bool {
        self.raw.event_only
    }

    /// Window as reported by the server
    pub fn window(&self) -> Option<Window> {
        self.raw.window
    }

    /// Window the metadata was read from
    pub fn resolved_window(&self) -> Window {
        self.attributes.window
    }

    pub fn sequence(&self) -> u64 {
        self.raw.sequence
    }

    pub fn time(&self) -> Timestamp {
        self.raw.time
    }

    pub fn image(&self) -> Option<&IconImage> {
        self.attributes.icon.image()
    }

    pub fn icon_files(&self) -> Option<&IconFiles> {
        self.attributes.icon.files()
    }
}

impl fmt::Display for BellEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bell '{}' from window {:#x} '{}'",
            self.name(),
            self.resolved_window(),
            self.window_name()
        )?;
        if !self.host_name().is_empty() {
            write!(f, " on {}", self.host_name())?;
        }
        write!(
            f,
            " (percent {}, pitch {}, duration {}{})",
            self.percent(),
            self.pitch(),
            self.duration(),
            if self.event_only() { ", event only" } else { "" }
        )
    }
}
