//! Window Query Module
//!
//! The read path into the X server used while resolving a bell event: window
//! names, client machine, `_NET_WM_ICON` words, WM_HINTS and pixmap read-back.
//! Resolution code talks to [`WindowQuery`] so it can run against the real
//! connection or an in-memory fake.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::image::Image;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Drawable, Window};

use crate::bell::hints::{WM_HINTS_LEN, WmHints};
use crate::bell::pixels::Bitmap;

/// Upper bound on text properties, in 32-bit units
const MAX_TEXT_LEN: u32 = 1024;

/// Read-only window metadata lookups needed to resolve a bell event
pub trait WindowQuery {
    /// Root window of the default screen
    fn root_window(&self) -> Window;

    /// Name of an atom, `None` for atom 0
    fn atom_name(&self, atom: Atom) -> Result<Option<String>>;

    /// `_NET_WM_NAME`, falling back to `WM_NAME`
    fn window_title(&self, window: Window) -> Result<Option<String>>;

    /// `WM_CLIENT_MACHINE`
    fn client_machine(&self, window: Window) -> Result<Option<String>>;

    /// Up to `length` words of `_NET_WM_ICON` starting at word `offset`.
    /// Empty if the property is missing.
    fn icon_words(&self, window: Window, offset: u32, length: u32) -> Result<Vec<u32>>;

    /// Parsed WM_HINTS, `None` if the window has none
    fn wm_hints(&self, window: Window) -> Result<Option<WmHints>>;

    /// Width and height of a pixmap or window
    fn drawable_size(&self, drawable: Drawable) -> Result<(u16, u16)>;

    /// Read back a `width` x `height` pixmap or window from its origin
    fn drawable_image(&self, drawable: Drawable, width: u16, height: u16) -> Result<Bitmap>;
}

/// Interned atoms used by the read path
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    pub net_wm_name: Atom,
    pub net_wm_icon: Atom,
    pub utf8_string: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            net_wm_name: intern("_NET_WM_NAME")?,
            net_wm_icon: intern("_NET_WM_ICON")?,
            utf8_string: intern("UTF8_STRING")?,
        })
    }
}

/// Decode an ISO-8859-1 property value, dropping trailing NULs
pub fn latin1(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    bytes[..end].iter().map(|&b| char::from(b)).collect()
}

/// Decode a text property by its actual type: UTF8_STRING as UTF-8, anything
/// else (STRING, COMPOUND_TEXT) as ISO-8859-1
pub fn decode_text(value: &[u8], type_: Atom, utf8_string: Atom) -> String {
    if type_ == utf8_string {
        let end = value.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&value[..end]).into_owned()
    } else {
        latin1(value)
    }
}

/// [`WindowQuery`] backed by a live X connection
pub struct X11Windows<'a, C> {
    conn: &'a C,
    atoms: &'a Atoms,
    root: Window,
}

impl<'a, C: Connection> X11Windows<'a, C> {
    pub fn new(conn: &'a C, atoms: &'a Atoms, root: Window) -> Self {
        Self { conn, atoms, root }
    }

    /// Read a format-8 text property and decode it by its reported type
    fn text_property(
        &self,
        window: Window,
        property: impl Into<Atom>,
        type_: impl Into<Atom>,
    ) -> Result<Option<String>> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, MAX_TEXT_LEN)?
            .reply()?;
        if reply.format != 8 || reply.value.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_text(
            &reply.value,
            reply.type_,
            self.atoms.utf8_string,
        )))
    }
}

impl<C: Connection> WindowQuery for X11Windows<'_, C> {
    fn root_window(&self) -> Window {
        self.root
    }

    fn atom_name(&self, atom: Atom) -> Result<Option<String>> {
        if atom == x11rb::NONE {
            return Ok(None);
        }
        let reply = self.conn.get_atom_name(atom)?.reply()?;
        Ok(Some(latin1(&reply.name)))
    }

    fn window_title(&self, window: Window) -> Result<Option<String>> {
        if let Some(title) =
            self.text_property(window, self.atoms.net_wm_name, self.atoms.utf8_string)?
        {
            return Ok(Some(title));
        }
        self.text_property(window, AtomEnum::WM_NAME, AtomEnum::ANY)
    }

    fn client_machine(&self, window: Window) -> Result<Option<String>> {
        // Clients store this as STRING, UTF8_STRING or COMPOUND_TEXT.
        self.text_property(window, AtomEnum::WM_CLIENT_MACHINE, AtomEnum::ANY)
    }

    fn icon_words(&self, window: Window, offset: u32, length: u32) -> Result<Vec<u32>> {
        let reply = self
            .conn
            .get_property(
                false,
                window,
                self.atoms.net_wm_icon,
                AtomEnum::CARDINAL,
                offset,
                length,
            )?
            .reply()?;
        Ok(reply
            .value32()
            .map(|values| values.take(length as usize).collect())
            .unwrap_or_default())
    }

    fn wm_hints(&self, window: Window) -> Result<Option<WmHints>> {
        let reply = self
            .conn
            .get_property(
                false,
                window,
                AtomEnum::WM_HINTS,
                AtomEnum::WM_HINTS,
                0,
                WM_HINTS_LEN,
            )?
            .reply()?;
        Ok(reply
            .value32()
            .and_then(|values| WmHints::from_words(&values.collect::<Vec<_>>())))
    }

    fn drawable_size(&self, drawable: Drawable) -> Result<(u16, u16)> {
        let geometry = self
            .conn
            .get_geometry(drawable)?
            .reply()
            .with_context(|| format!("Failed to get geometry of drawable {:#x}", drawable))?;
        Ok((geometry.width, geometry.height))
    }

    fn drawable_image(&self, drawable: Drawable, width: u16, height: u16) -> Result<Bitmap> {
        let (image, _visual) = Image::get(self.conn, drawable, 0, 0, width, height)
            .with_context(|| format!("Failed to read back drawable {:#x}", drawable))?;
        Ok(Bitmap::from_fn(u32::from(width), u32::from(height), |x, y| {
            image.get_pixel(x as u16, y as u16)
        })?)
    }
}
