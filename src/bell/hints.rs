//! Hints Module
//!
//! WM_HINTS decoding (XWMHints equivalent), limited to the icon fields.

use bitflags::bitflags;
use x11rb::protocol::xproto::{Pixmap, Window};

/// WM_HINTS holds 9 32-bit values
pub const WM_HINTS_LEN: u32 = 9;

bitflags! {
    /// XWMHints.flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WmHintsFlags: u32 {
        const INPUT         = 1 << 0;
        const STATE         = 1 << 1;
        const ICON_PIXMAP   = 1 << 2;
        const ICON_WINDOW   = 1 << 3;
        const ICON_POSITION = 1 << 4;
        const ICON_MASK     = 1 << 5;
        const WINDOW_GROUP  = 1 << 6;
        const URGENCY       = 1 << 8;
    }
}

/// Icon-related part of a window's WM_HINTS
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WmHints {
    pub icon_pixmap: Option<Pixmap>,
    pub icon_window: Option<Window>,
    pub icon_mask: Option<Pixmap>,
}

impl WmHints {
    /// Decode the raw property words; `None` if the property is truncated.
    ///
    /// A field only counts when its flag bit is set and the handle is non-zero.
    pub fn from_words(values: &[u32]) -> Option<Self> {
        if values.len() < WM_HINTS_LEN as usize {
            return None;
        }
        let flags = WmHintsFlags::from_bits_truncate(values[0]);
        let pick = |flag: WmHintsFlags, value: u32| {
            (flags.contains(flag) && value != 0).then_some(value)
        };
        Some(Self {
            icon_pixmap: pick(WmHintsFlags::ICON_PIXMAP, values[3]),
            icon_window: pick(WmHintsFlags::ICON_WINDOW, values[4]),
            icon_mask: pick(WmHintsFlags::ICON_MASK, values[7]),
        })
    }
}
