//! Icons Module
//!
//! Window icon extraction. Three sources are understood:
//! - `_NET_WM_ICON`: width, height, then packed ARGB words on the window itself
//! - WM_HINTS icon window / icon pixmap (+ mask), read back from the server
//! - legacy file round-trip: the pixmap pair written out as XPM files

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use x11rb::protocol::xproto::{Drawable, Pixmap, Window};

use crate::bell::hints::WmHints;
use crate::bell::pixels::{Bitmap, IconImage};
use crate::bell::query::WindowQuery;

/// Default cap on icon size (1 megapixel), for inline and pixmap icons alike
pub const MAX_ICON_PIXELS: u32 = 1024 * 1024;

/// File name prefix of the pixmap written by the file round-trip
pub const PIXMAP_ROLE: &str = "xbell_icon";
/// File name prefix of the mask written by the file round-trip
pub const MASK_ROLE: &str = "xbell_mask";

/// How WM_HINTS pixmap icons are handed to the notification layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconStrategy {
    /// Decode the pixmap in-process
    #[default]
    Direct,
    /// Write the pixmap to XPM files and hand over the paths
    File,
}

/// Read `_NET_WM_ICON` with three bounded fetches
///
/// The pixel fetch is bounded by the product of the first two words so a
/// corrupt or hostile property can never make us read past its first icon.
pub fn read_inline_icon<Q: WindowQuery>(
    query: &Q,
    window: Window,
    max_pixels: u32,
) -> Result<Option<IconImage>> {
    let Some(&width) = query.icon_words(window, 0, 1)?.first() else {
        return Ok(None);
    };
    let Some(&height) = query.icon_words(window, 1, 1)?.first() else {
        bail!("_NET_WM_ICON on {:#x} has no height", window);
    };
    let pixel_count = width
        .checked_mul(height)
        .filter(|&count| count > 0 && count <= max_pixels)
        .with_context(|| format!("_NET_WM_ICON size {}x{} rejected", width, height))?;

    let pixels = query.icon_words(window, 2, pixel_count)?;
    if pixels.len() != pixel_count as usize {
        bail!(
            "_NET_WM_ICON on {:#x} truncated: {} of {} pixels",
            window,
            pixels.len(),
            pixel_count
        );
    }
    debug!("Loaded _NET_WM_ICON for window {:#x}: {}x{}", window, width, height);
    Ok(Some(IconImage::from_argb(width, height, pixels)?))
}

/// Read back a drawable named by WM_HINTS
///
/// The size comes from the server's geometry reply and is checked against
/// `max_pixels` before any pixel data is requested.
fn read_drawable<Q: WindowQuery>(
    query: &Q,
    drawable: Drawable,
    max_pixels: u32,
) -> Result<Bitmap> {
    let (width, height) = query.drawable_size(drawable)?;
    if width == 0 || height == 0 {
        bail!("Drawable {:#x} has zero size", drawable);
    }
    if u32::from(width) * u32::from(height) > max_pixels {
        bail!(
            "Drawable {:#x} is {}x{}, above the {} pixel icon limit",
            drawable,
            width,
            height,
            max_pixels
        );
    }
    query.drawable_image(drawable, width, height)
}

/// Read the pixmap and optional mask named by WM_HINTS
///
/// A mask that cannot be read, or whose size differs from the pixmap, is
/// dropped and the icon becomes fully opaque.
fn read_pixmap_pair<Q: WindowQuery>(
    query: &Q,
    pixmap: Pixmap,
    mask: Option<Pixmap>,
    max_pixels: u32,
) -> Result<(Bitmap, Option<Bitmap>)> {
    let pixmap = read_drawable(query, pixmap, max_pixels)?;
    let mask = mask.and_then(|mask| match read_drawable(query, mask, max_pixels) {
        Ok(bits) if bits.width() == pixmap.width() && bits.height() == pixmap.height() => {
            Some(bits)
        }
        Ok(bits) => {
            warn!(
                "Ignoring {}x{} icon mask for {}x{} icon",
                bits.width(),
                bits.height(),
                pixmap.width(),
                pixmap.height()
            );
            None
        }
        Err(e) => {
            warn!("Failed to read icon mask {:#x}: {:#}", mask, e);
            None
        }
    });
    Ok((pixmap, mask))
}

/// Decode the WM_HINTS icon in-process
///
/// An icon window, when present, is rendered whole and wins over the pixmap.
pub fn read_hints_icon<Q: WindowQuery>(
    query: &Q,
    hints: &WmHints,
    max_pixels: u32,
) -> Result<Option<IconImage>> {
    if let Some(icon_window) = hints.icon_window {
        match read_drawable(query, icon_window, max_pixels) {
            Ok(bits) => return Ok(Some(IconImage::from_bitmaps(bits, None)?)),
            Err(e) => warn!("Failed to read icon window {:#x}: {:#}", icon_window, e),
        }
    }
    let Some(pixmap) = hints.icon_pixmap else {
        return Ok(None);
    };
    let (pixmap, mask) = read_pixmap_pair(query, pixmap, hints.icon_mask, max_pixels)?;
    Ok(Some(IconImage::from_bitmaps(pixmap, mask)?))
}

/// Temporary file deleted when dropped
#[derive(Debug)]
pub struct TempIconFile {
    path: PathBuf,
}

impl TempIconFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempIconFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove icon file {:?}: {}", self.path, e);
        }
    }
}

/// Icon pixmap (and mask) written out as XPM files, owned by one bell event
#[derive(Debug)]
pub struct IconFiles {
    pixmap: TempIconFile,
    mask: Option<TempIconFile>,
}

impl IconFiles {
    pub fn pixmap_path(&self) -> &Path {
        self.pixmap.path()
    }

    pub fn mask_path(&self) -> Option<&Path> {
        self.mask.as_ref().map(TempIconFile::path)
    }
}

/// `<dir>/<role>_<sequence>.xpm`
pub fn icon_file_path(dir: &Path, role: &str, sequence: u64) -> PathBuf {
    dir.join(format!("{}_{}.xpm", role, sequence))
}

/// Serialize a bitmap as an XPM3 image
///
/// With a mask, pixels whose mask bit is clear use the `None` colour so the
/// file carries its own transparency.
fn xpm_document(name: &str, bits: &Bitmap, mask: Option<&Bitmap>) -> String {
    let mut xpm = String::new();
    let colours = if mask.is_some() { 3 } else { 2 };
    let _ = writeln!(xpm, "/* XPM */");
    let _ = writeln!(xpm, "static char *{}[] = {{", name);
    let _ = writeln!(xpm, "\"{} {} {} 1\",", bits.width(), bits.height(), colours);
    let _ = writeln!(xpm, "\"  c #FFFFFF\",");
    let _ = writeln!(xpm, "\". c #000000\",");
    if mask.is_some() {
        let _ = writeln!(xpm, "\"- c None\",");
    }
    for y in 0..bits.height() {
        let row: String = (0..bits.width())
            .map(|x| match mask {
                Some(mask) if !mask.is_set(x, y) => '-',
                _ if bits.is_set(x, y) => '.',
                _ => ' ',
            })
            .collect();
        let separator = if y + 1 == bits.height() { "" } else { "," };
        let _ = writeln!(xpm, "\"{}\"{}", row, separator);
    }
    let _ = writeln!(xpm, "}};");
    xpm
}

fn write_xpm(
    dir: &Path,
    role: &str,
    sequence: u64,
    bits: &Bitmap,
    mask: Option<&Bitmap>,
) -> Result<TempIconFile> {
    let path = icon_file_path(dir, role, sequence);
    let name = format!("{}_{}", role, sequence);
    fs::write(&path, xpm_document(&name, bits, mask))
        .with_context(|| format!("Failed to write icon file {:?}", path))?;
    Ok(TempIconFile { path })
}

/// Legacy fallback: write the WM_HINTS pixmap pair to XPM files
///
/// Only the pixmap and mask are handled; icon windows are not written out.
/// The pixmap file already has the mask applied; the mask is also written on
/// its own for consumers that want the raw bits.
pub fn write_hints_icon<Q: WindowQuery>(
    query: &Q,
    hints: &WmHints,
    dir: &Path,
    sequence: u64,
    max_pixels: u32,
) -> Result<Option<IconFiles>> {
    let Some(pixmap) = hints.icon_pixmap else {
        return Ok(None);
    };
    let (pixmap, mask) = read_pixmap_pair(query, pixmap, hints.icon_mask, max_pixels)?;
    let pixmap_file = write_xpm(dir, PIXMAP_ROLE, sequence, &pixmap, mask.as_ref())?;
    let mask_file = match &mask {
        Some(mask) => match write_xpm(dir, MASK_ROLE, sequence, mask, None) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("{:#}", e);
                None
            }
        },
        None => None,
    };
    debug!("Wrote icon files for sequence {} to {:?}", sequence, dir);
    Ok(Some(IconFiles {
        pixmap: pixmap_file,
        mask: mask_file,
    }))
}
