//! Pixels Module
//!
//! Normalizes window icons into the ARGB byte layout handed to the
//! notification layer (1 alpha byte + 3 colour bytes, row-major).

use thiserror::Error;

/// Errors raised while building an [`IconImage`] from native data
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("icon has zero size ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("expected {expected} pixels, got {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("mask is {mask_width}x{mask_height}, icon is {width}x{height}")]
    MaskMismatch {
        width: u32,
        height: u32,
        mask_width: u32,
        mask_height: u32,
    },
}

/// Errors raised by [`IconImage::render`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("region {width}x{height}+{x}+{y} exceeds {image_width}x{image_height} image")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[error("output buffer holds {found} bytes, region needs {needed}")]
    BufferTooSmall { needed: usize, found: usize },
}

/// Raw pixel values read back from a pixmap or window
///
/// Values are whatever the server reported for the drawable's depth; only
/// zero versus non-zero is meaningful for icon decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Empty { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(ImageError::LengthMismatch {
                expected,
                found: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Build a bitmap by sampling `pixel(x, y)` for every position
    pub fn from_fn(
        width: u32,
        height: u32,
        mut pixel: impl FnMut(u32, u32) -> u32,
    ) -> Result<Self, ImageError> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(pixel(x, y));
            }
        }
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel at (x, y) is non-zero
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.pixels[(y * self.width + x) as usize] != 0
    }
}

#[derive(Debug, Clone)]
enum PixelData {
    /// Packed 0xAARRGGBB words, as stored in `_NET_WM_ICON`
    Argb(Vec<u32>),
    /// Monochrome pixmap plus optional 1-bit mask of the same size
    Mono { pixmap: Bitmap, mask: Option<Bitmap> },
}

/// Pull-based icon image owned by a bell event
#[derive(Debug, Clone)]
pub struct IconImage {
    width: u32,
    height: u32,
    data: PixelData,
}

impl IconImage {
    /// Wrap `width * height` packed ARGB words
    pub fn from_argb(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Empty { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(ImageError::LengthMismatch {
                expected,
                found: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: PixelData::Argb(pixels),
        })
    }

    /// Wrap a monochrome pixmap and its optional mask
    pub fn from_bitmaps(pixmap: Bitmap, mask: Option<Bitmap>) -> Result<Self, ImageError> {
        if let Some(mask) = &mask {
            if mask.width != pixmap.width || mask.height != pixmap.height {
                return Err(ImageError::MaskMismatch {
                    width: pixmap.width,
                    height: pixmap.height,
                    mask_width: mask.width,
                    mask_height: mask.height,
                });
            }
        }
        Ok(Self {
            width: pixmap.width,
            height: pixmap.height,
            data: PixelData::Mono { pixmap, mask },
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes needed to hold the whole image
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn argb_at(&self, x: u32, y: u32) -> [u8; 4] {
        match &self.data {
            PixelData::Argb(pixels) => pixels[(y * self.width + x) as usize].to_be_bytes(),
            PixelData::Mono { pixmap, mask } => {
                // Only 1-bit icons are supported: any set pixel is foreground.
                let value = if pixmap.is_set(x, y) { 0x00 } else { 0xff };
                let alpha = match mask {
                    Some(mask) if !mask.is_set(x, y) => 0x00,
                    _ => 0xff,
                };
                [alpha, value, value, value]
            }
        }
    }

    /// Fill `out` with ARGB bytes for the rectangle `[x, x+width) x [y, y+height)`
    pub fn render(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        out: &mut [u8],
    ) -> Result<(), RenderError> {
        let fits = x.checked_add(width).is_some_and(|right| right <= self.width)
            && y.checked_add(height).is_some_and(|bottom| bottom <= self.height);
        if !fits {
            return Err(RenderError::OutOfBounds {
                x,
                y,
                width,
                height,
                image_width: self.width,
                image_height: self.height,
            });
        }
        let needed = width as usize * height as usize * 4;
        if out.len() < needed {
            return Err(RenderError::BufferTooSmall {
                needed,
                found: out.len(),
            });
        }

        let mut chunks = out.chunks_exact_mut(4);
        for row in y..y + height {
            for column in x..x + width {
                if let Some(chunk) = chunks.next() {
                    chunk.copy_from_slice(&self.argb_at(column, row));
                }
            }
        }
        Ok(())
    }

    /// Render the whole image
    pub fn render_all(&self, out: &mut [u8]) -> Result<(), RenderError> {
        self.render(0, 0, self.width, self.height, out)
    }
}

#[cfg(test)]
impl IconImage {
    /// Whole image as a freshly allocated ARGB buffer
    pub fn to_argb(&self) -> Vec<u8> {
        let mut out = vec![0; self.byte_len()];
        self.render_all(&mut out).unwrap();
        out
    }
}
