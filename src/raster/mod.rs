// Display-native raster storage.
// buffer: owned pixel buffer, allocation policy, addressing
// writer: RGBA -> stored encoding (binary, gray, rgb565, rgb[a])
// blit:   stored encoding -> embedded-graphics DrawTarget
//
// All encodings are packed row-major. Binary rows are padded to a
// whole byte; every other format has no row padding.

pub mod blit;
pub mod buffer;
pub mod writer;

pub use blit::{DisplayColor, StaticImage};
pub use buffer::{AllocError, BufferAllocator, HeapAllocator, PixelBuffer};
pub use writer::write_pixel;

use core::fmt;

/// Destination encoding of the pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 1 bit per pixel, MSB first, rows padded to a byte.
    Binary,
    /// 8-bit luma.
    Grayscale,
    /// 16-bit big-endian RGB565.
    #[default]
    Rgb565,
    /// 8 bits per channel.
    Rgb,
    /// 8 bits per channel plus an alpha byte.
    Rgba,
}

impl PixelFormat {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Grayscale => "grayscale",
            Self::Rgb565 => "rgb565",
            Self::Rgb => "rgb",
            Self::Rgba => "rgba",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How transparent source pixels are represented in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transparency {
    #[default]
    Opaque,
    /// A reserved color value marks transparent pixels.
    ChromaKey,
    /// An extra alpha byte is stored per pixel (binary: forced off).
    AlphaChannel,
}

impl Transparency {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Opaque => "opaque",
            Self::ChromaKey => "chroma_key",
            Self::AlphaChannel => "alpha_channel",
        }
    }
}

/// 8-bit RGB source color with an alpha weight `w` (0xFF = opaque).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(0xFF, 0xFF, 0xFF);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, w: 0xFF }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self { r, g, b, w }
    }

    #[inline]
    pub const fn is_transparent(self) -> bool {
        self.w < 0x80
    }
}

/// Pixel format plus transparency mode; fixes bits per pixel and stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout {
    pub format: PixelFormat,
    pub transparency: Transparency,
}

impl Layout {
    pub const fn new(format: PixelFormat, transparency: Transparency) -> Self {
        Self {
            format,
            transparency,
        }
    }

    /// Whether a raw alpha byte follows the color bytes.
    #[inline]
    pub const fn stores_alpha(self) -> bool {
        match self.format {
            PixelFormat::Rgba => true,
            PixelFormat::Rgb565 | PixelFormat::Rgb => {
                matches!(self.transparency, Transparency::AlphaChannel)
            }
            PixelFormat::Binary | PixelFormat::Grayscale => false,
        }
    }

    pub const fn bits_per_pixel(self) -> usize {
        let alpha = if self.stores_alpha() { 8 } else { 0 };
        match self.format {
            PixelFormat::Binary => 1,
            PixelFormat::Grayscale => 8,
            PixelFormat::Rgb565 => 16 + alpha,
            PixelFormat::Rgb | PixelFormat::Rgba => 24 + alpha,
        }
    }

    /// Bytes per row; binary rows round up to a whole byte.
    #[inline]
    pub const fn stride(self, width: usize) -> usize {
        (self.bits_per_pixel() * width).div_ceil(8)
    }

    /// Exact byte size of a `width` x `height` raster; `None` when it
    /// does not fit in `usize`.
    #[inline]
    pub const fn buffer_size(self, width: usize, height: usize) -> Option<usize> {
        let Some(bits) = self.bits_per_pixel().checked_mul(width) else {
            return None;
        };
        bits.div_ceil(8).checked_mul(height)
    }

    /// Byte offset of the first byte of pixel (x, y). For binary this is
    /// the byte holding the pixel's bit.
    #[inline]
    pub const fn offset(self, x: usize, y: usize, width: usize) -> usize {
        match self.format {
            PixelFormat::Binary => y * self.stride(width) + x / 8,
            _ => (x + y * width) * self.bits_per_pixel() / 8,
        }
    }

    pub(crate) const fn transparent_key(self) -> bool {
        matches!(self.transparency, Transparency::ChromaKey)
    }

    pub(crate) const fn alpha_channel(self) -> bool {
        matches!(self.transparency, Transparency::AlphaChannel)
    }
}

/// Borrowed, fully decoded raster.
#[derive(Debug, Clone, Copy)]
pub struct RasterView<'a> {
    pub data: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub layout: Layout,
}

impl<'a> RasterView<'a> {
    /// Read back pixel (x, y). Transparent pixels come back with `w == 0`.
    /// Binary pixels read as white (on) or black (off).
    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let pos = self.layout.offset(x, y, self.width);
        let d = self.data;
        let keyed = self.layout.transparent_key();

        let color = match self.layout.format {
            PixelFormat::Binary => {
                let bit = 0x80 >> (x % 8);
                if *d.get(pos)? & bit != 0 {
                    Color::WHITE
                } else {
                    Color::BLACK
                }
            }
            PixelFormat::Grayscale => {
                let g = *d.get(pos)?;
                if keyed && g == 1 {
                    Color::TRANSPARENT
                } else if self.layout.alpha_channel() {
                    // alpha overrides luma on store; read it back as opacity
                    Color::rgba(g, g, g, g)
                } else {
                    Color::rgb(g, g, g)
                }
            }
            PixelFormat::Rgb565 => {
                let px = d.get(pos..pos + 2)?;
                let raw = u16::from_be_bytes([px[0], px[1]]);
                let r5 = (raw >> 11) as u8 & 0x1F;
                let g6 = (raw >> 5) as u8 & 0x3F;
                let b5 = raw as u8 & 0x1F;
                let w = if self.layout.stores_alpha() {
                    *d.get(pos + 2)?
                } else {
                    0xFF
                };
                if keyed && r5 == 0 && g6 == 1 && b5 == 0 {
                    Color::TRANSPARENT
                } else {
                    Color::rgba(
                        (r5 << 3) | (r5 >> 2),
                        (g6 << 2) | (g6 >> 4),
                        (b5 << 3) | (b5 >> 2),
                        w,
                    )
                }
            }
            PixelFormat::Rgb | PixelFormat::Rgba => {
                let px = d.get(pos..pos + 3)?;
                let w = if self.layout.stores_alpha() {
                    *d.get(pos + 3)?
                } else {
                    0xFF
                };
                if keyed && px == [0, 1, 0] {
                    Color::TRANSPARENT
                } else {
                    Color::rgba(px[0], px[1], px[2], w)
                }
            }
        };
        Some(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_bits_per_pixel() {
        let bin = Layout::new(PixelFormat::Binary, Transparency::Opaque);
        assert_eq!(bin.buffer_size(10, 3), Some(2 * 3));
        assert_eq!(bin.buffer_size(16, 2), Some(4));

        let gray = Layout::new(PixelFormat::Grayscale, Transparency::AlphaChannel);
        assert_eq!(gray.buffer_size(10, 10), Some(100));

        let rgb565 = Layout::new(PixelFormat::Rgb565, Transparency::Opaque);
        assert_eq!(rgb565.buffer_size(10, 10), Some(200));
        let rgb565a = Layout::new(PixelFormat::Rgb565, Transparency::AlphaChannel);
        assert_eq!(rgb565a.buffer_size(10, 10), Some(300));

        let rgb = Layout::new(PixelFormat::Rgb, Transparency::ChromaKey);
        assert_eq!(rgb.buffer_size(4, 4), Some(48));
        let rgba = Layout::new(PixelFormat::Rgba, Transparency::Opaque);
        assert_eq!(rgba.buffer_size(4, 4), Some(64));
    }

    #[test]
    fn oversized_raster_has_no_size() {
        let rgb565 = Layout::new(PixelFormat::Rgb565, Transparency::Opaque);
        assert_eq!(rgb565.buffer_size(usize::MAX / 8, 2), None);
        assert_eq!(rgb565.buffer_size(usize::MAX / 64, usize::MAX / 64), None);
        assert_eq!(rgb565.buffer_size(0, 2), Some(0));
    }

    #[test]
    fn binary_offset_uses_padded_stride() {
        let bin = Layout::new(PixelFormat::Binary, Transparency::Opaque);
        // width 10 -> 2 bytes per row
        assert_eq!(bin.offset(0, 1, 10), 2);
        assert_eq!(bin.offset(9, 1, 10), 3);
    }

    #[test]
    fn rgb_offset_is_linear() {
        let rgb = Layout::new(PixelFormat::Rgb, Transparency::Opaque);
        assert_eq!(rgb.offset(2, 1, 4), (2 + 4) * 3);
    }
}
