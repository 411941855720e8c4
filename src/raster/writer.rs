// RGBA -> display-native pixel encoding.
//
// One branch per pixel format, picked per call from the buffer layout.
// Callers pass buffer-local coordinates; bounds are checked here because
// decoder scale factors cannot be trusted to clip exactly.

use embedded_graphics_core::pixelcolor::{IntoStorage, Rgb565};

use super::{Color, Layout, PixelFormat};

// reserved chroma-key green for 8-bit channels; RGB565 uses 4 so the key
// survives the 6-bit green quantisation (4 >> 2 == 1)
const KEY_GREEN_RGB: u8 = 1;
const KEY_GREEN_RGB565: u8 = 4;

// ~0.25 R + 0.5 G + 0.25 B, top bit decides
#[inline]
pub fn is_color_on(color: Color) -> bool {
    ((color.r >> 2) as u32 + (color.g >> 1) as u32 + (color.b >> 2) as u32) & 0x80 != 0
}

// 0.2125 R + 0.7154 G + 0.0721 B, truncated; integer form keeps it exact
#[inline]
pub fn luma(color: Color) -> u8 {
    ((2125 * color.r as u32 + 7154 * color.g as u32 + 721 * color.b as u32) / 10_000) as u8
}

/// Apply chroma-key remapping for RGB565 / RGB buffers.
///
/// A genuine key-colored source pixel is pushed to black so it cannot be
/// mistaken for transparency later; a transparent source pixel becomes
/// the key.
pub fn map_chroma_key(color: &mut Color, format: PixelFormat) {
    if color.r == 0 && color.g == 1 && color.b == 0 {
        color.g = 0;
    }
    if color.is_transparent() {
        color.r = 0;
        color.g = if format == PixelFormat::Rgb565 {
            KEY_GREEN_RGB565
        } else {
            KEY_GREEN_RGB
        };
        color.b = 0;
    }
}

#[inline]
fn color_to_565(color: Color) -> u16 {
    Rgb565::new(color.r >> 3, color.g >> 2, color.b >> 3).into_storage()
}

/// Encode `color` into `buf` at (x, y) of a `width` x `height` raster.
///
/// Returns false (and writes nothing) when (x, y) lies outside the raster
/// or the buffer is too short for the layout.
pub fn write_pixel(
    buf: &mut [u8],
    layout: Layout,
    width: usize,
    height: usize,
    x: i32,
    y: i32,
    mut color: Color,
) -> bool {
    if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
        log::warn!("image: pixel ({}, {}) outside {}x{} buffer", x, y, width, height);
        return false;
    }
    let (x, y) = (x as usize, y as usize);
    let pos = layout.offset(x, y, width);
    let bytes = layout.bits_per_pixel().div_ceil(8);
    if pos + bytes > buf.len() {
        log::error!("image: pixel ({}, {}) past end of {}B buffer", x, y, buf.len());
        return false;
    }

    match layout.format {
        PixelFormat::Binary => {
            let bit = 0x80u8 >> (x % 8);
            let mut on = is_color_on(color);
            if layout.alpha_channel() && color.is_transparent() {
                on = false;
            }
            if on {
                buf[pos] |= bit;
            } else {
                buf[pos] &= !bit;
            }
        }
        PixelFormat::Grayscale => {
            let mut gray = luma(color);
            if layout.transparent_key() {
                if gray == 1 {
                    gray = 0;
                }
                if color.is_transparent() {
                    gray = 1;
                }
            } else if layout.alpha_channel() && color.w != 0xFF {
                gray = color.w;
            }
            buf[pos] = gray;
        }
        PixelFormat::Rgb565 => {
            if layout.transparent_key() {
                map_chroma_key(&mut color, layout.format);
            }
            let [hi, lo] = color_to_565(color).to_be_bytes();
            buf[pos] = hi;
            buf[pos + 1] = lo;
            if layout.stores_alpha() {
                buf[pos + 2] = color.w;
            }
        }
        PixelFormat::Rgb | PixelFormat::Rgba => {
            if layout.transparent_key() {
                map_chroma_key(&mut color, layout.format);
            }
            buf[pos] = color.r;
            buf[pos + 1] = color.g;
            buf[pos + 2] = color.b;
            if layout.stores_alpha() {
                buf[pos + 3] = color.w;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{RasterView, Transparency};

    fn raster(format: PixelFormat, transparency: Transparency, w: usize, h: usize) -> (Layout, Vec<u8>) {
        let layout = Layout::new(format, transparency);
        (layout, vec![0u8; layout.buffer_size(w, h).unwrap()])
    }

    #[test]
    fn binary_white_sets_bit() {
        let (layout, mut buf) = raster(PixelFormat::Binary, Transparency::Opaque, 10, 2);
        assert!(write_pixel(&mut buf, layout, 10, 2, 9, 1, Color::WHITE));
        // row stride 2 bytes, x=9 -> second byte, bit 1
        assert_eq!(buf, [0, 0, 0, 0x40]);
    }

    #[test]
    fn binary_alpha_zero_clears_bit_regardless_of_luma() {
        let (layout, mut buf) = raster(PixelFormat::Binary, Transparency::AlphaChannel, 8, 1);
        buf[0] = 0xFF;
        write_pixel(&mut buf, layout, 8, 1, 0, 0, Color::rgba(255, 255, 255, 0));
        assert_eq!(buf[0], 0x7F);
    }

    #[test]
    fn binary_ignores_alpha_without_alpha_channel() {
        let (layout, mut buf) = raster(PixelFormat::Binary, Transparency::ChromaKey, 8, 1);
        write_pixel(&mut buf, layout, 8, 1, 3, 0, Color::rgba(255, 255, 255, 0));
        assert_eq!(buf[0], 0x10);
    }

    #[test]
    fn binary_uses_fast_luma_threshold() {
        assert!(!is_color_on(Color::rgb(0x7F, 0x7F, 0x7F)));
        assert!(is_color_on(Color::rgb(0x80, 0x80, 0x80)));
        // 0x7F + 0 + 0: pure green stays just under the threshold
        assert!(!is_color_on(Color::rgb(0, 0xFF, 0)));
        assert!(is_color_on(Color::rgb(0x04, 0xFF, 0)));
        assert!(!is_color_on(Color::rgb(0xFF, 0, 0xFF)));
    }

    #[test]
    fn grayscale_luma_is_weighted_and_truncated() {
        assert_eq!(luma(Color::WHITE), 255);
        assert_eq!(luma(Color::rgb(255, 0, 0)), 54);
        assert_eq!(luma(Color::rgb(0, 255, 0)), 182);
        assert_eq!(luma(Color::rgb(0, 0, 255)), 18);
    }

    #[test]
    fn grayscale_chroma_key_reserves_one() {
        let (layout, mut buf) = raster(PixelFormat::Grayscale, Transparency::ChromaKey, 3, 1);
        // luma 1 remaps to 0
        write_pixel(&mut buf, layout, 3, 1, 0, 0, Color::rgb(0, 2, 0));
        write_pixel(&mut buf, layout, 3, 1, 1, 0, Color::rgba(200, 200, 200, 0x10));
        write_pixel(&mut buf, layout, 3, 1, 2, 0, Color::rgb(100, 100, 100));
        assert_eq!(luma(Color::rgb(0, 2, 0)), 1);
        assert_eq!(buf, [0, 1, 100]);
    }

    #[test]
    fn grayscale_alpha_channel_stores_alpha() {
        let (layout, mut buf) = raster(PixelFormat::Grayscale, Transparency::AlphaChannel, 2, 1);
        write_pixel(&mut buf, layout, 2, 1, 0, 0, Color::rgba(255, 255, 255, 0x40));
        write_pixel(&mut buf, layout, 2, 1, 1, 0, Color::rgb(100, 100, 100));
        assert_eq!(buf, [0x40, 100]);
    }

    #[test]
    fn rgb565_is_big_endian_with_optional_alpha() {
        let (layout, mut buf) = raster(PixelFormat::Rgb565, Transparency::Opaque, 1, 1);
        write_pixel(&mut buf, layout, 1, 1, 0, 0, Color::rgb(0xFF, 0, 0));
        assert_eq!(buf, [0xF8, 0x00]);

        let (layout, mut buf) = raster(PixelFormat::Rgb565, Transparency::AlphaChannel, 1, 1);
        write_pixel(&mut buf, layout, 1, 1, 0, 0, Color::rgba(0, 0, 0xFF, 0x33));
        assert_eq!(buf, [0x00, 0x1F, 0x33]);
    }

    #[test]
    fn rgb565_transparent_pixel_becomes_key() {
        let (layout, mut buf) = raster(PixelFormat::Rgb565, Transparency::ChromaKey, 1, 1);
        write_pixel(&mut buf, layout, 1, 1, 0, 0, Color::rgba(0xFF, 0xFF, 0xFF, 0));
        // g = 4 -> 6-bit green 1 -> 0x0020
        assert_eq!(buf, [0x00, 0x20]);
        let view = RasterView { data: &buf, width: 1, height: 1, layout };
        assert_eq!(view.pixel(0, 0), Some(Color::TRANSPARENT));
    }

    #[test]
    fn rgb_genuine_key_color_is_shifted_to_black() {
        let (layout, mut buf) = raster(PixelFormat::Rgb, Transparency::ChromaKey, 2, 1);
        write_pixel(&mut buf, layout, 2, 1, 0, 0, Color::rgb(0, 1, 0));
        write_pixel(&mut buf, layout, 2, 1, 1, 0, Color::rgba(9, 9, 9, 0x7F));
        assert_eq!(buf, [0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn rgb_key_color_kept_without_chroma_key() {
        let (layout, mut buf) = raster(PixelFormat::Rgb, Transparency::Opaque, 1, 1);
        write_pixel(&mut buf, layout, 1, 1, 0, 0, Color::rgb(0, 1, 0));
        assert_eq!(buf, [0, 1, 0]);
    }

    #[test]
    fn rgba_always_stores_alpha() {
        let (layout, mut buf) = raster(PixelFormat::Rgba, Transparency::Opaque, 1, 1);
        write_pixel(&mut buf, layout, 1, 1, 0, 0, Color::rgba(1, 2, 3, 4));
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn out_of_bounds_is_a_no_op() {
        let (layout, mut buf) = raster(PixelFormat::Rgb, Transparency::Opaque, 2, 2);
        assert!(!write_pixel(&mut buf, layout, 2, 2, -1, 0, Color::WHITE));
        assert!(!write_pixel(&mut buf, layout, 2, 2, 0, 2, Color::WHITE));
        assert!(!write_pixel(&mut buf, layout, 2, 2, 2, 0, Color::WHITE));
        assert!(buf.iter().all(|&b| b == 0));
    }
}
