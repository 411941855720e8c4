// Stored raster -> embedded-graphics DrawTarget.
// Transparent pixels are skipped; binary rasters map to on/off colors.

use embedded_graphics::prelude::{DrawTarget, Pixel, Point};
use embedded_graphics_core::pixelcolor::{BinaryColor, Gray8, Rgb565, Rgb888};

use super::{Layout, PixelFormat, RasterView, writer};

/// Display colors a stored pixel can be converted to.
pub trait DisplayColor: embedded_graphics_core::pixelcolor::PixelColor {
    fn from_rgb(r: u8, g: u8, b: u8) -> Self;
}

impl DisplayColor for BinaryColor {
    fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        if writer::is_color_on(super::Color::rgb(r, g, b)) {
            BinaryColor::On
        } else {
            BinaryColor::Off
        }
    }
}

impl DisplayColor for Gray8 {
    fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Gray8::new(writer::luma(super::Color::rgb(r, g, b)))
    }
}

impl DisplayColor for Rgb565 {
    fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Rgb565::new(r >> 3, g >> 2, b >> 3)
    }
}

impl DisplayColor for Rgb888 {
    fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Rgb888::new(r, g, b)
    }
}

/// Compiled-in raster, e.g. a placeholder shown until a load succeeds.
#[derive(Debug, Clone, Copy)]
pub struct StaticImage {
    data: &'static [u8],
    width: usize,
    height: usize,
    layout: Layout,
}

impl StaticImage {
    /// `None` when `data` is shorter than the layout requires.
    pub const fn new(data: &'static [u8], width: usize, height: usize, layout: Layout) -> Option<Self> {
        match layout.buffer_size(width, height) {
            Some(size) if data.len() >= size => {}
            _ => return None,
        }
        Some(Self {
            data,
            width,
            height,
            layout,
        })
    }

    pub fn view(&self) -> RasterView<'static> {
        RasterView {
            data: self.data,
            width: self.width,
            height: self.height,
            layout: self.layout,
        }
    }
}

/// Draw `view` with its top-left corner at `origin`.
pub fn draw_raster<D>(
    view: &RasterView<'_>,
    origin: Point,
    target: &mut D,
    color_on: D::Color,
    color_off: D::Color,
) -> Result<(), D::Error>
where
    D: DrawTarget,
    D::Color: DisplayColor,
{
    let binary = view.layout.format == PixelFormat::Binary;
    let pixels = (0..view.height).flat_map(move |y| (0..view.width).map(move |x| (x, y)));
    target.draw_iter(pixels.filter_map(|(x, y)| {
        let c = view.pixel(x, y)?;
        let color = if binary {
            if c.r != 0 { color_on } else { color_off }
        } else {
            if c.is_transparent() {
                return None;
            }
            D::Color::from_rgb(c.r, c.g, c.b)
        };
        Some(Pixel(origin + Point::new(x as i32, y as i32), color))
    }))
}
