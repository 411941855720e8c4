// Image decoders behind one prepare / decode / is_finished contract.
//
// bmp:  hand-rolled, incremental (header, then whole rows as they arrive)
// jpeg: zune-jpeg, buffers until the declared size is present
// png:  minipng, buffers until the declared size is present
//
// Codecs never touch the pixel buffer directly: they report the source
// size through DecodeSink::set_size() and paint source rectangles through
// DecodeSink::draw(), which scales and clips into the buffer.

#[cfg(feature = "bmp")]
pub mod bmp;
#[cfg(feature = "jpeg")]
pub mod jpeg;
#[cfg(feature = "png")]
pub mod png;

#[cfg(any(feature = "jpeg", feature = "png"))]
use alloc::vec::Vec;
use core::fmt;

use crate::raster::{BufferAllocator, Color, HeapAllocator, PixelBuffer};

/// Compressed container format of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// Pick from the file's magic bytes.
    #[default]
    Auto,
    Bmp,
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Detect from magic bytes. Returns `None` if unrecognized.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() >= 2 && data[..2] == *b"BM" {
            return Some(Self::Bmp);
        }
        if data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF] {
            return Some(Self::Jpeg);
        }
        if data.len() >= 8 && data[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
            return Some(Self::Png);
        }
        None
    }

    /// Case-insensitive name as used in config files.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        if name.eq_ignore_ascii_case(b"jpg") {
            return Some(Self::Jpeg);
        }
        [Self::Auto, Self::Bmp, Self::Jpeg, Self::Png]
            .into_iter()
            .find(|f| name.eq_ignore_ascii_case(f.name().as_bytes()))
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Bmp => "bmp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// Whether a decoder for this format is compiled in.
    pub const fn is_supported(self) -> bool {
        match self {
            Self::Auto => false,
            Self::Bmp => cfg!(feature = "bmp"),
            Self::Jpeg => cfg!(feature = "jpeg"),
            Self::Png => cfg!(feature = "png"),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DecodeError {
    /// Not a stream of the expected type, or structurally corrupt.
    InvalidType = -1,
    /// Valid stream using a feature the decoder does not handle.
    UnsupportedFormat = -2,
    OutOfMemory = -3,
}

impl DecodeError {
    /// Negative status code of the error.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidType => write!(f, "invalid image data"),
            DecodeError::UnsupportedFormat => write!(f, "unsupported image format"),
            DecodeError::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Decoder-side view of the pixel buffer: byte accounting plus the
/// source -> buffer coordinate mapping.
pub struct DecodeSink<'a, A: BufferAllocator = HeapAllocator> {
    image: &'a mut PixelBuffer<A>,
    // starts at 1 so a fresh sink never reads as finished
    download_size: usize,
    decoded_bytes: usize,
    src_width: usize,
    src_height: usize,
}

impl<'a, A: BufferAllocator> DecodeSink<'a, A> {
    pub fn new(image: &'a mut PixelBuffer<A>) -> Self {
        Self {
            image,
            download_size: 1,
            decoded_bytes: 0,
            src_width: 0,
            src_height: 0,
        }
    }

    pub fn download_size(&self) -> usize {
        self.download_size
    }

    pub fn decoded_bytes(&self) -> usize {
        self.decoded_bytes
    }

    pub fn is_finished(&self) -> bool {
        self.decoded_bytes == self.download_size
    }

    pub(crate) fn set_download_size(&mut self, size: usize) {
        self.download_size = size;
        self.decoded_bytes = 0;
    }

    /// Account for `n` input bytes fully processed.
    pub fn add_decoded(&mut self, n: usize) {
        self.decoded_bytes += n;
    }

    /// Report the true source dimensions; sizes the pixel buffer.
    pub fn set_size(&mut self, width: usize, height: usize) -> Result<(), DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidType);
        }
        self.image
            .ensure_capacity(width, height)
            .map_err(|_| DecodeError::OutOfMemory)?;
        self.src_width = width;
        self.src_height = height;
        log::debug!(
            "image: source {}x{} -> buffer {}x{}",
            width,
            height,
            self.image.buffer_width(),
            self.image.buffer_height()
        );
        Ok(())
    }

    /// Fill source rectangle (x, y, w, h) with `color`, scaled into the
    /// buffer and clipped to it. Overlapping calls overwrite.
    pub fn draw(&mut self, x: usize, y: usize, w: usize, h: usize, color: Color) {
        let (bw, bh) = (self.image.buffer_width(), self.image.buffer_height());
        if self.src_width == 0 || self.src_height == 0 {
            log::error!("image: draw before set_size");
            return;
        }
        let (sw, sh) = (self.src_width, self.src_height);

        let x0 = x * bw / sw;
        let y0 = y * bh / sh;
        let x1 = ((x + w) * bw).div_ceil(sw).min(bw);
        let y1 = ((y + h) * bh).div_ceil(sh).min(bh);

        for j in y0..y1 {
            for i in x0..x1 {
                self.image.draw_pixel(i as i32, j as i32, color);
            }
        }
    }

    /// Paint a fully decoded, packed 8-bit RGB (3 channels) or RGBA
    /// (4 channels) source image, one draw per horizontal run.
    pub fn draw_packed(
        &mut self,
        pixels: &[u8],
        width: usize,
        height: usize,
        channels: usize,
    ) -> Result<(), DecodeError> {
        let row_len = width * channels;
        if row_len == 0 || !(channels == 3 || channels == 4) || pixels.len() < row_len * height {
            log::error!(
                "image: {} pixel bytes short for {}x{}x{}",
                pixels.len(),
                width,
                height,
                channels
            );
            return Err(DecodeError::InvalidType);
        }
        let color_at = |px: &[u8]| {
            let w = if channels == 4 { px[3] } else { 0xFF };
            Color::rgba(px[0], px[1], px[2], w)
        };
        for (y, row) in pixels.chunks_exact(row_len).take(height).enumerate() {
            let mut run_start = 0;
            let mut run_color = color_at(&row[..channels]);
            for (x, px) in row.chunks_exact(channels).enumerate().skip(1) {
                let c = color_at(px);
                if c != run_color {
                    self.draw(run_start, y, x - run_start, 1, run_color);
                    run_start = x;
                    run_color = c;
                }
            }
            self.draw(run_start, y, width - run_start, 1, run_color);
        }
        Ok(())
    }
}

enum Codec {
    #[cfg(feature = "bmp")]
    Bmp(bmp::BmpDecoder),
    #[cfg(feature = "jpeg")]
    Jpeg(jpeg::JpegDecoder),
    #[cfg(feature = "png")]
    Png(png::PngDecoder),
}

/// One decode job: a codec bound to the pixel buffer it paints into.
pub struct Decoder<'a, A: BufferAllocator = HeapAllocator> {
    codec: Codec,
    sink: DecodeSink<'a, A>,
}

impl<'a, A: BufferAllocator> Decoder<'a, A> {
    /// Decoder for `format`; `head` (the start of the file) resolves
    /// `ImageFormat::Auto`. `None` when no decoder is compiled in.
    pub fn new(format: ImageFormat, head: &[u8], image: &'a mut PixelBuffer<A>) -> Option<Self> {
        let format = match format {
            ImageFormat::Auto => ImageFormat::detect(head)?,
            f => f,
        };
        let codec = match format {
            #[cfg(feature = "bmp")]
            ImageFormat::Bmp => {
                log::debug!("image: allocating BMP decoder");
                Codec::Bmp(bmp::BmpDecoder::new())
            }
            #[cfg(feature = "jpeg")]
            ImageFormat::Jpeg => {
                log::debug!("image: allocating JPEG decoder");
                Codec::Jpeg(jpeg::JpegDecoder::new())
            }
            #[cfg(feature = "png")]
            ImageFormat::Png => {
                log::debug!("image: allocating PNG decoder");
                Codec::Png(png::PngDecoder::new())
            }
            _ => return None,
        };
        Some(Self {
            codec,
            sink: DecodeSink::new(image),
        })
    }

    pub fn format(&self) -> ImageFormat {
        match self.codec {
            #[cfg(feature = "bmp")]
            Codec::Bmp(_) => ImageFormat::Bmp,
            #[cfg(feature = "jpeg")]
            Codec::Jpeg(_) => ImageFormat::Jpeg,
            #[cfg(feature = "png")]
            Codec::Png(_) => ImageFormat::Png,
        }
    }

    /// Initialise for a stream of `download_size` bytes. Call once.
    pub fn prepare(&mut self, download_size: usize) -> Result<(), DecodeError> {
        self.sink.set_download_size(download_size);
        match self.codec {
            #[cfg(feature = "bmp")]
            Codec::Bmp(ref mut d) => d.prepare(download_size),
            #[cfg(feature = "jpeg")]
            Codec::Jpeg(ref mut d) => d.prepare(download_size),
            #[cfg(feature = "png")]
            Codec::Png(ref mut d) => d.prepare(download_size),
        }
    }

    /// Feed bytes; returns how many were consumed. Unconsumed bytes must
    /// be offered again, ahead of new data.
    pub fn decode(&mut self, buf: &[u8]) -> Result<usize, DecodeError> {
        match self.codec {
            #[cfg(feature = "bmp")]
            Codec::Bmp(ref mut d) => d.decode(&mut self.sink, buf),
            #[cfg(feature = "jpeg")]
            Codec::Jpeg(ref mut d) => d.decode(&mut self.sink, buf),
            #[cfg(feature = "png")]
            Codec::Png(ref mut d) => d.decode(&mut self.sink, buf),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.sink.is_finished()
    }

    pub fn sink(&self) -> &DecodeSink<'a, A> {
        &self.sink
    }
}

#[cfg(any(feature = "jpeg", feature = "png"))]
/// Collects a stream that a codec can only decode in one piece.
///
/// When the first call already carries the whole stream it is decoded in
/// place; partial feeds are copied into an owned buffer reserved up front.
pub(crate) struct Accumulator {
    expected: usize,
    buf: Vec<u8>,
    done: bool,
}

#[cfg(any(feature = "jpeg", feature = "png"))]
pub(crate) enum Fed<'b> {
    /// Not complete yet; this many bytes were taken.
    Partial(usize),
    /// Whole stream available; this many bytes of the input were taken.
    Complete(&'b [u8], usize),
}

#[cfg(any(feature = "jpeg", feature = "png"))]
impl Accumulator {
    pub(crate) const fn new() -> Self {
        Self {
            expected: 0,
            buf: Vec::new(),
            done: false,
        }
    }

    pub(crate) fn prepare(&mut self, expected: usize) {
        self.expected = expected;
        self.buf = Vec::new();
        self.done = false;
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn feed<'b>(&'b mut self, input: &'b [u8]) -> Result<Fed<'b>, DecodeError> {
        if self.done {
            return Ok(Fed::Partial(0));
        }
        if self.buf.is_empty() && input.len() >= self.expected {
            self.done = true;
            return Ok(Fed::Complete(&input[..self.expected], self.expected));
        }
        if self.buf.capacity() == 0 {
            self.buf
                .try_reserve_exact(self.expected)
                .map_err(|_| DecodeError::OutOfMemory)?;
        }
        let take = input.len().min(self.expected - self.buf.len());
        self.buf.extend_from_slice(&input[..take]);
        if self.buf.len() < self.expected {
            return Ok(Fed::Partial(take));
        }
        self.done = true;
        Ok(Fed::Complete(&self.buf, take))
    }

    /// Drop the copied stream once decoded.
    pub(crate) fn clear(&mut self) {
        self.buf = Vec::new();
    }
}
