// Baseline and progressive JPEG via zune-jpeg.
//
// Like PNG, the stream is decoded in one piece once the declared size is
// present. Output is requested as packed RGB; JPEG carries no alpha.

use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;

use super::{Accumulator, DecodeError, DecodeSink, Fed};
use crate::raster::BufferAllocator;

pub struct JpegDecoder {
    input: Accumulator,
}

impl Default for JpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegDecoder {
    pub const fn new() -> Self {
        Self {
            input: Accumulator::new(),
        }
    }

    pub fn prepare(&mut self, download_size: usize) -> Result<(), DecodeError> {
        // SOI + EOI at the very least
        if download_size < 4 {
            log::error!("jpeg: {} bytes is too short", download_size);
            return Err(DecodeError::InvalidType);
        }
        self.input.prepare(download_size);
        Ok(())
    }

    pub fn decode<A: BufferAllocator>(
        &mut self,
        sink: &mut DecodeSink<'_, A>,
        buf: &[u8],
    ) -> Result<usize, DecodeError> {
        let (data, taken) = match self.input.feed(buf)? {
            Fed::Partial(n) => {
                sink.add_decoded(n);
                return Ok(n);
            }
            Fed::Complete(data, n) => (data, n),
        };
        let result = decode_into(sink, data);
        self.input.clear();
        result?;
        sink.add_decoded(taken);
        Ok(taken)
    }
}

fn decode_into<A: BufferAllocator>(sink: &mut DecodeSink<'_, A>, data: &[u8]) -> Result<(), DecodeError> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = zune_jpeg::JpegDecoder::new_with_options(ZCursor::new(data), options);

    decoder.decode_headers().map_err(|_| {
        log::error!("jpeg: bad header");
        DecodeError::InvalidType
    })?;
    let (width, height) = decoder.dimensions().ok_or(DecodeError::InvalidType)?;
    log::debug!("jpeg: {}x{}", width, height);
    // size the target before the codec allocates its own output
    sink.set_size(width, height)?;

    let pixels = decoder.decode().map_err(|_| {
        log::error!("jpeg: decode failed");
        DecodeError::InvalidType
    })?;
    sink.draw_packed(&pixels, width, height, 3)
}
