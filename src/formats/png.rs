// PNG via minipng.
//
// minipng decodes a complete stream in one call, so input is collected
// until the declared size is present, then decoded into a temporary
// RGBA8 buffer and painted into the sink.

use alloc::vec::Vec;

use super::{Accumulator, DecodeError, DecodeSink, Fed};
use crate::raster::BufferAllocator;

pub struct PngDecoder {
    input: Accumulator,
}

impl Default for PngDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PngDecoder {
    pub const fn new() -> Self {
        Self {
            input: Accumulator::new(),
        }
    }

    pub fn prepare(&mut self, download_size: usize) -> Result<(), DecodeError> {
        // signature + IHDR
        if download_size < 33 {
            log::error!("png: {} bytes is too short", download_size);
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
        // earlier partial feeds are already counted
        sink.add_decoded(taken);
        Ok(taken)
    }
}

fn decode_into<A: BufferAllocator>(sink: &mut DecodeSink<'_, A>, data: &[u8]) -> Result<(), DecodeError> {
    let header = minipng::decode_png_header(data).map_err(|_| {
        log::error!("png: bad header");
        DecodeError::InvalidType
    })?;
    let width = header.width() as usize;
    let height = header.height() as usize;
    log::debug!("png: {}x{}", width, height);
    sink.set_size(width, height)?;

    let required = header.required_bytes_rgba8bpc();
    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(required)
        .map_err(|_| DecodeError::OutOfMemory)?;
    pixels.resize(required, 0u8);

    let mut image = minipng::decode_png(data, &mut pixels).map_err(|_| {
        log::error!("png: decode failed");
        DecodeError::InvalidType
    })?;
    image.convert_to_rgba8bpc().map_err(|_| {
        log::error!("png: rgba conversion failed");
        DecodeError::InvalidType
    })?;
    sink.draw_packed(image.pixels(), width, height, 4)
}
