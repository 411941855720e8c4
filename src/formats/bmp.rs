// Windows BMP decoder, incremental.
//
// Feeds are consumed in two stages: the header (file header, DIB header,
// palette, up to the pixel data offset) once it is fully present, then
// whole pixel rows. A partial row is left unconsumed for the next call.
//
// Supported: BITMAPINFOHEADER and later, uncompressed 1/4/8-bit indexed,
// 24-bit BGR, 32-bit BGRX, and 32-bit BI_BITFIELDS (with alpha mask when
// the header carries one). Bottom-up and top-down row order.

use alloc::vec::Vec;

use super::{DecodeError, DecodeSink};
use crate::raster::{BufferAllocator, Color};

const FILE_HEADER_LEN: usize = 14;
const INFO_HEADER_LEN: usize = 40;
const MIN_FILE_LEN: usize = FILE_HEADER_LEN + INFO_HEADER_LEN;
// masks follow the 40-byte info header (or sit inside V2+ headers, same offset)
const MASKS_OFFSET: usize = FILE_HEADER_LEN + INFO_HEADER_LEN;

const BI_RGB: u32 = 0;
const BI_BITFIELDS: u32 = 3;

#[inline]
fn le16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

#[inline]
fn le32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// One BI_BITFIELDS channel mask.
#[derive(Debug, Clone, Copy)]
struct Channel {
    mask: u32,
    shift: u32,
    max: u64,
}

impl Channel {
    fn new(mask: u32) -> Option<Self> {
        if mask == 0 {
            return None;
        }
        let shift = mask.trailing_zeros();
        let bits = (mask >> shift).trailing_ones();
        Some(Self {
            mask,
            shift,
            max: (1u64 << bits) - 1,
        })
    }

    /// Channel value scaled to 0..=255.
    #[inline]
    fn extract(self, px: u32) -> u8 {
        let v = ((px & self.mask) >> self.shift) as u64;
        (v * 255 / self.max) as u8
    }
}

#[derive(Debug, Clone, Copy)]
struct Masks {
    r: Channel,
    g: Channel,
    b: Channel,
    a: Option<Channel>,
}

impl Masks {
    fn color(&self, px: u32) -> Color {
        let w = self.a.map_or(0xFF, |a| a.extract(px));
        Color::rgba(self.r.extract(px), self.g.extract(px), self.b.extract(px), w)
    }
}

#[derive(Debug, Clone, Copy)]
struct Header {
    width: usize,
    height: usize,
    top_down: bool,
    bpp: u16,
    stride: usize,
    masks: Option<Masks>,
}

pub struct BmpDecoder {
    header: Option<Header>,
    palette: Vec<Color>,
    rows_done: usize,
}

impl Default for BmpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BmpDecoder {
    pub const fn new() -> Self {
        Self {
            header: None,
            palette: Vec::new(),
            rows_done: 0,
        }
    }

    pub fn prepare(&mut self, download_size: usize) -> Result<(), DecodeError> {
        self.header = None;
        self.palette.clear();
        self.rows_done = 0;
        if download_size < MIN_FILE_LEN {
            log::error!("bmp: {} bytes is too short for a bitmap", download_size);
            return Err(DecodeError::InvalidType);
        }
        Ok(())
    }

    pub fn decode<A: BufferAllocator>(
        &mut self,
        sink: &mut DecodeSink<'_, A>,
        buf: &[u8],
    ) -> Result<usize, DecodeError> {
        let mut consumed = 0;
        let header = match self.header {
            Some(h) => h,
            None => {
                let Some((h, len)) = self.parse_header(buf)? else {
                    return Ok(0);
                };
                sink.set_size(h.width, h.height)?;
                self.header = Some(h);
                consumed = len;
                h
            }
        };

        while self.rows_done < header.height && buf.len() - consumed >= header.stride {
            let row = &buf[consumed..consumed + header.stride];
            let y = if header.top_down {
                self.rows_done
            } else {
                header.height - 1 - self.rows_done
            };
            self.draw_row(sink, &header, row, y)?;
            self.rows_done += 1;
            consumed += header.stride;
        }

        if self.rows_done == header.height {
            // padding / trailing metadata after the last row
            let left = sink
                .download_size()
                .saturating_sub(sink.decoded_bytes() + consumed);
            consumed += left.min(buf.len() - consumed);
        }

        sink.add_decoded(consumed);
        Ok(consumed)
    }

    /// Parse everything up to the pixel data. `None` until enough bytes
    /// are present; otherwise the header and its length in bytes.
    fn parse_header(&mut self, buf: &[u8]) -> Result<Option<(Header, usize)>, DecodeError> {
        if buf.len() >= 2 && buf[..2] != *b"BM" {
            log::error!("bmp: missing BM signature");
            return Err(DecodeError::InvalidType);
        }
        if buf.len() < FILE_HEADER_LEN + 4 {
            return Ok(None);
        }
        let data_offset = le32(buf, 10) as usize;
        let dib_len = le32(buf, FILE_HEADER_LEN) as usize;
        if dib_len < INFO_HEADER_LEN {
            log::error!("bmp: {}-byte core header not supported", dib_len);
            return Err(DecodeError::UnsupportedFormat);
        }
        let palette_start = FILE_HEADER_LEN + dib_len;
        if data_offset < palette_start {
            log::error!("bmp: pixel data offset {} inside header", data_offset);
            return Err(DecodeError::InvalidType);
        }
        if buf.len() < data_offset {
            return Ok(None);
        }

        let raw_width = le32(buf, 18) as i32;
        let raw_height = le32(buf, 22) as i32;
        let bpp = le16(buf, 28);
        let compression = le32(buf, 30);
        let colors_used = le32(buf, 46) as usize;

        if raw_width <= 0 || raw_height == 0 || raw_height == i32::MIN {
            log::error!("bmp: bad dimensions {}x{}", raw_width, raw_height);
            return Err(DecodeError::InvalidType);
        }
        let width = raw_width as usize;
        let height = raw_height.unsigned_abs() as usize;
        let top_down = raw_height < 0;

        let masks = match (bpp, compression) {
            (1 | 4 | 8 | 24 | 32, BI_RGB) => None,
            (32, BI_BITFIELDS) => {
                if data_offset < MASKS_OFFSET + 12 {
                    return Err(DecodeError::InvalidType);
                }
                let channel = |at| Channel::new(le32(buf, at)).ok_or(DecodeError::InvalidType);
                let a = if dib_len >= 56 {
                    Channel::new(le32(buf, MASKS_OFFSET + 12))
                } else {
                    None
                };
                Some(Masks {
                    r: channel(MASKS_OFFSET)?,
                    g: channel(MASKS_OFFSET + 4)?,
                    b: channel(MASKS_OFFSET + 8)?,
                    a,
                })
            }
            _ => {
                log::error!("bmp: {}bpp with compression {} not supported", bpp, compression);
                return Err(DecodeError::UnsupportedFormat);
            }
        };

        if bpp <= 8 {
            let max = 1usize << bpp;
            let wanted = if colors_used == 0 { max } else { colors_used.min(max) };
            let count = wanted.min((data_offset - palette_start) / 4);
            if count == 0 {
                log::error!("bmp: indexed image without palette");
                return Err(DecodeError::InvalidType);
            }
            self.palette.clear();
            self.palette
                .try_reserve_exact(count)
                .map_err(|_| DecodeError::OutOfMemory)?;
            self.palette.extend(
                buf[palette_start..palette_start + count * 4]
                    .chunks_exact(4)
                    .map(|e| Color::rgb(e[2], e[1], e[0])),
            );
        }

        // rows are padded to a 4-byte boundary
        let stride = (bpp as usize)
            .checked_mul(width)
            .ok_or(DecodeError::InvalidType)?
            .div_ceil(32)
            * 4;

        log::debug!(
            "bmp: {}x{} {}bpp{}",
            width,
            height,
            bpp,
            if top_down { " top-down" } else { "" }
        );
        Ok(Some((
            Header {
                width,
                height,
                top_down,
                bpp,
                stride,
                masks,
            },
            data_offset,
        )))
    }

    fn pixel(&self, header: &Header, row: &[u8], x: usize) -> Result<Color, DecodeError> {
        let color = match header.bpp {
            1 | 4 | 8 => {
                let bpp = header.bpp as usize;
                let per_byte = 8 / bpp;
                let shift = 8 - bpp * (x % per_byte + 1);
                let index = (row[x / per_byte] >> shift) as usize & ((1 << bpp) - 1);
                *self.palette.get(index).ok_or(DecodeError::InvalidType)?
            }
            24 => Color::rgb(row[x * 3 + 2], row[x * 3 + 1], row[x * 3]),
            _ => match header.masks {
                Some(m) => m.color(le32(row, x * 4)),
                None => Color::rgb(row[x * 4 + 2], row[x * 4 + 1], row[x * 4]),
            },
        };
        Ok(color)
    }

    // one draw per run of equal colors
    fn draw_row<A: BufferAllocator>(
        &self,
        sink: &mut DecodeSink<'_, A>,
        header: &Header,
        row: &[u8],
        y: usize,
    ) -> Result<(), DecodeError> {
        let mut run_start = 0;
        let mut run_color = self.pixel(header, row, 0)?;
        for x in 1..header.width {
            let c = self.pixel(header, row, x)?;
            if c != run_color {
                sink.draw(run_start, y, x - run_start, 1, run_color);
                run_start = x;
                run_color = c;
            }
        }
        sink.draw(run_start, y, header.width - run_start, 1, run_color);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::raster::{Layout, PixelBuffer, PixelFormat, Transparency};

    /// Bottom-up 24-bit BMP; `rows` are given top to bottom as RGB.
    pub fn bmp24(width: usize, rows: &[&[[u8; 3]]]) -> Vec<u8> {
        let stride = (24 * width).div_ceil(32) * 4;
        let data_len = stride * rows.len();
        let mut out = file_header(MIN_FILE_LEN, data_len);
        out.extend(info_header(width as i32, rows.len() as i32, 24, BI_RGB, 0));
        for row in rows.iter().rev() {
            let start = out.len();
            for px in row.iter() {
                out.extend([px[2], px[1], px[0]]);
            }
            out.resize(start + stride, 0);
        }
        out
    }

    fn file_header(data_offset: usize, data_len: usize) -> Vec<u8> {
        let mut h = Vec::from(*b"BM");
        h.extend(((data_offset + data_len) as u32).to_le_bytes());
        h.extend([0u8; 4]);
        h.extend((data_offset as u32).to_le_bytes());
        h
    }

    fn info_header(width: i32, height: i32, bpp: u16, compression: u32, colors: u32) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend((INFO_HEADER_LEN as u32).to_le_bytes());
        h.extend(width.to_le_bytes());
        h.extend(height.to_le_bytes());
        h.extend(1u16.to_le_bytes());
        h.extend(bpp.to_le_bytes());
        h.extend(compression.to_le_bytes());
        h.extend([0u8; 12]);
        h.extend(colors.to_le_bytes());
        h.extend([0u8; 4]);
        h
    }

    fn run(data: &[u8], layout: Layout) -> (Result<usize, DecodeError>, bool, PixelBuffer) {
        let mut pb = PixelBuffer::new(layout, 0, 0);
        let mut dec = BmpDecoder::new();
        let mut sink = DecodeSink::new(&mut pb);
        sink.set_download_size(data.len());
        dec.prepare(data.len()).unwrap();
        let mut total = 0;
        let result = loop {
            match dec.decode(&mut sink, &data[total..]) {
                Ok(0) => break Ok(total),
                Ok(n) => total += n,
                Err(e) => break Err(e),
            }
        };
        let finished = sink.is_finished();
        if finished {
            pb.commit();
        }
        (result, finished, pb)
    }

    const RGB: Layout = Layout::new(PixelFormat::Rgb, Transparency::Opaque);

    #[test]
    fn decodes_bottom_up_24bit() {
        let data = bmp24(
            3,
            &[
                &[[255, 0, 0], [0, 255, 0], [0, 0, 255]],
                &[[1, 2, 3], [4, 5, 6], [7, 8, 9]],
            ],
        );
        let (result, finished, pb) = run(&data, RGB);
        assert_eq!(result, Ok(data.len()));
        assert!(finished);
        let view = pb.view().unwrap();
        assert_eq!((view.width, view.height), (3, 2));
        assert_eq!(view.pixel(0, 0), Some(Color::rgb(255, 0, 0)));
        assert_eq!(view.pixel(2, 0), Some(Color::rgb(0, 0, 255)));
        assert_eq!(view.pixel(1, 1), Some(Color::rgb(4, 5, 6)));
    }

    #[test]
    fn decodes_top_down_indexed() {
        // 9x2, 1bpp, top-down; palette black/white
        let mut data = file_header(MIN_FILE_LEN + 8, 8);
        data.extend(info_header(9, -2, 1, BI_RGB, 2));
        data.extend([0, 0, 0, 0, 255, 255, 255, 0]);
        data.extend([0b1000_0000, 0b1000_0000, 0, 0]);
        data.extend([0b0000_0001, 0, 0, 0]);

        let (result, finished, pb) = run(&data, RGB);
        assert_eq!(result, Ok(data.len()));
        assert!(finished);
        let view = pb.view().unwrap();
        assert_eq!(view.pixel(0, 0), Some(Color::WHITE));
        assert_eq!(view.pixel(8, 0), Some(Color::WHITE));
        assert_eq!(view.pixel(1, 0), Some(Color::BLACK));
        assert_eq!(view.pixel(7, 1), Some(Color::WHITE));
        assert_eq!(view.pixel(0, 1), Some(Color::BLACK));
    }

    #[test]
    fn decodes_32bit_bitfields_with_alpha() {
        // V3 header: 40-byte info header + 16 bytes of masks
        let mut data = file_header(MIN_FILE_LEN + 16, 4);
        let mut info = info_header(1, 1, 32, BI_BITFIELDS, 0);
        info[0] = 56;
        data.extend(info);
        data.extend(0x00FF_0000u32.to_le_bytes());
        data.extend(0x0000_FF00u32.to_le_bytes());
        data.extend(0x0000_00FFu32.to_le_bytes());
        data.extend(0xFF00_0000u32.to_le_bytes());
        data.extend(0x40_10_20_30u32.to_le_bytes());

        let layout = Layout::new(PixelFormat::Rgba, Transparency::AlphaChannel);
        let (result, finished, pb) = run(&data, layout);
        assert_eq!(result, Ok(data.len()));
        assert!(finished);
        assert_eq!(pb.view().unwrap().pixel(0, 0), Some(Color::rgba(0x10, 0x20, 0x30, 0x40)));
    }

    #[test]
    fn waits_for_complete_header() {
        let data = bmp24(1, &[&[[9, 9, 9]]]);
        let mut pb = PixelBuffer::new(RGB, 0, 0);
        let mut dec = BmpDecoder::new();
        let mut sink = DecodeSink::new(&mut pb);
        sink.set_download_size(data.len());
        dec.prepare(data.len()).unwrap();
        assert_eq!(dec.decode(&mut sink, &data[..30]), Ok(0));
        assert_eq!(dec.decode(&mut sink, &data[..MIN_FILE_LEN + 2]), Ok(MIN_FILE_LEN));
        assert_eq!(dec.decode(&mut sink, &data[MIN_FILE_LEN..]), Ok(4));
        assert!(sink.is_finished());
    }

    #[test]
    fn truncated_row_is_left_unconsumed() {
        let data = bmp24(2, &[&[[1, 1, 1], [2, 2, 2]], &[[3, 3, 3], [4, 4, 4]]]);
        let cut = &data[..data.len() - 3];
        let mut pb = PixelBuffer::new(RGB, 0, 0);
        let mut dec = BmpDecoder::new();
        let mut sink = DecodeSink::new(&mut pb);
        sink.set_download_size(cut.len());
        dec.prepare(cut.len()).unwrap();
        let n = dec.decode(&mut sink, cut).unwrap();
        assert_eq!(n, MIN_FILE_LEN + 8);
        assert_eq!(dec.decode(&mut sink, &cut[n..]), Ok(0));
        assert!(!sink.is_finished());
    }

    #[test]
    fn rejects_unsupported_and_corrupt_headers() {
        let mut data = bmp24(1, &[&[[0, 0, 0]]]);
        data[28] = 16;
        assert_eq!(run(&data, RGB).0, Err(DecodeError::UnsupportedFormat));

        let mut data = bmp24(1, &[&[[0, 0, 0]]]);
        data[0] = b'X';
        assert_eq!(run(&data, RGB).0, Err(DecodeError::InvalidType));

        let mut data = bmp24(1, &[&[[0, 0, 0]]]);
        data[18..22].copy_from_slice(&0i32.to_le_bytes());
        assert_eq!(run(&data, RGB).0, Err(DecodeError::InvalidType));
    }

    #[test]
    fn prepare_rejects_tiny_stream() {
        assert_eq!(BmpDecoder::new().prepare(20), Err(DecodeError::InvalidType));
    }

    #[test]
    fn bitfield_channels_scale_to_eight_bits() {
        let five = Channel::new(0x7C00).unwrap();
        assert_eq!(five.extract(0x7C00), 255);
        assert_eq!(five.extract(0), 0);
        assert!(Channel::new(0).is_none());
    }
}
