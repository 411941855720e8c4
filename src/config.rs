// Image configuration.
// Built in code, or parsed from a key=value text file:
//
//   # lines starting with # are ignored
//   path=/images/logo.png
//   resize=128x64        (or width= / height=; 0 = auto)
//   format=png           (auto|bmp|jpeg|jpg|png)
//   type=rgb565          (binary|grayscale|rgb565|rgb|rgba)
//   transparency=opaque  (opaque|chroma_key|alpha_channel)

use alloc::string::String;

use crate::drivers::storage::{Storage, StorageError, read_file};
use crate::formats::ImageFormat;
use crate::raster::{Layout, PixelFormat, StaticImage, Transparency};

// config files are small; anything past this is ignored
const CONFIG_READ_CAP: usize = 512;

#[derive(Clone, Default)]
pub struct ImageConfig {
    pub path: String,
    pub width: u16, // 0 = auto
    pub height: u16,
    pub format: ImageFormat,
    pub pixel_format: PixelFormat,
    pub transparency: Transparency,
    pub placeholder: Option<StaticImage>,
}

impl ImageConfig {
    pub fn new(path: &str) -> Self {
        Self {
            path: String::from(path),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_transparency(mut self, transparency: Transparency) -> Self {
        self.transparency = transparency;
        self
    }

    pub fn with_placeholder(mut self, placeholder: StaticImage) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.pixel_format, self.transparency)
    }

    pub fn is_auto_size(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Both axes fixed or both auto; a lone zero axis resets to auto.
    pub fn sanitize(&mut self) {
        if (self.width == 0) != (self.height == 0) {
            log::warn!(
                "config: size {}x{} has one zero axis, using auto size",
                self.width,
                self.height
            );
            self.width = 0;
            self.height = 0;
        }
    }

    /// Parse key=value text over the current values. Unknown keys and
    /// unparsable values are ignored.
    pub fn parse(&mut self, data: &[u8]) {
        for line in data.split(|&b| b == b'\n') {
            let line = trim(line);
            if line.is_empty() || line[0] == b'#' {
                continue;
            }
            if let Some(eq) = line.iter().position(|&b| b == b'=') {
                let key = trim(&line[..eq]);
                let val = trim(&line[eq + 1..]);
                self.apply(key, val);
            }
        }
        self.sanitize();
    }

    pub fn from_txt(data: &[u8]) -> Self {
        let mut cfg = Self::default();
        cfg.parse(data);
        cfg
    }

    /// Read and parse a config file from `storage`.
    pub fn load<S: Storage + ?Sized>(storage: &S, path: &str) -> Result<Self, StorageError> {
        let mut buf = [0u8; CONFIG_READ_CAP];
        let n = read_file(storage, path, &mut buf)?;
        if n == 0 {
            return Err(StorageError::Empty);
        }
        let cfg = Self::from_txt(&buf[..n]);
        log::info!("config: loaded from {}", path);
        Ok(cfg)
    }

    fn apply(&mut self, key: &[u8], val: &[u8]) {
        match key {
            b"path" => match core::str::from_utf8(val) {
                Ok(p) => self.path = String::from(p),
                Err(_) => log::warn!("config: path is not utf-8"),
            },
            b"width" => {
                if let Some(v) = parse_u16(val) {
                    self.width = v;
                }
            }
            b"height" => {
                if let Some(v) = parse_u16(val) {
                    self.height = v;
                }
            }
            b"resize" => {
                if let Some((w, h)) = parse_size(val) {
                    self.width = w;
                    self.height = h;
                }
            }
            b"format" => {
                if let Some(f) = ImageFormat::from_name(val) {
                    self.format = f;
                }
            }
            b"type" => {
                if let Some(p) = parse_pixel_format(val) {
                    self.pixel_format = p;
                }
            }
            b"transparency" => {
                if let Some(t) = parse_transparency(val) {
                    self.transparency = t;
                }
            }
            _ => {}
        }
    }
}

fn trim(s: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = s.len();
    while start < end && matches!(s[start], b' ' | b'\t' | b'\r') {
        start += 1;
    }
    while end > start && matches!(s[end - 1], b' ' | b'\t' | b'\r') {
        end -= 1;
    }
    &s[start..end]
}

fn parse_u16(s: &[u8]) -> Option<u16> {
    if s.is_empty() {
        return None;
    }
    let mut val: u16 = 0;
    for &b in s {
        if !b.is_ascii_digit() {
            return None;
        }
        val = val.checked_mul(10)?.checked_add((b - b'0') as u16)?;
    }
    Some(val)
}

// "WxH", either x case
fn parse_size(s: &[u8]) -> Option<(u16, u16)> {
    let x = s.iter().position(|&b| b == b'x' || b == b'X')?;
    Some((parse_u16(trim(&s[..x]))?, parse_u16(trim(&s[x + 1..]))?))
}

fn parse_pixel_format(s: &[u8]) -> Option<PixelFormat> {
    [
        PixelFormat::Binary,
        PixelFormat::Grayscale,
        PixelFormat::Rgb565,
        PixelFormat::Rgb,
        PixelFormat::Rgba,
    ]
    .into_iter()
    .find(|p| s.eq_ignore_ascii_case(p.name().as_bytes()))
}

fn parse_transparency(s: &[u8]) -> Option<Transparency> {
    if s.eq_ignore_ascii_case(b"none") {
        return Some(Transparency::Opaque);
    }
    [
        Transparency::Opaque,
        Transparency::ChromaKey,
        Transparency::AlphaChannel,
    ]
    .into_iter()
    .find(|t| s.eq_ignore_ascii_case(t.name().as_bytes()))
}
