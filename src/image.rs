// LocalImage: one image file -> one display-native pixel buffer.
//
// load() runs the whole pipeline synchronously:
//   Idle -> Reading -> Decoding -> Finished | Failed
// and latches the outcome. poll(), called once per host tick, drains it,
// notifies observers and returns to Idle.
//
// The file is read into a transient buffer owned by load() and freed on
// every exit path, together with the decoder. A load that fails before
// touching the pixel buffer leaves the last committed image displayed.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use embedded_graphics::prelude::{DrawTarget, Point};

use crate::action::ImageAction;
use crate::config::ImageConfig;
use crate::drivers::storage::{Storage, read_file, split_path};
use crate::formats::{DecodeError, Decoder, ImageFormat};
use crate::kernel::{EventLatch, Observers, PollEvent};
use crate::raster::blit::draw_raster;
use crate::raster::{BufferAllocator, DisplayColor, HeapAllocator, PixelBuffer, RasterView, StaticImage};

pub const MAX_PATH_LEN: usize = 255;

/// Latched load outcome; the value is what error observers receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ErrorCode {
    #[default]
    Ok = 0,
    NoMemory = 1,
    FileNotFound = 2,
    DecoderIncomplete = 3,
    DecoderUnavailable = 4,
    DecoderPrepareFailed = 5,
    DecoderProcessFailed = 6,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Ok => write!(f, "ok"),
            ErrorCode::NoMemory => write!(f, "out of memory"),
            ErrorCode::FileNotFound => write!(f, "file not found"),
            ErrorCode::DecoderIncomplete => write!(f, "image data incomplete"),
            ErrorCode::DecoderUnavailable => write!(f, "no decoder for image format"),
            ErrorCode::DecoderPrepareFailed => write!(f, "decoder prepare failed"),
            ErrorCode::DecoderProcessFailed => write!(f, "decoding failed"),
        }
    }
}

impl core::error::Error for ErrorCode {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Reading,
    Decoding,
    Finished,
    Failed(ErrorCode),
}

pub struct LocalImage<S: Storage, A: BufferAllocator = HeapAllocator> {
    storage: S,
    path: String,
    format: ImageFormat,
    buffer: PixelBuffer<A>,
    placeholder: Option<StaticImage>,
    state: LoadState,
    latch: EventLatch,
    observers: Observers,
}

impl<S: Storage> LocalImage<S, HeapAllocator> {
    pub fn new(storage: S, config: ImageConfig) -> Self {
        Self::with_allocator(storage, config, HeapAllocator)
    }
}

impl<S: Storage, A: BufferAllocator> LocalImage<S, A> {
    pub fn with_allocator(storage: S, mut config: ImageConfig, allocator: A) -> Self {
        config.sanitize();
        let mut image = Self {
            storage,
            path: String::new(),
            format: config.format,
            buffer: PixelBuffer::with_allocator(config.layout(), config.width, config.height, allocator),
            placeholder: config.placeholder,
            state: LoadState::Idle,
            latch: EventLatch::new(),
            observers: Observers::new(),
        };
        image.set_path(&config.path);
        image
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replace the path used by the next load. Rejects empty paths,
    /// empty components and paths over MAX_PATH_LEN bytes.
    pub fn set_path(&mut self, path: &str) -> bool {
        if path.len() > MAX_PATH_LEN || split_path(path).is_none() {
            log::warn!("image: rejected path {:?}", path);
            return false;
        }
        self.path.clear();
        self.path.push_str(path);
        true
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn buffer(&self) -> &PixelBuffer<A> {
        &self.buffer
    }

    /// The decoded image, once a load has finished.
    pub fn view(&self) -> Option<RasterView<'_>> {
        self.buffer.view()
    }

    pub fn width(&self) -> usize {
        self.buffer.width()
    }

    pub fn height(&self) -> usize {
        self.buffer.height()
    }

    pub fn set_placeholder(&mut self, placeholder: Option<StaticImage>) {
        self.placeholder = placeholder;
    }

    pub fn on_load_finished(&mut self, f: impl FnMut() + 'static) {
        self.observers.on_finished(f);
    }

    pub fn on_error(&mut self, f: impl FnMut(ErrorCode) + 'static) {
        self.observers.on_error(f);
    }

    /// Free the pixel buffer; the placeholder (if any) is drawn again.
    pub fn release(&mut self) {
        self.buffer.release();
    }

    /// Load and decode the current path. The outcome is also latched for
    /// the next poll().
    pub fn load(&mut self) -> Result<(), ErrorCode> {
        log::debug!("image: loading image from file: {}", self.path);
        self.state = LoadState::Reading;
        let result = self.run_load();
        match result {
            Ok(()) => {
                self.state = LoadState::Finished;
                self.latch.signal_finished();
            }
            Err(code) => {
                log::error!("image: loading {} failed: {}", self.path, code);
                self.state = LoadState::Failed(code);
                self.latch.signal_error(code);
            }
        }
        result
    }

    /// Set a new path and load it.
    pub fn reload(&mut self, path: &str) -> Result<(), ErrorCode> {
        self.set_path(path);
        self.load()
    }

    pub fn apply(&mut self, action: ImageAction) {
        log::debug!("image: action {}", action.name());
        match action {
            ImageAction::SetPath(path) => {
                self.set_path(&path);
            }
            ImageAction::Reload(path) => {
                let _ = self.reload(&path);
            }
            ImageAction::Release => self.release(),
            ImageAction::Load => {
                let _ = self.load();
            }
        }
    }

    /// Drain the latched outcome of the last load and notify observers.
    /// Each outcome is reported exactly once.
    pub fn poll(&mut self) -> PollEvent {
        let ev = self.latch.take();
        if ev != PollEvent::None {
            self.observers.dispatch(ev);
            self.state = LoadState::Idle;
        }
        ev
    }

    /// Draw the decoded image at `origin`, or the placeholder while none
    /// is loaded.
    pub fn draw<D>(
        &self,
        origin: Point,
        target: &mut D,
        color_on: D::Color,
        color_off: D::Color,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget,
        D::Color: DisplayColor,
    {
        if let Some(view) = self.buffer.view() {
            draw_raster(&view, origin, target, color_on, color_off)
        } else if let Some(placeholder) = &self.placeholder {
            draw_raster(&placeholder.view(), origin, target, color_on, color_off)
        } else {
            Ok(())
        }
    }

    fn run_load(&mut self) -> Result<(), ErrorCode> {
        let size = match self.storage.file_size(&self.path) {
            Ok(0) => {
                log::error!("image: {} is empty", self.path);
                return Err(ErrorCode::FileNotFound);
            }
            Ok(n) => n as usize,
            Err(e) => {
                log::error!("image: {}: {}", self.path, e);
                return Err(ErrorCode::FileNotFound);
            }
        };

        log::trace!("image: start read file: {} size={}", self.path, size);
        let mut source = Vec::new();
        if source.try_reserve_exact(size).is_err() {
            log::error!("image: no memory for {} byte source buffer", size);
            return Err(ErrorCode::NoMemory);
        }
        source.resize(size, 0u8);

        let read = read_file(&self.storage, &self.path, &mut source).map_err(|e| {
            log::error!("image: reading {} failed: {}", self.path, e);
            ErrorCode::FileNotFound
        })?;
        log::debug!("image: read {} bytes", read);
        if read == 0 {
            return Err(ErrorCode::FileNotFound);
        }
        if read < size {
            log::warn!("image: expected {} bytes, read {}", size, read);
            source.truncate(read);
        }

        self.state = LoadState::Decoding;
        let Some(mut decoder) = Decoder::new(self.format, &source, &mut self.buffer) else {
            log::error!(
                "image: could not instantiate decoder, format unsupported: {}",
                self.format
            );
            return Err(ErrorCode::DecoderUnavailable);
        };

        decoder.prepare(source.len()).map_err(|e| {
            log::error!("image: {} decoder prepare: {}", decoder.format(), e);
            match e {
                DecodeError::OutOfMemory => ErrorCode::NoMemory,
                _ => ErrorCode::DecoderPrepareFailed,
            }
        })?;

        let mut fed = 0;
        while fed < source.len() {
            let n = decoder.decode(&source[fed..]).map_err(|e| {
                log::error!("image: {} decode ({}): {}", decoder.format(), e.code(), e);
                match e {
                    DecodeError::OutOfMemory => ErrorCode::NoMemory,
                    _ => ErrorCode::DecoderProcessFailed,
                }
            })?;
            if n == 0 {
                break;
            }
            fed += n;
        }

        if !decoder.is_finished() {
            log::error!(
                "image: decoding is not complete ({} of {} bytes)",
                decoder.sink().decoded_bytes(),
                decoder.sink().download_size()
            );
            return Err(ErrorCode::DecoderIncomplete);
        }
        drop(decoder);

        self.buffer.commit();
        log::info!(
            "image: loaded {}, {} bytes, {}x{}",
            self.path,
            fed,
            self.buffer.width(),
            self.buffer.height()
        );
        Ok(())
    }
}
