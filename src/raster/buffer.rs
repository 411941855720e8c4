// Single reusable pixel buffer.
//
// Allocated lazily on the first ensure_capacity() of a load, released
// explicitly or when auto-sized dimensions change. Byte size is always
// derived from the stored dimensions and layout, never passed in.
// The decoded view is only exposed after commit().

use alloc::vec::Vec;
use core::fmt;

use super::{Color, Layout, RasterView, writer};

/// Source of raster memory.
pub trait BufferAllocator {
    /// Zero-filled buffer of exactly `size` bytes, or `None` when out of memory.
    fn allocate(&mut self, size: usize) -> Option<Vec<u8>>;

    /// Largest block that could currently be allocated, when known.
    fn largest_free_block(&self) -> Option<usize> {
        None
    }
}

/// Global-heap allocator; fails softly instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&mut self, size: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).ok()?;
        buf.resize(size, 0u8);
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    pub requested: usize,
    pub largest_free: Option<usize>,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.largest_free {
            Some(free) => write!(
                f,
                "allocation of {} bytes failed, largest free block {} bytes",
                self.requested, free
            ),
            None => write!(f, "allocation of {} bytes failed", self.requested),
        }
    }
}

impl core::error::Error for AllocError {}

pub struct PixelBuffer<A: BufferAllocator = HeapAllocator> {
    allocator: A,
    layout: Layout,
    // configured target size; 0x0 = take the decoder's size
    fixed_width: usize,
    fixed_height: usize,
    buf: Option<Vec<u8>>,
    buffer_width: usize,
    buffer_height: usize,
    // visible size; stays 0 until commit so a half-decoded buffer is never shown
    width: usize,
    height: usize,
    committed: bool,
}

impl PixelBuffer<HeapAllocator> {
    pub fn new(layout: Layout, fixed_width: u16, fixed_height: u16) -> Self {
        Self::with_allocator(layout, fixed_width, fixed_height, HeapAllocator)
    }
}

impl<A: BufferAllocator> PixelBuffer<A> {
    pub fn with_allocator(layout: Layout, fixed_width: u16, fixed_height: u16, allocator: A) -> Self {
        // one zero axis means auto for both
        let (fixed_width, fixed_height) = if fixed_width == 0 || fixed_height == 0 {
            (0, 0)
        } else {
            (fixed_width as usize, fixed_height as usize)
        };
        Self {
            allocator,
            layout,
            fixed_width,
            fixed_height,
            buf: None,
            buffer_width: 0,
            buffer_height: 0,
            width: 0,
            height: 0,
            committed: false,
        }
    }

    #[inline]
    pub fn is_auto_resize(&self) -> bool {
        self.fixed_width == 0
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    pub fn buffer_width(&self) -> usize {
        self.buffer_width
    }

    pub fn buffer_height(&self) -> usize {
        self.buffer_height
    }

    /// Committed image width; 0 while nothing is committed.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Committed image height; 0 while nothing is committed.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_allocated(&self) -> bool {
        self.buf.is_some()
    }

    pub fn has_data(&self) -> bool {
        self.committed
    }

    /// Current allocation size, derived from the stored dimensions.
    pub fn size(&self) -> usize {
        self.layout
            .buffer_size(self.buffer_width, self.buffer_height)
            .unwrap_or(0)
    }

    /// Make sure a buffer for `width` x `height` source pixels exists.
    ///
    /// Fixed-size buffers ignore the request. Auto-sized buffers are
    /// replaced by a fresh allocation when either dimension changes; the
    /// old buffer is only dropped once the new one exists. On failure
    /// nothing changes, including the committed image.
    pub fn ensure_capacity(&mut self, width: usize, height: usize) -> Result<usize, AllocError> {
        let (width, height) = if self.is_auto_resize() {
            (width, height)
        } else {
            (self.fixed_width, self.fixed_height)
        };

        if self.buf.is_some() && width == self.buffer_width && height == self.buffer_height {
            // content is about to be overwritten
            self.uncommit();
            return Ok(self.size());
        }
        if width == 0 || height == 0 {
            log::warn!("image: refusing empty {}x{} buffer", width, height);
            return Err(AllocError {
                requested: 0,
                largest_free: self.allocator.largest_free_block(),
            });
        }

        let Some(new_size) = self.layout.buffer_size(width, height) else {
            let err = AllocError {
                requested: usize::MAX,
                largest_free: self.allocator.largest_free_block(),
            };
            log::error!("image: {}x{} buffer overflows usize", width, height);
            return Err(err);
        };
        log::debug!("image: allocating new buffer of {} bytes", new_size);
        let Some(buf) = self.allocator.allocate(new_size) else {
            let err = AllocError {
                requested: new_size,
                largest_free: self.allocator.largest_free_block(),
            };
            log::error!("image: {}", err);
            return Err(err);
        };

        if self.buf.is_some() {
            log::debug!(
                "image: replacing {}x{} buffer",
                self.buffer_width,
                self.buffer_height
            );
            self.release();
        }
        self.buf = Some(buf);
        self.buffer_width = width;
        self.buffer_height = height;
        log::trace!("image: new size ({}, {})", width, height);
        Ok(new_size)
    }

    /// Free the buffer and forget any committed image. No-op when empty.
    pub fn release(&mut self) {
        if self.buf.take().is_some() {
            log::trace!("image: deallocating image buffer");
        }
        self.committed = false;
        self.width = 0;
        self.height = 0;
        self.buffer_width = 0;
        self.buffer_height = 0;
    }

    /// Byte offset of pixel (x, y) in the current buffer.
    #[inline]
    pub fn address_of(&self, x: usize, y: usize) -> usize {
        self.layout.offset(x, y, self.buffer_width)
    }

    /// Encode one pixel at buffer coordinates (x, y).
    pub fn draw_pixel(&mut self, x: i32, y: i32, color: Color) -> bool {
        let Some(buf) = self.buf.as_mut() else {
            log::error!("image: buffer not allocated");
            return false;
        };
        writer::write_pixel(
            buf,
            self.layout,
            self.buffer_width,
            self.buffer_height,
            x,
            y,
            color,
        )
    }

    /// Expose the buffer contents as the decoded image.
    pub fn commit(&mut self) -> bool {
        if self.buf.is_none() {
            return false;
        }
        self.width = self.buffer_width;
        self.height = self.buffer_height;
        self.committed = true;
        true
    }

    pub(crate) fn uncommit(&mut self) {
        if self.committed {
            log::debug!("image: withdrawing committed image");
        }
        self.committed = false;
        self.width = 0;
        self.height = 0;
    }

    /// The committed image, if any.
    pub fn view(&self) -> Option<RasterView<'_>> {
        if !self.committed {
            return None;
        }
        let data = self.buf.as_deref()?;
        Some(RasterView {
            data,
            width: self.width,
            height: self.height,
            layout: self.layout,
        })
    }

    /// Raw allocation regardless of commit state.
    pub fn raw(&self) -> Option<&[u8]> {
        self.buf.as_deref()
    }
}
