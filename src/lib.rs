// Local image loader: BMP / JPEG / PNG from storage into a
// display-native pixel buffer (binary, grayscale, RGB565, RGB[A]).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod action;
pub mod config;
pub mod drivers;
pub mod formats;
pub mod image;
pub mod kernel;
pub mod raster;

pub use action::ImageAction;
pub use config::ImageConfig;
pub use drivers::{RamStorage, SdStorage, Storage, StorageError};
pub use formats::{DecodeError, ImageFormat};
pub use image::{ErrorCode, LoadState, LocalImage};
pub use kernel::PollEvent;
pub use raster::{Color, Layout, PixelFormat, RasterView, StaticImage, Transparency};
