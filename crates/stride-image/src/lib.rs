//! # Stride Image
//!
//! Bitmap upscaling for the Stride toolkit. This crate provides:
//!
//! - **Bitmap codec** ([`bmp`]): uncompressed 24/32-bit Windows bitmaps with
//!   row padding handled on read and write.
//! - **Upscaling** ([`upscale`]): nearest-neighbour and bicubic enlargement by
//!   an integer factor, plus a row-banded nearest variant that splits output
//!   rows across workers with the same partition planner as the matrix code.
//! - **Filters** ([`filter`]): 3x3 integer convolution, applied per channel.

pub mod bmp;
pub mod error;
pub mod filter;
pub mod image;
pub mod upscale;

pub use bmp::Bitmap;
pub use error::ImageError;
pub use image::Image;
pub use upscale::{Method, UpscaleOptions, Upscaler};
