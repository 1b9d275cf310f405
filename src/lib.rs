// nanoview - premultiplied RGBA bitmaps and a small image inspector
// Decodes picked or dropped images and reports the transparency of small ones

pub mod app;
pub mod bitmap;
pub mod cli;
pub mod image_loader;
pub mod pixel;

pub use bitmap::{Bitmap, BitmapError};
pub use pixel::Pixel;
