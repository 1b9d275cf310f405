// Bitmap module
// Owns a row-major buffer of premultiplied pixels and converts it to and from images

use crate::pixel::{Pixel, BYTES_PER_PIXEL};
use image::{DynamicImage, RgbaImage};
use std::ops::{Index, IndexMut};
use thiserror::Error;

/// Errors produced while building or addressing a [`Bitmap`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitmapError {
    #[error("a {width}x{height} bitmap needs {expected} pixels, got {actual}")]
    PixelCountMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("a {width}x{height} bitmap needs {expected} bytes of RGBA data, got {actual}")]
    ByteCountMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("bitmap dimensions {width}x{height} are too large")]
    DimensionsTooLarge { width: usize, height: usize },

    #[error("pixel ({x}, {y}) is outside the {width}x{height} bitmap")]
    IndexOutOfRange {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// A rectangular buffer of premultiplied RGBA pixels.
///
/// Pixels are stored row-major: the pixel at `(x, y)` lives at index
/// `x + y * width`. The buffer always holds exactly `width * height` pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    pixels: Vec<Pixel>,
}

impl Bitmap {
    /// Create a bitmap from an explicit pixel sequence.
    ///
    /// Fails unless `pixels.len() == width * height`.
    pub fn new(width: usize, height: usize, pixels: Vec<Pixel>) -> Result<Self, BitmapError> {
        let expected = area(width, height)?;
        if pixels.len() != expected {
            return Err(BitmapError::PixelCountMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create a bitmap where every pixel is `fill`, reporting oversized
    /// dimensions as [`BitmapError::DimensionsTooLarge`].
    pub fn try_filled(width: usize, height: usize, fill: Pixel) -> Result<Self, BitmapError> {
        let len = area(width, height)?;
        Ok(Self {
            width,
            height,
            pixels: vec![fill; len],
        })
    }

    /// Create a bitmap where every pixel is `fill`.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`, like `vec!` does.
    /// Use [`Bitmap::try_filled`] to get an error instead.
    pub fn filled(width: usize, height: usize, fill: Pixel) -> Self {
        Self::try_filled(width, height, fill).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Create a fully transparent bitmap
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn empty(width: usize, height: usize) -> Self {
        Self::filled(width, height, Pixel::CLEAR)
    }

    /// Create a bitmap by asking `generator` for every pixel.
    ///
    /// The generator runs once per coordinate, rows first: `(0, 0)`,
    /// `(1, 0)`, ..., `(width - 1, 0)`, `(0, 1)`, ...
    ///
    /// # Panics
    ///
    /// Panics before calling `generator` if `width * height` overflows `usize`.
    pub fn from_fn<F>(width: usize, height: usize, mut generator: F) -> Self
    where
        F: FnMut(usize, usize) -> Pixel,
    {
        let mut pixels = Vec::with_capacity(checked_area(width, height));
        pixels.extend(coordinates(width, height).map(|(x, y)| generator(x, y)));
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Fallible version of [`Bitmap::from_fn`].
    ///
    /// Stops at the first error and returns it; no bitmap is produced.
    ///
    /// # Panics
    ///
    /// Panics before calling `generator` if `width * height` overflows `usize`.
    pub fn try_from_fn<F, E>(width: usize, height: usize, mut generator: F) -> Result<Self, E>
    where
        F: FnMut(usize, usize) -> Result<Pixel, E>,
    {
        let mut pixels = Vec::with_capacity(checked_area(width, height));
        for (x, y) in coordinates(width, height) {
            pixels.push(generator(x, y)?);
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create a bitmap from raw premultiplied RGBA bytes with a stride of
    /// `width * 4`.
    pub fn from_rgba_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self, BitmapError> {
        let expected = area(width, height)?
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or(BitmapError::DimensionsTooLarge { width, height })?;
        if bytes.len() != expected {
            return Err(BitmapError::ByteCountMismatch {
                width,
                height,
                expected,
                actual: bytes.len(),
            });
        }
        let pixels = bytemuck::cast_slice::<u8, Pixel>(bytes).to_vec();
        Self::new(width, height, pixels)
    }

    /// Decode `image` into a freshly allocated bitmap of the same size.
    ///
    /// The image is converted to 8-bit RGBA and drawn over a clear buffer,
    /// which leaves the premultiplied image data in the bitmap.
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut bitmap = Self::empty(width as usize, height as usize);
        for (dst, src) in bitmap.pixels.iter_mut().zip(rgba.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = Pixel::premultiplied(r, g, b, a);
        }
        bitmap
    }

    /// Snapshot the current pixels as an image.
    ///
    /// The `image` crate works with straight alpha, so pixels are
    /// un-premultiplied on the way out. [`Bitmap::from_image`] on the result
    /// gives back an identical bitmap.
    pub fn to_image(&self) -> Result<DynamicImage, BitmapError> {
        let too_large = BitmapError::DimensionsTooLarge {
            width: self.width,
            height: self.height,
        };
        let width = u32::try_from(self.width).map_err(|_| too_large.clone())?;
        let height = u32::try_from(self.height).map_err(|_| too_large.clone())?;

        let raw: Vec<u8> = self
            .pixels
            .iter()
            .flat_map(|pixel| pixel.unpremultiplied())
            .collect();
        let buffer = RgbaImage::from_raw(width, height, raw).ok_or(too_large)?;
        Ok(DynamicImage::ImageRgba8(buffer))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)`
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// The underlying pixels, row-major
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// The buffer as premultiplied RGBA bytes, stride `width * 4`
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Read the pixel at `(x, y)`
    pub fn get(&self, x: usize, y: usize) -> Result<Pixel, BitmapError> {
        let index = self.index_of(x, y)?;
        Ok(self.pixels[index])
    }

    /// Overwrite the pixel at `(x, y)`
    pub fn set(&mut self, x: usize, y: usize, pixel: Pixel) -> Result<(), BitmapError> {
        let index = self.index_of(x, y)?;
        self.pixels[index] = pixel;
        Ok(())
    }

    /// Apply `transform` to every pixel, returning one `Vec` per row.
    ///
    /// The result always has `height` rows of `width` values each.
    pub fn map<T, F>(&self, mut transform: F) -> Vec<Vec<T>>
    where
        F: FnMut(Pixel) -> T,
    {
        (0..self.height)
            .map(|y| self.row(y).iter().map(|&pixel| transform(pixel)).collect())
            .collect()
    }

    /// Composite `source` onto this bitmap with its top-left corner at
    /// `(x, y)`, using premultiplied source-over. Parts of `source` that fall
    /// outside this bitmap are clipped.
    pub fn draw(&mut self, source: &Bitmap, x: isize, y: isize) {
        for sy in 0..source.height {
            let Some(dy) = offset(y, sy, self.height) else {
                continue;
            };
            for sx in 0..source.width {
                let Some(dx) = offset(x, sx, self.width) else {
                    continue;
                };
                let src = source.pixels[sx + sy * source.width];
                let dst = &mut self.pixels[dx + dy * self.width];
                *dst = source_over(src, *dst);
            }
        }
    }

    fn row(&self, y: usize) -> &[Pixel] {
        let start = y * self.width;
        &self.pixels[start..start + self.width]
    }

    fn index_of(&self, x: usize, y: usize) -> Result<usize, BitmapError> {
        if x >= self.width || y >= self.height {
            return Err(BitmapError::IndexOutOfRange {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(x + y * self.width)
    }
}

impl Index<(usize, usize)> for Bitmap {
    type Output = Pixel;

    fn index(&self, (x, y): (usize, usize)) -> &Pixel {
        match self.index_of(x, y) {
            Ok(index) => &self.pixels[index],
            Err(e) => panic!("{e}"),
        }
    }
}

impl IndexMut<(usize, usize)> for Bitmap {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Pixel {
        match self.index_of(x, y) {
            Ok(index) => &mut self.pixels[index],
            Err(e) => panic!("{e}"),
        }
    }
}

fn area(width: usize, height: usize) -> Result<usize, BitmapError> {
    width
        .checked_mul(height)
        .ok_or(BitmapError::DimensionsTooLarge { width, height })
}

fn checked_area(width: usize, height: usize) -> usize {
    area(width, height).unwrap_or_else(|e| panic!("{e}"))
}

/// Row-major coordinate walk: y outer, x inner
fn coordinates(width: usize, height: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..height).flat_map(move |y| (0..width).map(move |x| (x, y)))
}

/// Destination coordinate for `origin + step`, if it lands inside `0..limit`
fn offset(origin: isize, step: usize, limit: usize) -> Option<usize> {
    let step = isize::try_from(step).ok()?;
    let target = usize::try_from(origin.checked_add(step)?).ok()?;
    (target < limit).then_some(target)
}

fn source_over(src: Pixel, dst: Pixel) -> Pixel {
    let keep = 255 - src.alpha as u16;
    let blend = |s: u8, d: u8| (s as u16 + (d as u16 * keep + 127) / 255).min(255) as u8;
    Pixel::new(
        blend(src.red, dst.red),
        blend(src.green, dst.green),
        blend(src.blue, dst.blue),
        blend(src.alpha, dst.alpha),
    )
}
