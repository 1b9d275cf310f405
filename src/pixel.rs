// Pixel module
// Premultiplied 8-bit RGBA value type

use bytemuck::{Pod, Zeroable};

/// Bits stored per colour component
pub const BITS_PER_COMPONENT: usize = 8;

/// Bytes stored per pixel (red, green, blue, alpha)
pub const BYTES_PER_PIXEL: usize = 4;

const MAX: u16 = u8::MAX as u16;

/// A single RGBA pixel with 8 bits per component.
///
/// Red, green and blue are premultiplied by alpha, so no colour component
/// should exceed `alpha`. The layout matches the bitmap's byte view:
/// red, green, blue, alpha.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Pixel {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// 255 means fully opaque
    pub alpha: u8,
}

impl Pixel {
    /// Fully transparent
    pub const CLEAR: Self = Self::new(0, 0, 0, 0);

    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const RED: Self = Self::rgb(255, 0, 0);
    pub const YELLOW: Self = Self::rgb(255, 255, 0);
    pub const GREEN: Self = Self::rgb(0, 255, 0);
    pub const CYAN: Self = Self::rgb(0, 255, 255);
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    pub const MAGENTA: Self = Self::rgb(255, 0, 255);

    /// Create a pixel from components that are already premultiplied.
    ///
    /// Nothing is validated; callers keep each colour component at or below
    /// `alpha`.
    #[inline]
    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Create an opaque pixel
    #[inline]
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::new(red, green, blue, u8::MAX)
    }

    /// Create a pixel from straight (not premultiplied) components.
    ///
    /// Each colour component becomes `component * alpha / 255`, truncated.
    /// An alpha of 0 always yields [`Pixel::CLEAR`] and an alpha of 255
    /// leaves the components unchanged.
    pub const fn premultiplied(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self::new(
            premultiply(red, alpha),
            premultiply(green, alpha),
            premultiply(blue, alpha),
            alpha,
        )
    }

    /// Straight-alpha components `[red, green, blue, alpha]`.
    ///
    /// Rounds up, so `Pixel::premultiplied` on the result gives back this
    /// pixel exactly whenever every colour component is at most `alpha`.
    pub fn unpremultiplied(self) -> [u8; 4] {
        let a = self.alpha;
        [
            unpremultiply(self.red, a),
            unpremultiply(self.green, a),
            unpremultiply(self.blue, a),
            a,
        ]
    }

    /// Whether the alpha component is zero
    #[inline]
    pub const fn is_transparent(self) -> bool {
        self.alpha == 0
    }
}

#[inline]
const fn premultiply(component: u8, alpha: u8) -> u8 {
    (component as u16 * alpha as u16 / MAX) as u8
}

#[inline]
fn unpremultiply(component: u8, alpha: u8) -> u8 {
    if alpha == 0 {
        return 0;
    }
    let alpha = alpha as u16;
    let straight = (component as u16 * MAX).div_ceil(alpha);
    straight.min(MAX) as u8
}
