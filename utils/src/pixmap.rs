// CPU side pixel storage
//
// Pixmaps are the currency for uploading image contents. Rows are
// stored bottom to top so row 0 matches the bottom of the window.

/// A two dimensional array of pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Pixmap<T: Copy + Default> {
    p_width: usize,
    p_height: usize,
    p_pixels: Vec<T>,
}

impl<T: Copy + Default> Pixmap<T> {
    /// Create a pixmap filled with `T::default()`
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            p_width: width,
            p_height: height,
            p_pixels: vec![T::default(); width * height],
        }
    }

    /// Wrap an existing pixel vector
    ///
    /// Returns None unless the vector holds exactly `width * height`
    /// pixels.
    pub fn from_vec(width: usize, height: usize, pixels: Vec<T>) -> Option<Self> {
        if width.checked_mul(height)? != pixels.len() {
            return None;
        }
        Some(Self {
            p_width: width,
            p_height: height,
            p_pixels: pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.p_width
    }

    pub fn height(&self) -> usize {
        self.p_height
    }

    pub fn is_empty(&self) -> bool {
        self.p_width == 0 || self.p_height == 0
    }

    pub fn pixels(&self) -> &[T] {
        self.p_pixels.as_slice()
    }

    pub fn get(&self, x: usize, y: usize) -> T {
        self.p_pixels[y * self.p_width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.p_pixels[y * self.p_width + x] = value;
    }

    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.p_width;
        &self.p_pixels[start..start + self.p_width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let start = y * self.p_width;
        &mut self.p_pixels[start..start + self.p_width]
    }

    /// Copy all of `src` into this pixmap with its bottom-left pixel
    /// landing on `(x, y)`. Pixels falling outside are ignored.
    pub fn copy_from(&mut self, src: &Pixmap<T>, x: usize, y: usize) {
        if x >= self.p_width || y >= self.p_height {
            return;
        }
        let w = src.width().min(self.p_width - x);
        let h = src.height().min(self.p_height - y);

        for row in 0..h {
            self.row_mut(y + row)[x..x + w].copy_from_slice(&src.row(row)[..w]);
        }
    }

    /// Set every pixel of the given area to `value`, clipped to the
    /// pixmap bounds.
    pub fn fill_rect(&mut self, x: usize, y: usize, width: usize, height: usize, value: T) {
        let right = (x + width).min(self.p_width);
        let top = (y + height).min(self.p_height);

        for row in y.min(top)..top {
            for px in &mut self.row_mut(row)[x.min(right)..right] {
                *px = value;
            }
        }
    }

    pub fn fill(&mut self, value: T) {
        for px in self.p_pixels.iter_mut() {
            *px = value;
        }
    }
}

/// Convert a 32 bit float to the bits of an IEEE half float
///
/// Values too large for a half become infinity, values too small
/// flush through the subnormal range to zero.
pub fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    // inf and NaN
    if exp == 0xff {
        let nan = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let half_exp = exp - 127 + 15;
    if half_exp >= 0x1f {
        return sign | 0x7c00;
    }

    if half_exp <= 0 {
        if half_exp < -10 {
            return sign;
        }
        let full = mantissa | 0x0080_0000;
        let shift = (14 - half_exp) as u32;
        let round = (full >> (shift - 1)) & 1;
        return sign | ((full >> shift) + round) as u16;
    }

    let round = (mantissa >> 12) & 1;
    // a carry out of the mantissa correctly bumps the exponent
    sign | ((((half_exp as u32) << 10) | (mantissa >> 13)) + round) as u16
}

/// Convert the bits of an IEEE half float to a 32 bit float
pub fn f16_to_f32(half: u16) -> f32 {
    let sign = ((half as u32) & 0x8000) << 16;
    let exp = ((half >> 10) & 0x1f) as u32;
    let mantissa = (half & 0x03ff) as u32;

    let bits = match (exp, mantissa) {
        (0, 0) => sign,
        (0, _) => {
            // renormalize the subnormal
            let mut e = 127 - 15 + 1;
            let mut m = mantissa;
            while m & 0x0400 == 0 {
                m <<= 1;
                e -= 1;
            }
            sign | (e << 23) | ((m & 0x03ff) << 13)
        }
        (0x1f, _) => sign | 0x7f80_0000 | (mantissa << 13),
        _ => sign | ((exp + 127 - 15) << 23) | (mantissa << 13),
    };

    f32::from_bits(bits)
}

/// A linear RGBA pixel with half float channels
///
/// This is the memory layout of `R16G16B16A16_SFLOAT`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Rgba16F {
    pub v: [u16; 4],
}

impl Rgba16F {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            v: [f32_to_f16(r), f32_to_f16(g), f32_to_f16(b), f32_to_f16(a)],
        }
    }

    pub fn transparent() -> Self {
        Self::default()
    }

    /// true if the alpha channel is zero, ignoring its sign
    pub fn is_transparent(&self) -> bool {
        self.v[3] & 0x7fff == 0
    }

    pub fn to_f32(&self) -> [f32; 4] {
        [
            f16_to_f32(self.v[0]),
            f16_to_f32(self.v[1]),
            f16_to_f32(self.v[2]),
            f16_to_f32(self.v[3]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_floats() {
        assert_eq!(f32_to_f16(0.0), 0);
        assert_eq!(f32_to_f16(1.0), 0x3c00);
        assert_eq!(f32_to_f16(-2.0), 0xc000);
        assert_eq!(f32_to_f16(0.5), 0x3800);
        assert_eq!(f32_to_f16(1.0e6), 0x7c00);
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0x3555), f16_to_f32(f32_to_f16(1.0 / 3.0)));
        assert_eq!(f16_to_f32(f32_to_f16(6.0e-5)), f16_to_f32(0x03ef));
    }

    #[test]
    fn copy_and_fill() {
        let mut dst: Pixmap<u8> = Pixmap::new(4, 4);
        let src = Pixmap::from_vec(2, 2, vec![1, 2, 3, 4]).unwrap();

        dst.copy_from(&src, 3, 3);
        assert_eq!(dst.get(3, 3), 1);
        assert_eq!(dst.row(3), &[0, 0, 0, 1]);

        dst.fill_rect(0, 0, 2, 8, 9);
        assert_eq!(dst.row(0), &[9, 9, 0, 0]);
        assert_eq!(dst.row(3), &[9, 9, 0, 1]);
    }

    #[test]
    fn from_vec_checks_size() {
        assert!(Pixmap::from_vec(2, 3, vec![0u8; 5]).is_none());
        assert!(Pixmap::from_vec(2, 3, vec![0u8; 7]).is_none());
        assert!(Pixmap::from_vec(usize::MAX, 2, vec![0u8; 2]).is_none());

        let pixmap = Pixmap::from_vec(2, 3, vec![7u8; 6]).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (2, 3));
        assert_eq!(pixmap.get(1, 2), 7);
    }

    #[test]
    fn transparency() {
        assert!(Rgba16F::transparent().is_transparent());
        assert!(Rgba16F::new(1.0, 0.0, 0.0, -0.0).is_transparent());
        assert!(!Rgba16F::new(0.0, 0.0, 0.0, 0.25).is_transparent());
    }
}
