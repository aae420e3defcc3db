use image::GenericImageView;
use std::path::Path;

/// Errors from building a texture out of a decoded image.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("texture not square ({width}x{height})")]
    NotSquare { width: u32, height: u32 },
    #[error("texture size mismatch (expected {expected}, got {got})")]
    WrongSize { expected: u32, got: u32 },
    #[error("channel count mismatch (expected {expected}, got {got})")]
    WrongChannels { expected: u8, got: u8 },
}

/// Square color lookup table with wrapping sample semantics.
///
/// Side length is a power of two so both axes wrap by masking; sampling is
/// total and never bounds-checks. Samples are gamma-linearized once at build
/// time and packed 0xAARRGGBB (bytes B, G, R, A in memory), the channel
/// order the display surface expects.
pub struct Texture {
    data: Vec<u32>,
}

impl Texture {
    pub const SIZE: u32 = 128;
    const MASK: u32 = Self::SIZE - 1;

    /// Decode an image file and build the lookup table.
    ///
    /// `alpha` selects the expected source layout: RGBA when true, RGB
    /// otherwise. The source must be square, exactly [`Texture::SIZE`] on a
    /// side, and carry exactly the expected channel count.
    pub fn load(path: impl AsRef<Path>, alpha: bool) -> Result<Self, LoadError> {
        let img = image::open(path.as_ref())?;
        let (width, height) = img.dimensions();
        let channels = img.color().channel_count();
        let raw = if alpha {
            img.to_rgba8().into_raw()
        } else {
            img.to_rgb8().into_raw()
        };
        let tex = Self::from_raw(&raw, width, height, channels, alpha)?;
        tracing::debug!(path = %path.as_ref().display(), alpha, "texture loaded");
        Ok(tex)
    }

    /// Build from already-decoded interleaved channel bytes.
    pub fn from_raw(
        raw: &[u8],
        width: u32,
        height: u32,
        channels: u8,
        alpha: bool,
    ) -> Result<Self, LoadError> {
        let expected = if alpha { 4 } else { 3 };
        if channels != expected {
            return Err(LoadError::WrongChannels {
                expected,
                got: channels,
            });
        }
        if width != height {
            return Err(LoadError::NotSquare { width, height });
        }
        if width != Self::SIZE {
            return Err(LoadError::WrongSize {
                expected: Self::SIZE,
                got: width,
            });
        }

        let size = Self::SIZE as usize;
        let c = expected as usize;
        let mut data = vec![0u32; size * size];
        for x in 0..size {
            for y in 0..size {
                // Source is row-major, the table is column-major by x.
                let px = &raw[(y * size + x) * c..(y * size + x) * c + c];
                let r = srgb_to_linear(px[0]) as u32;
                let g = srgb_to_linear(px[1]) as u32;
                let b = srgb_to_linear(px[2]) as u32;
                let a = if alpha { srgb_to_linear(px[3]) as u32 } else { 0xff };
                data[x * size + y] = (a << 24) | (r << 16) | (g << 8) | b;
            }
        }
        Ok(Self { data })
    }

    /// Wrapped lookup; total for all integer coordinates.
    #[inline]
    pub fn sample(&self, x: i32, y: i32) -> u32 {
        let xi = (x as u32 & Self::MASK) as usize;
        let yi = (y as u32 & Self::MASK) as usize;
        self.data[xi * Self::SIZE as usize + yi]
    }
}

/// Gamma-compressed byte to linear light, fixed 2.2 power curve. The 255.2
/// rescale keeps full white at exactly 255 after truncation.
fn srgb_to_linear(v: u8) -> u8 {
    ((v as f64 / 255.0).powf(2.2) * 255.2) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(r: u8, g: u8, b: u8) -> Texture {
        let size = Texture::SIZE as usize;
        let mut raw = Vec::with_capacity(size * size * 3);
        for _ in 0..size * size {
            raw.extend_from_slice(&[r, g, b]);
        }
        Texture::from_raw(&raw, Texture::SIZE, Texture::SIZE, 3, false).unwrap()
    }

    #[test]
    fn sampling_is_periodic() {
        let size = Texture::SIZE as usize;
        let mut raw = vec![0u8; size * size * 3];
        for (i, v) in raw.iter_mut().enumerate() {
            *v = (i % 251) as u8;
        }
        let tex = Texture::from_raw(&raw, Texture::SIZE, Texture::SIZE, 3, false).unwrap();
        let s = Texture::SIZE as i32;
        for &(x, y) in &[(0, 0), (5, 99), (-1, -1), (-300, 1000), (127, 128)] {
            assert_eq!(tex.sample(x, y), tex.sample(x + s, y));
            assert_eq!(tex.sample(x, y), tex.sample(x, y + s));
            assert_eq!(tex.sample(x, y), tex.sample(x - s, y - s));
        }
    }

    #[test]
    fn solid_color_samples_to_linearized_value() {
        let tex = solid(200, 100, 50);
        let expect = ((srgb_to_linear(200) as u32) << 16)
            | ((srgb_to_linear(100) as u32) << 8)
            | srgb_to_linear(50) as u32
            | 0xff00_0000;
        for &(x, y) in &[(0, 0), (64, 3), (-17, 500), (127, 127)] {
            assert_eq!(tex.sample(x, y), expect);
        }
    }

    #[test]
    fn linearization_endpoints() {
        assert_eq!(srgb_to_linear(0), 0);
        assert_eq!(srgb_to_linear(255), 255);
    }

    #[test]
    fn rejects_non_square() {
        let raw = vec![0u8; 128 * 64 * 3];
        assert!(matches!(
            Texture::from_raw(&raw, 128, 64, 3, false),
            Err(LoadError::NotSquare { .. })
        ));
    }

    #[test]
    fn rejects_wrong_size() {
        let raw = vec![0u8; 64 * 64 * 3];
        assert!(matches!(
            Texture::from_raw(&raw, 64, 64, 3, false),
            Err(LoadError::WrongSize {
                expected: 128,
                got: 64
            })
        ));
    }

    #[test]
    fn rejects_channel_mismatch() {
        let raw = vec![0u8; 128 * 128 * 4];
        assert!(matches!(
            Texture::from_raw(&raw, 128, 128, 4, false),
            Err(LoadError::WrongChannels {
                expected: 3,
                got: 4
            })
        ));
    }
}
