/// Clear color, packed like every sample: 0xAARRGGBB in a little-endian
/// word, so the in-memory byte order is B, G, R, A.
pub const BACKGROUND: u32 = 0xff18_1010;

/// Dense column-major pixel target, exactly `width * height` packed colors.
///
/// Column-major means `index = x * height + y`; the presentation shader
/// indexes the staged buffer the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![BACKGROUND; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self) {
        self.pixels.fill(BACKGROUND);
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[(x * self.height + y) as usize]
    }

    /// All rows of one column, top row first.
    pub fn column_mut(&mut self, x: u32) -> &mut [u32] {
        let h = self.height as usize;
        let start = x as usize * h;
        &mut self.pixels[start..start + h]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_major_layout() {
        let mut fb = Framebuffer::new(4, 3);
        fb.column_mut(2)[1] = 0xdead_beef;
        assert_eq!(fb.get(2, 1), 0xdead_beef);
        assert_eq!(fb.pixels()[2 * 3 + 1], 0xdead_beef);
    }

    #[test]
    fn clear_restores_background() {
        let mut fb = Framebuffer::new(2, 2);
        fb.column_mut(0)[0] = 0;
        fb.clear();
        assert!(fb.pixels().iter().all(|&p| p == BACKGROUND));
    }

    #[test]
    fn byte_view_covers_every_sample() {
        let fb = Framebuffer::new(8, 4);
        assert_eq!(fb.as_bytes().len(), 8 * 4 * 4);
    }
}
