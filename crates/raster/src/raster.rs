use crate::framebuffer::Framebuffer;
use crate::texture::Texture;
use wallcast_scene::{CameraPose, Scene, Wall};

/// Scanline wall rasterizer.
///
/// Walls are painted in scene order over a cleared background; later walls
/// overwrite earlier ones. Column and row placement uses truncating integer
/// projection throughout; only the horizontal texture coordinate runs
/// through a floating-point 1/z-correct interpolation, which never feeds
/// back into clipping.
pub struct Rasterizer {
    texture: Texture,
}

impl Rasterizer {
    pub fn new(texture: Texture) -> Self {
        Self { texture }
    }

    /// Fully overwrite `fb` from the given pose and scene.
    pub fn render(&self, fb: &mut Framebuffer, scene: &Scene, pose: CameraPose) {
        fb.clear();
        for wall in scene.walls() {
            self.draw_wall(fb, wall, pose);
        }
    }

    fn draw_wall(&self, fb: &mut Framebuffer, wall: &Wall, pose: CameraPose) {
        let w = fb.width() as i64;
        let h = fb.height() as i64;
        let half_w = w / 2;
        let half_h = h / 2;

        // Camera-relative ground coordinates; +Y is forward depth.
        let ax = (wall.a.x - pose.pos.x) as i64;
        let ay = (wall.a.y - pose.pos.y) as i64;
        let bx = (wall.b.x - pose.pos.x) as i64;
        let by = (wall.b.y - pose.pos.y) as i64;
        if ay <= 0 || by <= 0 {
            return;
        }
        let elev_low = (wall.elev_low - pose.elev) as i64;
        let elev_high = (wall.elev_high - pose.elev) as i64;

        // Pinhole projection, truncating division.
        let xa = ax * half_h / ay + half_w;
        let xb = bx * half_h / by + half_w;
        let ya_low = elev_low * half_h / ay + half_h;
        let ya_high = elev_high * half_h / ay + half_h;
        let yb_low = elev_low * half_h / by + half_h;
        let yb_high = elev_high * half_h / by + half_h;

        // Orient the span left-to-right; the texture span flips with it.
        let (x0, x1, z0, z1, y0_low, y0_high, y1_low, y1_high, u0, u1) = if xa <= xb {
            (xa, xb, ay, by, ya_low, ya_high, yb_low, yb_high, 0, wall.width_tex as i64)
        } else {
            (xb, xa, by, ay, yb_low, yb_high, ya_low, ya_high, wall.width_tex as i64, 0)
        };
        if x1 < 0 || x0 > w - 1 {
            return;
        }

        // Perspective-correct horizontal setup: lerp u/z and 1/z, divide.
        let inv_z0 = 1.0 / z0 as f64;
        let inv_z1 = 1.0 / z1 as f64;
        let uz0 = u0 as f64 * inv_z0;
        let uz1 = u1 as f64 * inv_z1;

        let den = x1 - x0;
        for x in x0.max(0)..=x1.min(w - 1) {
            let num = x - x0;
            // Row extremes lerp linearly across the unclipped column span. A
            // span projecting to a single column degenerates to the left
            // endpoint.
            let (row_low, row_high, t) = if den == 0 {
                (y0_low, y0_high, 0.0)
            } else {
                (
                    y0_low + (y1_low - y0_low) * num / den,
                    y0_high + (y1_high - y0_high) * num / den,
                    num as f64 / den as f64,
                )
            };
            if row_high < 0 || row_low > h - 1 || row_low > row_high {
                continue;
            }

            let inv_z = inv_z0 + (inv_z1 - inv_z0) * t;
            let u = ((uz0 + (uz1 - uz0) * t) / inv_z) as i32;

            let row_span = row_high - row_low;
            let height_tex = wall.height_tex as i64;
            let col = fb.column_mut(x as u32);
            for y in row_low.max(0)..=row_high.min(h - 1) {
                let v = if row_span == 0 {
                    0
                } else {
                    ((y - row_low) * height_tex / row_span) as i32
                };
                col[y as usize] = self.texture.sample(u, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::BACKGROUND;
    use glam::IVec2;

    fn white_texture() -> Texture {
        let size = Texture::SIZE as usize;
        let raw = vec![255u8; size * size * 3];
        Texture::from_raw(&raw, Texture::SIZE, Texture::SIZE, 3, false).unwrap()
    }

    fn painted_columns(fb: &Framebuffer) -> Vec<u32> {
        (0..fb.width())
            .filter(|&x| (0..fb.height()).any(|y| fb.get(x, y) != BACKGROUND))
            .collect()
    }

    fn render_one(wall: Wall, pose: CameraPose, w: u32, h: u32) -> Framebuffer {
        let mut fb = Framebuffer::new(w, h);
        let raster = Rasterizer::new(white_texture());
        raster.render(&mut fb, &Scene::new(vec![wall]), pose);
        fb
    }

    #[test]
    fn rendering_is_idempotent() {
        let raster = Rasterizer::new(white_texture());
        let scene = Scene::demo();
        let pose = CameraPose::new(IVec2::new(40, -30), 25);
        let mut fb1 = Framebuffer::new(320, 200);
        let mut fb2 = Framebuffer::new(320, 200);
        raster.render(&mut fb1, &scene, pose);
        raster.render(&mut fb2, &scene, pose);
        assert_eq!(fb1.as_bytes(), fb2.as_bytes());
    }

    #[test]
    fn wall_behind_camera_is_culled() {
        let wall = Wall::new(IVec2::new(-100, -50), IVec2::new(100, 200), -100, 100);
        let fb = render_one(wall, CameraPose::default(), 320, 200);
        assert!(painted_columns(&fb).is_empty());
    }

    #[test]
    fn wall_at_camera_plane_is_culled() {
        let wall = Wall::new(IVec2::new(-100, 0), IVec2::new(100, 100), -100, 100);
        let fb = render_one(wall, CameraPose::default(), 320, 200);
        assert!(painted_columns(&fb).is_empty());
    }

    #[test]
    fn fully_offscreen_span_paints_nothing() {
        // Both columns project far right of the viewport.
        let wall = Wall::new(IVec2::new(10_000, 100), IVec2::new(20_000, 100), -100, 100);
        let fb = render_one(wall, CameraPose::default(), 320, 200);
        assert!(painted_columns(&fb).is_empty());
    }

    #[test]
    fn partial_span_paints_only_the_clipped_intersection() {
        // proj_x(a) = -100*100/100 + 160 = 60, proj_x(b) = 500*100/100 + 160 = 660.
        let wall = Wall::new(IVec2::new(-100, 100), IVec2::new(500, 100), -50, 50);
        let fb = render_one(wall, CameraPose::default(), 320, 200);
        let cols = painted_columns(&fb);
        assert_eq!(cols.first(), Some(&60));
        assert_eq!(cols.last(), Some(&319));
    }

    #[test]
    fn end_to_end_trapezoid() {
        // One slanted wall, 800x600 viewport, camera at the origin.
        let wall = Wall::new(IVec2::new(-500, 500), IVec2::new(2000, 3000), -800, 200);
        let fb = render_one(wall, CameraPose::default(), 800, 600);

        // proj_x(a) = -500*300/500 + 400 = 100, proj_x(b) = 2000*300/3000 + 400 = 600.
        let cols = painted_columns(&fb);
        assert!(!cols.is_empty());
        assert_eq!(cols.first(), Some(&100));
        assert_eq!(cols.last(), Some(&600));

        // Everything outside the clipped column range stays background.
        for x in (0..100).chain(601..800) {
            for y in 0..600 {
                assert_eq!(fb.get(x, y), BACKGROUND);
            }
        }

        // Far endpoint rows: elevations -800/200 at depth 3000 project to
        // rows 220 and 320.
        assert_eq!(fb.get(600, 219), BACKGROUND);
        assert_ne!(fb.get(600, 220), BACKGROUND);
        assert_ne!(fb.get(600, 320), BACKGROUND);
        assert_eq!(fb.get(600, 321), BACKGROUND);
    }

    #[test]
    fn single_column_wall_paints_one_column() {
        // Both endpoints project to column 160; rows come from the near
        // endpoint: -50*100/100 + 100 = 50 through 50*100/100 + 100 = 150.
        let wall = Wall::new(IVec2::new(0, 100), IVec2::new(0, 200), -50, 50);
        let fb = render_one(wall, CameraPose::default(), 320, 200);
        assert_eq!(painted_columns(&fb), vec![160]);
        assert_eq!(fb.get(160, 49), BACKGROUND);
        assert_ne!(fb.get(160, 50), BACKGROUND);
        assert_ne!(fb.get(160, 150), BACKGROUND);
        assert_eq!(fb.get(160, 151), BACKGROUND);
    }

    #[test]
    fn right_to_left_wall_still_paints() {
        // Endpoints given so b projects left of a; the span is reoriented.
        let wall = Wall::new(IVec2::new(500, 1000), IVec2::new(-500, 1000), -100, 100);
        let fb = render_one(wall, CameraPose::default(), 320, 200);
        assert!(!painted_columns(&fb).is_empty());
    }
}
