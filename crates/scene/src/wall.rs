use glam::IVec2;

/// Texels of wall texture per tile. Must match the raster texture side.
pub const TEXELS_PER_TILE: i32 = 128;

/// World units covered by one full texture repeat along either wall axis.
pub const WORLD_PER_TILE: i32 = 256;

/// A vertical wall segment on the ground plane.
///
/// `width_tex` and `height_tex` are texture-space spans derived once in
/// [`Wall::new`] from the segment length and the elevation extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wall {
    pub a: IVec2,
    pub b: IVec2,
    pub elev_low: i32,
    pub elev_high: i32,
    pub width_tex: i32,
    pub height_tex: i32,
}

impl Wall {
    pub fn new(a: IVec2, b: IVec2, elev_low: i32, elev_high: i32) -> Self {
        let dx = (b.x - a.x) as i64;
        let dy = (b.y - a.y) as i64;
        let len = ((dx * dx + dy * dy) as f64).sqrt();
        let width_tex = (len * TEXELS_PER_TILE as f64 / WORLD_PER_TILE as f64) as i32;
        let height_tex = (elev_high - elev_low) * TEXELS_PER_TILE / WORLD_PER_TILE;
        Self {
            a,
            b,
            elev_low,
            elev_high,
            width_tex,
            height_tex,
        }
    }
}

/// Camera position on the ground plane plus eye elevation.
///
/// Supplied fresh by the caller every frame; the camera always looks along
/// +Y, so +Y is forward depth and +X is screen-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraPose {
    pub pos: IVec2,
    pub elev: i32,
}

impl CameraPose {
    pub fn new(pos: IVec2, elev: i32) -> Self {
        Self { pos, elev }
    }
}

/// Ordered wall collection, static for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    walls: Vec<Wall>,
}

impl Scene {
    pub fn new(walls: Vec<Wall>) -> Self {
        Self { walls }
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    /// Fixed demo interior: a few wall panels fanned out in front of the
    /// origin, all at positive forward depth for the default pose.
    pub fn demo() -> Self {
        Self::new(vec![
            Wall::new(IVec2::new(-2200, 2600), IVec2::new(-600, 700), -800, 200),
            Wall::new(IVec2::new(-600, 700), IVec2::new(900, 900), -800, 200),
            Wall::new(IVec2::new(900, 900), IVec2::new(2400, 2800), -800, 200),
            Wall::new(IVec2::new(-1400, 4200), IVec2::new(1600, 4600), -800, 600),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_fields_are_pure() {
        let a = Wall::new(IVec2::new(-500, 500), IVec2::new(2000, 3000), -800, 200);
        let b = Wall::new(IVec2::new(-500, 500), IVec2::new(2000, 3000), -800, 200);
        assert_eq!(a, b);
    }

    #[test]
    fn width_tex_from_segment_length() {
        // 3-4-5 triangle: length 500 world units -> 250 texels at 128/256.
        let w = Wall::new(IVec2::ZERO, IVec2::new(300, 400), 0, 0);
        assert_eq!(w.width_tex, 500 * TEXELS_PER_TILE / WORLD_PER_TILE);
    }

    #[test]
    fn height_tex_from_elevation_span() {
        let w = Wall::new(IVec2::ZERO, IVec2::new(100, 0), -800, 200);
        assert_eq!(w.height_tex, 1000 * TEXELS_PER_TILE / WORLD_PER_TILE);
    }

    #[test]
    fn demo_scene_is_non_empty() {
        assert!(!Scene::demo().walls().is_empty());
    }
}
