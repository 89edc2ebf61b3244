use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::RegionId;

/// World units per grid step. A region at grid `(x, y)` has its origin at
/// `(x * GRID_UNIT, y * GRID_UNIT)` in the world-global frame.
pub const GRID_UNIT: f64 = 256.0;

/// A rectangular, independently hosted slice of the world.
///
/// Immutable after creation. Positions inside the region are expressed in its
/// local frame; adding [`Region::origin`] yields world-global coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    id: RegionId,
    name: String,
    grid_x: u32,
    grid_y: u32,
    size_x: u32,
    size_y: u32,
}

impl Region {
    /// A region of the default 256 x 256 size at the given grid location.
    pub fn new(id: RegionId, name: impl Into<String>, grid_x: u32, grid_y: u32) -> Self {
        Self::with_size(id, name, grid_x, grid_y, GRID_UNIT as u32, GRID_UNIT as u32)
    }

    /// A region spanning `size_x` by `size_y` metres (var-regions).
    pub fn with_size(
        id: RegionId,
        name: impl Into<String>,
        grid_x: u32,
        grid_y: u32,
        size_x: u32,
        size_y: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            grid_x,
            grid_y,
            size_x,
            size_y,
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> (u32, u32) {
        (self.grid_x, self.grid_y)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.size_x, self.size_y)
    }

    /// Offset of the local frame inside the world-global frame.
    pub fn origin(&self) -> DVec3 {
        DVec3::new(
            f64::from(self.grid_x) * GRID_UNIT,
            f64::from(self.grid_y) * GRID_UNIT,
            0.0,
        )
    }

    /// World-global `(min, max)` corners of the region footprint (XY only).
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        let o = self.origin();
        (
            [o.x, o.y],
            [o.x + f64::from(self.size_x), o.y + f64::from(self.size_y)],
        )
    }

    /// Half-open ownership test on a world-global position:
    /// `x0 <= x < x1 && y0 <= y < y1`. Height is ignored.
    pub fn contains_global(&self, pos: DVec3) -> bool {
        let (min, max) = self.bounds();
        min[0] <= pos.x && pos.x < max[0] && min[1] <= pos.y && pos.y < max[1]
    }

    /// Same as [`Region::contains_global`] but for a position in this region's frame.
    pub fn contains_local(&self, pos: DVec3) -> bool {
        self.contains_global(to_global(pos, self))
    }

    /// Whether the square `[pos - margin, pos + margin]` overlaps this region's
    /// footprint. Used to decide which neighbours must mirror an avatar.
    pub fn intersects_margin(&self, pos: DVec3, margin: f64) -> bool {
        let (min, max) = self.bounds();
        pos.x + margin >= min[0]
            && pos.x - margin < max[0]
            && pos.y + margin >= min[1]
            && pos.y - margin < max[1]
    }
}

/// Translate a world-global position into `region`'s local frame.
pub fn to_local(global: DVec3, region: &Region) -> DVec3 {
    global - region.origin()
}

/// Translate a position in `region`'s local frame into the world-global frame.
pub fn to_global(local: DVec3, region: &Region) -> DVec3 {
    local + region.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn west() -> Region {
        Region::new(RegionId::from_tail(1), "west", 1000, 1000)
    }

    fn east() -> Region {
        Region::new(RegionId::from_tail(2), "east", 1001, 1000)
    }

    #[test]
    fn origin_follows_grid() {
        assert_eq!(east().origin(), DVec3::new(256_256.0, 256_000.0, 0.0));
    }

    #[test]
    fn round_trip_is_identity() {
        let r = east();
        for p in [
            DVec3::new(256_262.0, 256_128.0, 20.0),
            DVec3::new(256_256.25, 256_000.5, -3.0),
            DVec3::new(256_511.75, 256_255.0, 4096.0),
            DVec3::ZERO,
        ] {
            assert_eq!(to_global(to_local(p, &r), &r), p);
        }
    }

    #[test]
    fn west_position_in_east_frame() {
        let w = west();
        let e = east();
        let global = to_global(DVec3::new(250.0, 128.0, 20.0), &w);
        assert_eq!(to_local(global, &e), DVec3::new(-6.0, 128.0, 20.0));
    }

    #[test]
    fn border_belongs_to_east_side() {
        let w = west();
        let e = east();
        let border = DVec3::new(256_256.0, 256_100.0, 0.0);
        assert!(!w.contains_global(border));
        assert!(e.contains_global(border));
    }

    #[test]
    fn margin_reaches_across_border() {
        let e = east();
        let near_border = to_global(DVec3::new(250.0, 128.0, 20.0), &west());
        assert!(e.intersects_margin(near_border, 10.0));
        assert!(!e.intersects_margin(near_border, 5.0));
    }

    #[test]
    fn contains_local_uses_own_frame() {
        let r = west();
        assert!(r.contains_local(DVec3::new(0.0, 0.0, 0.0)));
        assert!(!r.contains_local(DVec3::new(256.0, 10.0, 0.0)));
        assert!(!r.contains_local(DVec3::new(-0.5, 10.0, 0.0)));
    }
}
