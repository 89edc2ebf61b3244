use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use regionsync_common::{Region, RegionId};

/// A region and the regions bordering it.
///
/// Neighbours are any regions whose footprint touches the home footprint,
/// diagonals included. Lookups by position use the half-open ownership rule
/// from [`Region::contains_global`].
#[derive(Debug, Clone)]
pub struct NeighborMap {
    home: Region,
    neighbours: BTreeMap<RegionId, Region>,
}

impl NeighborMap {
    pub fn new(home: Region) -> Self {
        Self {
            home,
            neighbours: BTreeMap::new(),
        }
    }

    /// Build the map for `home`, keeping every region of `all` that borders it.
    pub fn from_regions<'a>(home: Region, all: impl IntoIterator<Item = &'a Region>) -> Self {
        let mut map = Self::new(home);
        for region in all {
            if borders(&map.home, region) {
                map.insert(region.clone());
            }
        }
        map
    }

    /// Add a neighbour. The home region itself is never its own neighbour.
    pub fn insert(&mut self, region: Region) -> bool {
        if region.id() == self.home.id() {
            return false;
        }
        self.neighbours.insert(region.id(), region).is_none()
    }

    pub fn home(&self) -> &Region {
        &self.home
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        if id == self.home.id() {
            Some(&self.home)
        } else {
            self.neighbours.get(&id)
        }
    }

    pub fn neighbours(&self) -> impl Iterator<Item = &Region> {
        self.neighbours.values()
    }

    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }

    /// Region owning a world-global position, among home and its neighbours.
    pub fn owner_of(&self, global: DVec3) -> Option<RegionId> {
        std::iter::once(&self.home)
            .chain(self.neighbours.values())
            .find(|r| r.contains_global(global))
            .map(Region::id)
    }

    /// Neighbours whose footprint lies within `margin` of `global`.
    pub fn qualifying(&self, global: DVec3, margin: f64) -> BTreeSet<RegionId> {
        self.neighbours
            .values()
            .filter(|r| r.intersects_margin(global, margin))
            .map(Region::id)
            .collect()
    }
}

/// Whether two distinct footprints share an edge or a corner.
fn borders(a: &Region, b: &Region) -> bool {
    if a.id() == b.id() {
        return false;
    }
    let (amin, amax) = a.bounds();
    let (bmin, bmax) = b.bounds();
    bmin[0] <= amax[0] && amin[0] <= bmax[0] && bmin[1] <= amax[1] && amin[1] <= bmax[1]
}
