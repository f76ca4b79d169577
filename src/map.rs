//! Tile graph the locator searches.
//!
//! Tiles and buildings live in flat vectors and refer to each other by id, so the
//! whole map serializes without back-reference cycles.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::stockpile::Stockpile;
use crate::types::{BuildingId, Position, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Grassland,
    Farmland,
    Forest,
    Hills,
    Mountain,
    Water,
    Desert,
}

impl TileKind {
    pub fn mask(self) -> TileMask {
        TileMask(1 << self as u32)
    }
}

/// Set of tile kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileMask(pub u32);

impl TileMask {
    pub const EMPTY: TileMask = TileMask(0);
    pub const GRASSLAND: TileMask = TileMask(1 << TileKind::Grassland as u32);
    pub const FARMLAND: TileMask = TileMask(1 << TileKind::Farmland as u32);
    pub const FOREST: TileMask = TileMask(1 << TileKind::Forest as u32);
    pub const HILLS: TileMask = TileMask(1 << TileKind::Hills as u32);
    pub const MOUNTAIN: TileMask = TileMask(1 << TileKind::Mountain as u32);
    pub const WATER: TileMask = TileMask(1 << TileKind::Water as u32);
    pub const DESERT: TileMask = TileMask(1 << TileKind::Desert as u32);

    pub fn contains(self, kind: TileKind) -> bool {
        self.0 & kind.mask().0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TileMask {
    type Output = TileMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        TileMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TileMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    House,
    Farm,
    Mill,
    Bakery,
    Sawmill,
    Smithy,
    Kitchen,
    Market,
}

/// Neighbour slots, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub kind: TileKind,
    pub position: Position,
    pub neighbors: [Option<TileId>; 4],
    pub buildings: Vec<BuildingId>,
    pub population: u32,
    /// Harvest speed divisor for plants grown here. 1 is average soil.
    pub soil_quality: Decimal,
    pub stockpile: Stockpile,
}

impl Tile {
    pub fn neighbor(&self, direction: Direction) -> Option<TileId> {
        self.neighbors[direction as usize]
    }

    pub fn neighbor_ids(&self) -> impl Iterator<Item = TileId> + '_ {
        self.neighbors.iter().flatten().copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    pub kind: BuildingKind,
    /// Cosmetic/size variant. Variants of one kind are interchangeable.
    pub variant: u8,
    pub tile: TileId,
    pub current_users: u32,
    pub max_users: u32,
    /// Construction progress, 1 when finished.
    pub construction: Decimal,
    pub stockpile: Stockpile,
}

impl Building {
    pub fn is_complete(&self) -> bool {
        self.construction >= Decimal::ONE
    }

    pub fn has_vacancy(&self) -> bool {
        self.current_users < self.max_users
    }

    pub fn serves(&self, kind: BuildingKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Building {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} #{} ({}/{} users)",
            self.kind, self.id.0, self.current_users, self.max_users
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldMap {
    pub width: usize,
    pub height: usize,
    tiles: Vec<Tile>,
    buildings: Vec<Building>,
}

impl WorldMap {
    /// A `width` x `height` grid with four-way links; `kind_at` picks each tile's kind.
    pub fn grid(width: usize, height: usize, mut kind_at: impl FnMut(usize, usize) -> TileKind) -> Self {
        let mut tiles = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let index = y * width + x;
                let mut neighbors = [None; 4];
                if y > 0 {
                    neighbors[Direction::North as usize] = Some(TileId(index - width));
                }
                if x + 1 < width {
                    neighbors[Direction::East as usize] = Some(TileId(index + 1));
                }
                if y + 1 < height {
                    neighbors[Direction::South as usize] = Some(TileId(index + width));
                }
                if x > 0 {
                    neighbors[Direction::West as usize] = Some(TileId(index - 1));
                }
                tiles.push(Tile {
                    id: TileId(index),
                    kind: kind_at(x, y),
                    position: Position::new(x as f64, y as f64),
                    neighbors,
                    buildings: Vec::new(),
                    population: 0,
                    soil_quality: Decimal::ONE,
                    stockpile: Stockpile::new(),
                });
            }
        }
        Self {
            width,
            height,
            tiles,
            buildings: Vec::new(),
        }
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id.0)
    }

    pub fn tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(id.0)
    }

    pub fn tile_at(&self, x: usize, y: usize) -> Option<TileId> {
        if x < self.width && y < self.height {
            Some(TileId(y * self.width + x))
        } else {
            None
        }
    }

    /// Tile under a world position, rounding to the nearest grid point.
    pub fn tile_at_position(&self, position: Position) -> Option<TileId> {
        if position.x < -0.5 || position.y < -0.5 {
            return None;
        }
        self.tile_at(position.x.round() as usize, position.y.round() as usize)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    pub fn building(&self, id: BuildingId) -> Option<&Building> {
        self.buildings.get(id.0)
    }

    pub fn building_mut(&mut self, id: BuildingId) -> Option<&mut Building> {
        self.buildings.get_mut(id.0)
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn buildings_mut(&mut self) -> &mut [Building] {
        &mut self.buildings
    }

    /// Place a finished building on `tile`. Returns `None` if the tile does not exist.
    pub fn add_building(&mut self, tile: TileId, kind: BuildingKind, variant: u8, max_users: u32) -> Option<BuildingId> {
        let id = BuildingId(self.buildings.len());
        self.tiles.get_mut(tile.0)?.buildings.push(id);
        self.buildings.push(Building {
            id,
            kind,
            variant,
            tile,
            current_users: 0,
            max_users,
            construction: Decimal::ONE,
            stockpile: Stockpile::new(),
        });
        Some(id)
    }

    /// Position of a building, i.e. of its tile.
    pub fn building_position(&self, id: BuildingId) -> Option<Position> {
        let building = self.building(id)?;
        self.tile(building.tile).map(|t| t.position)
    }

    /// Register one more user of `id`. Fails when the building is full or missing.
    pub fn occupy(&mut self, id: BuildingId) -> bool {
        match self.buildings.get_mut(id.0) {
            Some(b) if b.has_vacancy() => {
                b.current_users += 1;
                true
            }
            _ => false,
        }
    }

    /// Counterpart of [`WorldMap::occupy`].
    pub fn release(&mut self, id: BuildingId) {
        if let Some(b) = self.buildings.get_mut(id.0) {
            if b.current_users == 0 {
                log::warn!("Releasing {} which has no users", id);
            }
            b.current_users = b.current_users.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_links_four_neighbors() {
        let map = WorldMap::grid(3, 3, |_, _| TileKind::Grassland);
        let center = map.tile(TileId(4)).unwrap();
        assert_eq!(center.neighbor(Direction::North), Some(TileId(1)));
        assert_eq!(center.neighbor(Direction::East), Some(TileId(5)));
        assert_eq!(center.neighbor(Direction::South), Some(TileId(7)));
        assert_eq!(center.neighbor(Direction::West), Some(TileId(3)));

        let corner = map.tile(TileId(0)).unwrap();
        assert_eq!(corner.neighbor_ids().count(), 2);
    }

    #[test]
    fn test_mask_membership() {
        let mask = TileMask::FOREST | TileMask::HILLS;
        assert!(mask.contains(TileKind::Forest));
        assert!(mask.contains(TileKind::Hills));
        assert!(!mask.contains(TileKind::Water));
        assert!(TileMask::EMPTY.is_empty());
    }

    #[test]
    fn test_occupancy_is_bounded() {
        let mut map = WorldMap::grid(2, 1, |_, _| TileKind::Grassland);
        let mill = map.add_building(TileId(1), BuildingKind::Mill, 0, 1).unwrap();
        assert!(map.occupy(mill));
        assert!(!map.occupy(mill));
        map.release(mill);
        assert_eq!(map.building(mill).unwrap().current_users, 0);
        map.release(mill);
        assert_eq!(map.building(mill).unwrap().current_users, 0);
    }

    #[test]
    fn test_tile_at_position_rounds() {
        let map = WorldMap::grid(4, 4, |_, _| TileKind::Grassland);
        assert_eq!(map.tile_at_position(Position::new(2.4, 0.6)), Some(TileId(6)));
        assert_eq!(map.tile_at_position(Position::new(9.0, 0.0)), None);
        assert_eq!(map.tile_at_position(Position::new(-3.0, 0.0)), None);
    }
}
