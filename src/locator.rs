//! Randomized, bounded search over the tile graph.
//!
//! The search keeps an explicit stack seeded with the start tile. Each pop tests the
//! tile's neighbours in a freshly shuffled order and returns the first match; the
//! rest are pushed for later expansion. Shuffling keeps repeated searches from the
//! same origin from always favouring one direction. Work is capped at
//! `4 * max_depth` expansions after the first.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::map::{BuildingKind, TileMask, WorldMap};
use crate::types::{BuildingId, TileId};

/// What a search found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Found {
    Tile(TileId),
    Building(BuildingId),
}

impl Found {
    /// The tile the match sits on.
    pub fn tile(&self, map: &WorldMap) -> Option<TileId> {
        match self {
            Found::Tile(tile) => Some(*tile),
            Found::Building(building) => map.building(*building).map(|b| b.tile),
        }
    }
}

/// Common search predicates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// Any tile whose kind is in the mask.
    TileKinds(TileMask),
    /// A building of `kind` (any variant), optionally with a free slot and finished.
    Building {
        kind: BuildingKind,
        vacancy: bool,
        complete: bool,
    },
}

impl Target {
    pub fn usable_building(kind: BuildingKind) -> Self {
        Target::Building {
            kind,
            vacancy: true,
            complete: true,
        }
    }

    pub fn test(&self, map: &WorldMap, tile: TileId) -> Option<Found> {
        let tile_ref = map.tile(tile)?;
        match *self {
            Target::TileKinds(mask) => mask.contains(tile_ref.kind).then_some(Found::Tile(tile)),
            Target::Building {
                kind,
                vacancy,
                complete,
            } => tile_ref
                .buildings
                .iter()
                .filter_map(|id| map.building(*id))
                .find(|b| {
                    b.serves(kind)
                        && (!vacancy || b.has_vacancy())
                        && (!complete || b.is_complete())
                })
                .map(|b| Found::Building(b.id)),
        }
    }
}

/// Search for `target` starting at `start`.
pub fn find(
    map: &WorldMap,
    start: TileId,
    target: Target,
    max_depth: usize,
    rng: &mut impl Rng,
) -> Option<Found> {
    find_with(map, start, max_depth, rng, |map, tile| target.test(map, tile))
}

/// Search with an arbitrary predicate. The start tile itself is tested first.
pub fn find_with<R, P>(
    map: &WorldMap,
    start: TileId,
    max_depth: usize,
    rng: &mut R,
    mut predicate: P,
) -> Option<Found>
where
    R: Rng + ?Sized,
    P: FnMut(&WorldMap, TileId) -> Option<Found>,
{
    map.tile(start)?;
    if let Some(found) = predicate(map, start) {
        return Some(found);
    }

    let budget = 4 * max_depth;
    let mut expansions = 0usize;
    let mut seen: HashSet<TileId> = HashSet::from([start]);
    let mut stack = vec![start];

    while let Some(current) = stack.pop() {
        if expansions > budget {
            break;
        }
        expansions += 1;

        let Some(tile) = map.tile(current) else {
            continue;
        };
        let mut neighbors: Vec<TileId> = tile.neighbor_ids().collect();
        neighbors.shuffle(rng);

        for neighbor in neighbors {
            if !seen.insert(neighbor) {
                continue;
            }
            if let Some(found) = predicate(map, neighbor) {
                return Some(found);
            }
            stack.push(neighbor);
        }
    }

    log::debug!(
        "Search from {} gave up after {} expansions",
        start,
        expansions
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::TileKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn plains(width: usize, height: usize) -> WorldMap {
        WorldMap::grid(width, height, |_, _| TileKind::Grassland)
    }

    #[test]
    fn test_depth_zero_stops_at_immediate_neighbors() {
        let map = plains(7, 7);
        let start = map.tile_at(3, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut tested = Vec::new();

        let result = find_with(&map, start, 0, &mut rng, |map, tile| {
            tested.push(tile);
            Target::TileKinds(TileMask::WATER).test(map, tile)
        });

        assert_eq!(result, None);
        assert_eq!(tested.len(), 5);
        let origin = map.tile(start).unwrap().position;
        for tile in tested {
            let position = map.tile(tile).unwrap().position;
            assert!(origin.distance(&position) <= 1.0);
        }
    }

    #[test]
    fn test_finds_matching_tile_kind() {
        let map = WorldMap::grid(5, 5, |x, y| {
            if x == 4 && y == 4 {
                TileKind::Forest
            } else {
                TileKind::Grassland
            }
        });
        let mut rng = StdRng::seed_from_u64(1);
        let found = find(
            &map,
            TileId(0),
            Target::TileKinds(TileMask::FOREST),
            50,
            &mut rng,
        );
        assert_eq!(found, Some(Found::Tile(TileId(24))));
    }

    #[test]
    fn test_start_tile_counts() {
        let map = WorldMap::grid(3, 3, |_, _| TileKind::Forest);
        let mut rng = StdRng::seed_from_u64(1);
        let found = find(&map, TileId(4), Target::TileKinds(TileMask::FOREST), 0, &mut rng);
        assert_eq!(found, Some(Found::Tile(TileId(4))));
    }

    #[test]
    fn test_building_predicates() {
        let mut map = plains(5, 1);
        let small = map.add_building(TileId(2), BuildingKind::Farm, 0, 1).unwrap();
        let large = map.add_building(TileId(4), BuildingKind::Farm, 1, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let found = find(&map, TileId(2), Target::usable_building(BuildingKind::Farm), 10, &mut rng);
        assert_eq!(found, Some(Found::Building(small)));

        // A full farm is skipped and the other variant is accepted in its place.
        assert!(map.occupy(small));
        let found = find(&map, TileId(2), Target::usable_building(BuildingKind::Farm), 10, &mut rng);
        assert_eq!(found, Some(Found::Building(large)));
        assert_eq!(found.unwrap().tile(&map), Some(TileId(4)));

        // Unfinished buildings are skipped too.
        map.building_mut(large).unwrap().construction = rust_decimal_macros::dec!(0.5);
        let found = find(&map, TileId(2), Target::usable_building(BuildingKind::Farm), 10, &mut rng);
        assert_eq!(found, None);

        let any_farm = Target::Building {
            kind: BuildingKind::Farm,
            vacancy: false,
            complete: false,
        };
        assert!(find(&map, TileId(0), any_farm, 10, &mut rng).is_some());
    }

    #[test]
    fn test_search_is_bounded() {
        let map = plains(40, 40);
        let mut rng = StdRng::seed_from_u64(11);
        let mut tested = 0;
        let result = find_with(&map, TileId(0), 3, &mut rng, |_, _| {
            tested += 1;
            None
        });
        assert_eq!(result, None);
        // One start test plus at most four neighbours per expansion.
        assert!(tested <= 1 + 4 * (4 * 3 + 1));
    }

    #[test]
    fn test_shuffled_order_reaches_all_directions() {
        let map = plains(3, 3);
        let mut firsts = HashSet::new();
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..64 {
            let mut first = None;
            find_with(&map, TileId(4), 0, &mut rng, |_, tile| {
                if tile != TileId(4) && first.is_none() {
                    first = Some(tile);
                }
                None
            });
            firsts.insert(first.unwrap());
        }
        assert_eq!(firsts.len(), 4);
    }
}
