//! Good identity.
//!
//! A good kind is the triple (category, subtype, material) packed into a single
//! integer so it can key stockpiles, order books and the production catalog:
//!
//! ```text
//! id = category * CATEGORY_RADIX + material * MATERIAL_RADIX + subtype
//! ```
//!
//! Subtypes and materials must stay below `MATERIAL_RADIX`, which keeps decoding
//! lossless.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CATEGORY_RADIX: u32 = 10_000;
pub const MATERIAL_RADIX: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GoodCategory {
    Raw,
    Plant,
    Wood,
    Food,
    Material,
    Tool,
}

impl GoodCategory {
    pub const ALL: [GoodCategory; 6] = [
        GoodCategory::Raw,
        GoodCategory::Plant,
        GoodCategory::Wood,
        GoodCategory::Food,
        GoodCategory::Material,
        GoodCategory::Tool,
    ];

    fn index(self) -> u32 {
        self as u32
    }

    fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Number of subtypes defined for this category.
    pub fn subtype_count(self) -> u16 {
        match self {
            GoodCategory::Raw => raw::COUNT,
            GoodCategory::Plant => plant::COUNT,
            GoodCategory::Wood => wood::COUNT,
            GoodCategory::Food => food::COUNT,
            GoodCategory::Material => material::COUNT,
            GoodCategory::Tool => tool::COUNT,
        }
    }
}

/// Material grade. Ordering is quality: a tool of a higher grade satisfies any
/// requirement for a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Material {
    None,
    Wood,
    Stone,
    Copper,
    Bronze,
    Iron,
    Steel,
}

impl Material {
    pub const ALL: [Material; 7] = [
        Material::None,
        Material::Wood,
        Material::Stone,
        Material::Copper,
        Material::Bronze,
        Material::Iron,
        Material::Steel,
    ];

    pub const METALS: [Material; 4] = [
        Material::Copper,
        Material::Bronze,
        Material::Iron,
        Material::Steel,
    ];

    fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn is_metal(self) -> bool {
        self >= Material::Copper
    }
}

pub mod raw {
    pub const STONE: u16 = 0;
    pub const CLAY: u16 = 1;
    pub const ORE: u16 = 2;
    pub const COUNT: u16 = 3;
}

pub mod plant {
    pub const WHEAT: u16 = 0;
    pub const FLAX: u16 = 1;
    pub const BERRIES: u16 = 2;
    pub const VEGETABLES: u16 = 3;
    pub const COUNT: u16 = 4;
}

pub mod wood {
    pub const LOG: u16 = 0;
    pub const BRANCH: u16 = 1;
    pub const COUNT: u16 = 2;
}

pub mod food {
    pub const FLOUR: u16 = 0;
    pub const BREAD: u16 = 1;
    pub const STEW: u16 = 2;
    pub const COUNT: u16 = 3;
}

pub mod material {
    pub const PLANK: u16 = 0;
    pub const INGOT: u16 = 1;
    pub const CLOTH: u16 = 2;
    pub const BRICK: u16 = 3;
    pub const COUNT: u16 = 4;
}

pub mod tool {
    pub const AXE: u16 = 0;
    pub const PICKAXE: u16 = 1;
    pub const HOE: u16 = 2;
    pub const HAMMER: u16 = 3;
    pub const SAW: u16 = 4;
    pub const KNIFE: u16 = 5;
    pub const COUNT: u16 = 6;
}

/// Packed (category, subtype, material) identity of a good kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GoodId(pub u32);

impl GoodId {
    pub fn new(category: GoodCategory, subtype: u16, material: Material) -> Self {
        debug_assert!(u32::from(subtype) < MATERIAL_RADIX);
        GoodId(
            category.index() * CATEGORY_RADIX
                + material as u32 * MATERIAL_RADIX
                + u32::from(subtype),
        )
    }

    /// Shorthand for goods that carry no material.
    pub fn plain(category: GoodCategory, subtype: u16) -> Self {
        Self::new(category, subtype, Material::None)
    }

    pub fn tool(kind: u16, material: Material) -> Self {
        Self::new(GoodCategory::Tool, kind, material)
    }

    /// Decode back into the triple. `None` for ids no constructor could produce.
    pub fn decode(self) -> Option<(GoodCategory, u16, Material)> {
        let category = GoodCategory::from_index(self.0 / CATEGORY_RADIX)?;
        let material = Material::from_index((self.0 % CATEGORY_RADIX) / MATERIAL_RADIX)?;
        let subtype = (self.0 % MATERIAL_RADIX) as u16;
        Some((category, subtype, material))
    }

    pub fn category(self) -> Option<GoodCategory> {
        self.decode().map(|(category, _, _)| category)
    }

    pub fn subtype(self) -> u16 {
        (self.0 % MATERIAL_RADIX) as u16
    }

    pub fn material(self) -> Option<Material> {
        self.decode().map(|(_, _, material)| material)
    }

    pub fn is_tool(self) -> bool {
        self.category() == Some(GoodCategory::Tool)
    }

    /// Human readable name, e.g. "Copper Axe" or "Wheat".
    pub fn name(self) -> String {
        let Some((category, subtype, material)) = self.decode() else {
            return format!("Unknown({})", self.0);
        };
        let base = subtype_name(category, subtype);
        match material {
            Material::None => base.to_string(),
            material => format!("{:?} {}", material, base),
        }
    }
}

fn subtype_name(category: GoodCategory, subtype: u16) -> &'static str {
    match (category, subtype) {
        (GoodCategory::Raw, raw::STONE) => "Stone",
        (GoodCategory::Raw, raw::CLAY) => "Clay",
        (GoodCategory::Raw, raw::ORE) => "Ore",
        (GoodCategory::Plant, plant::WHEAT) => "Wheat",
        (GoodCategory::Plant, plant::FLAX) => "Flax",
        (GoodCategory::Plant, plant::BERRIES) => "Berries",
        (GoodCategory::Plant, plant::VEGETABLES) => "Vegetables",
        (GoodCategory::Wood, wood::LOG) => "Log",
        (GoodCategory::Wood, wood::BRANCH) => "Branch",
        (GoodCategory::Food, food::FLOUR) => "Flour",
        (GoodCategory::Food, food::BREAD) => "Bread",
        (GoodCategory::Food, food::STEW) => "Stew",
        (GoodCategory::Material, material::PLANK) => "Plank",
        (GoodCategory::Material, material::INGOT) => "Ingot",
        (GoodCategory::Material, material::CLOTH) => "Cloth",
        (GoodCategory::Material, material::BRICK) => "Brick",
        (GoodCategory::Tool, tool::AXE) => "Axe",
        (GoodCategory::Tool, tool::PICKAXE) => "Pickaxe",
        (GoodCategory::Tool, tool::HOE) => "Hoe",
        (GoodCategory::Tool, tool::HAMMER) => "Hammer",
        (GoodCategory::Tool, tool::SAW) => "Saw",
        (GoodCategory::Tool, tool::KNIFE) => "Knife",
        _ => "Unnamed",
    }
}

impl fmt::Display for GoodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A quantity of one good kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Good {
    pub id: GoodId,
    pub quantity: Decimal,
}

impl Good {
    pub fn new(id: GoodId, quantity: Decimal) -> Self {
        Self {
            id,
            quantity: quantity.max(Decimal::ZERO),
        }
    }

    pub fn none(id: GoodId) -> Self {
        Self::new(id, Decimal::ZERO)
    }

    pub fn same_kind(&self, other: &Good) -> bool {
        self.id == other.id
    }

    pub fn is_empty(&self) -> bool {
        self.quantity <= Decimal::ZERO
    }
}

impl fmt::Display for Good {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_id_decodes_every_combination() {
        for category in GoodCategory::ALL {
            for subtype in 0..category.subtype_count() {
                for material in Material::ALL {
                    let id = GoodId::new(category, subtype, material);
                    assert_eq!(id.decode(), Some((category, subtype, material)));
                }
            }
        }
    }

    #[test]
    fn test_id_layout() {
        let id = GoodId::tool(tool::AXE, Material::Copper);
        assert_eq!(id.0, 5 * CATEGORY_RADIX + 3 * MATERIAL_RADIX);
        assert!(id.is_tool());
        assert_eq!(id.name(), "Copper Axe");
        assert_eq!(GoodId::plain(GoodCategory::Plant, plant::WHEAT).name(), "Wheat");
    }

    #[test]
    fn test_invalid_id_does_not_decode() {
        assert_eq!(GoodId(99 * CATEGORY_RADIX).decode(), None);
        assert_eq!(GoodId(50 * MATERIAL_RADIX).decode(), None);
    }

    #[test]
    fn test_good_quantity_never_negative() {
        let wheat = GoodId::plain(GoodCategory::Plant, plant::WHEAT);
        assert_eq!(Good::new(wheat, dec!(-3)).quantity, dec!(0));
        assert!(Good::new(wheat, dec!(2)).same_kind(&Good::none(wheat)));
    }
}
