//! Static production catalog.
//!
//! Built once by [`Catalog::build`]: every (category, subtype, material) combination
//! first receives its category defaults, then the hand-authored recipe graph overrides
//! specific goods. After construction the catalog is only ever read, and is shared
//! between the world and every task through an `Arc`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::goods::{
    GoodCategory, GoodId, Material, food, material, plant, raw, tool, wood,
};
use crate::map::{BuildingKind, TileMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Skill {
    Farming,
    Foraging,
    Forestry,
    Mining,
    Milling,
    Baking,
    Cooking,
    Carpentry,
    Smithing,
    Weaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillRequirement {
    pub skill: Skill,
    pub level: u32,
}

/// Any tool of `kind` whose material grade is at least `min_material`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub kind: u16,
    pub min_material: Material,
}

impl ToolRequirement {
    /// The cheapest tool that satisfies the requirement.
    pub fn minimum_good(&self) -> GoodId {
        GoodId::tool(self.kind, self.min_material)
    }

    pub fn accepts(&self, id: GoodId) -> bool {
        match id.decode() {
            Some((GoodCategory::Tool, kind, material)) => {
                kind == self.kind && material >= self.min_material
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngredientMode {
    /// Every listed ingredient is consumed.
    All,
    /// Exactly one listed ingredient, picked uniformly at random, is consumed.
    AnyOne,
}

/// Ingredients per batch. Holds between one and four alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRequirement {
    pub goods: Vec<(GoodId, Decimal)>,
    pub mode: IngredientMode,
}

impl IngredientRequirement {
    pub const MAX_INGREDIENTS: usize = 4;

    pub fn all(goods: Vec<(GoodId, Decimal)>) -> Self {
        debug_assert!(!goods.is_empty() && goods.len() <= Self::MAX_INGREDIENTS);
        Self {
            goods,
            mode: IngredientMode::All,
        }
    }

    pub fn any_one(goods: Vec<(GoodId, Decimal)>) -> Self {
        debug_assert!(!goods.is_empty() && goods.len() <= Self::MAX_INGREDIENTS);
        Self {
            goods,
            mode: IngredientMode::AnyOne,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionRequirement {
    pub skill: Option<SkillRequirement>,
    pub tool: Option<ToolRequirement>,
    pub tiles: Option<TileMask>,
    pub building: Option<BuildingKind>,
    pub ingredients: Option<IngredientRequirement>,
}

/// Per-good static facts used by production, eating and decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodInfo {
    pub name: String,
    /// Seconds to produce one batch at skill level 0.
    pub base_time: Decimal,
    pub batch_quantity: Decimal,
    /// Fraction lost per simulated day.
    pub decay_rate: Decimal,
    /// Hunger removed per unit eaten. Zero means inedible.
    pub satiation: Decimal,
    pub experience_yield: Decimal,
    pub base_price: Decimal,
    pub skill: Skill,
    /// Tool durability consumed per batch.
    pub tool_wear: Decimal,
}

impl GoodInfo {
    pub fn is_edible(&self) -> bool {
        self.satiation > Decimal::ZERO
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    requirements: BTreeMap<GoodId, ProductionRequirement>,
    info: BTreeMap<GoodId, GoodInfo>,
}

impl Catalog {
    /// Build the full catalog: category defaults for every good kind, then the
    /// bespoke recipe graph on top.
    pub fn build() -> Self {
        let mut requirements = BTreeMap::new();
        let mut info = BTreeMap::new();

        for category in GoodCategory::ALL {
            for subtype in 0..category.subtype_count() {
                for material in Material::ALL {
                    let id = GoodId::new(category, subtype, material);
                    requirements.insert(id, default_requirement(category, subtype, material));
                    info.insert(id, default_info(id, category, material));
                }
            }
        }

        apply_recipes(&mut requirements, &mut info);

        log::debug!("Production catalog built with {} goods", requirements.len());
        Self { requirements, info }
    }

    /// Assemble a catalog from explicit tables.
    pub fn from_parts(
        requirements: BTreeMap<GoodId, ProductionRequirement>,
        info: BTreeMap<GoodId, GoodInfo>,
    ) -> Self {
        Self { requirements, info }
    }

    pub fn requirements(&self, id: GoodId) -> Option<&ProductionRequirement> {
        self.requirements.get(&id)
    }

    pub fn info(&self, id: GoodId) -> Option<&GoodInfo> {
        self.info.get(&id)
    }

    pub fn decay_rate(&self, id: GoodId) -> Decimal {
        self.info(id).map(|i| i.decay_rate).unwrap_or(Decimal::ZERO)
    }

    pub fn satiation(&self, id: GoodId) -> Decimal {
        self.info(id).map(|i| i.satiation).unwrap_or(Decimal::ZERO)
    }

    pub fn base_price(&self, id: GoodId) -> Decimal {
        self.info(id).map(|i| i.base_price).unwrap_or(Decimal::ONE)
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn goods(&self) -> impl Iterator<Item = GoodId> + '_ {
        self.requirements.keys().copied()
    }
}

fn skill(skill: Skill, level: u32) -> Option<SkillRequirement> {
    Some(SkillRequirement { skill, level })
}

fn needs_tool(kind: u16, min_material: Material) -> Option<ToolRequirement> {
    Some(ToolRequirement { kind, min_material })
}

fn default_requirement(category: GoodCategory, subtype: u16, grade: Material) -> ProductionRequirement {
    match category {
        GoodCategory::Raw => ProductionRequirement {
            skill: skill(Skill::Mining, 0),
            tool: needs_tool(tool::PICKAXE, Material::Stone),
            tiles: Some(TileMask::HILLS | TileMask::MOUNTAIN),
            ..Default::default()
        },
        GoodCategory::Plant => ProductionRequirement {
            skill: skill(Skill::Farming, 0),
            tool: needs_tool(tool::HOE, Material::Wood),
            tiles: Some(TileMask::GRASSLAND | TileMask::FARMLAND),
            building: Some(BuildingKind::Farm),
            ..Default::default()
        },
        GoodCategory::Wood => ProductionRequirement {
            skill: skill(Skill::Forestry, 0),
            tool: needs_tool(tool::AXE, Material::Stone),
            tiles: Some(TileMask::FOREST),
            ..Default::default()
        },
        GoodCategory::Food => ProductionRequirement {
            skill: skill(Skill::Cooking, 0),
            building: Some(BuildingKind::Kitchen),
            ..Default::default()
        },
        GoodCategory::Material => ProductionRequirement {
            skill: skill(Skill::Carpentry, 0),
            building: Some(BuildingKind::Sawmill),
            ..Default::default()
        },
        GoodCategory::Tool => tool_requirement(subtype, grade),
    }
}

fn tool_requirement(kind: u16, grade: Material) -> ProductionRequirement {
    let branch = GoodId::plain(GoodCategory::Wood, wood::BRANCH);
    match grade {
        Material::None | Material::Wood => ProductionRequirement {
            skill: skill(Skill::Carpentry, 0),
            ingredients: Some(IngredientRequirement::all(vec![(branch, dec!(2))])),
            ..Default::default()
        },
        Material::Stone => ProductionRequirement {
            skill: skill(Skill::Carpentry, 0),
            ingredients: Some(IngredientRequirement::all(vec![
                (branch, dec!(1)),
                (GoodId::plain(GoodCategory::Raw, raw::STONE), dec!(1)),
            ])),
            ..Default::default()
        },
        metal => {
            let ingot = GoodId::new(GoodCategory::Material, material::INGOT, metal);
            // Hammers are forged with hammers; the first metal hammer needs a stone one.
            let hammer_grade = if kind == tool::HAMMER {
                Material::Stone
            } else {
                Material::Copper
            };
            ProductionRequirement {
                skill: skill(Skill::Smithing, metal_level(metal)),
                tool: needs_tool(tool::HAMMER, hammer_grade),
                building: Some(BuildingKind::Smithy),
                ingredients: Some(IngredientRequirement::all(vec![(ingot, dec!(2)), (branch, dec!(1))])),
                ..Default::default()
            }
        }
    }
}

fn metal_level(metal: Material) -> u32 {
    match metal {
        Material::Copper => 0,
        Material::Bronze => 10,
        Material::Iron => 25,
        Material::Steel => 50,
        _ => 0,
    }
}

fn default_info(id: GoodId, category: GoodCategory, grade: Material) -> GoodInfo {
    let (base_time, batch_quantity, decay_rate, base_price, skill) = match category {
        GoodCategory::Raw => (dec!(20), dec!(5), dec!(0), dec!(1), Skill::Mining),
        GoodCategory::Plant => (dec!(30), dec!(10), dec!(0.02), dec!(0.5), Skill::Farming),
        GoodCategory::Wood => (dec!(20), dec!(4), dec!(0), dec!(1), Skill::Forestry),
        GoodCategory::Food => (dec!(15), dec!(4), dec!(0.05), dec!(2), Skill::Cooking),
        GoodCategory::Material => (dec!(20), dec!(2), dec!(0), dec!(3), Skill::Carpentry),
        GoodCategory::Tool => {
            let grade_price = Decimal::from(grade as u32 + 1) * dec!(5);
            (dec!(40), dec!(1), dec!(0), grade_price, Skill::Smithing)
        }
    };
    GoodInfo {
        name: id.name(),
        base_time,
        batch_quantity,
        decay_rate,
        satiation: Decimal::ZERO,
        experience_yield: dec!(1),
        base_price,
        skill,
        tool_wear: if category == GoodCategory::Tool { dec!(0) } else { dec!(0.05) },
    }
}

/// The hand-authored part of the recipe graph.
fn apply_recipes(
    requirements: &mut BTreeMap<GoodId, ProductionRequirement>,
    info: &mut BTreeMap<GoodId, GoodInfo>,
) {
    let plain = GoodId::plain;
    let wheat = plain(GoodCategory::Plant, plant::WHEAT);
    let flax = plain(GoodCategory::Plant, plant::FLAX);
    let berries = plain(GoodCategory::Plant, plant::BERRIES);
    let vegetables = plain(GoodCategory::Plant, plant::VEGETABLES);
    let log = plain(GoodCategory::Wood, wood::LOG);
    let branch = plain(GoodCategory::Wood, wood::BRANCH);
    let stone = plain(GoodCategory::Raw, raw::STONE);
    let clay = plain(GoodCategory::Raw, raw::CLAY);
    let flour = plain(GoodCategory::Food, food::FLOUR);
    let bread = plain(GoodCategory::Food, food::BREAD);
    let stew = plain(GoodCategory::Food, food::STEW);
    let plank = plain(GoodCategory::Material, material::PLANK);
    let cloth = plain(GoodCategory::Material, material::CLOTH);
    let brick = plain(GoodCategory::Material, material::BRICK);

    // Gathering that needs no tool, so an empty-handed agent can bootstrap.
    requirements.insert(
        stone,
        ProductionRequirement {
            skill: skill(Skill::Mining, 0),
            tiles: Some(TileMask::HILLS | TileMask::MOUNTAIN),
            ..Default::default()
        },
    );
    requirements.insert(
        branch,
        ProductionRequirement {
            skill: skill(Skill::Foraging, 0),
            tiles: Some(TileMask::FOREST),
            ..Default::default()
        },
    );
    requirements.insert(
        berries,
        ProductionRequirement {
            skill: skill(Skill::Foraging, 0),
            tiles: Some(TileMask::FOREST | TileMask::GRASSLAND),
            ..Default::default()
        },
    );
    requirements.insert(
        clay,
        ProductionRequirement {
            skill: skill(Skill::Mining, 0),
            tool: needs_tool(tool::PICKAXE, Material::Wood),
            tiles: Some(TileMask::WATER | TileMask::GRASSLAND),
            ..Default::default()
        },
    );

    for metal in Material::METALS {
        let ore = GoodId::new(GoodCategory::Raw, raw::ORE, metal);
        requirements.insert(
            ore,
            ProductionRequirement {
                skill: skill(Skill::Mining, metal_level(metal)),
                tool: needs_tool(tool::PICKAXE, Material::Stone),
                tiles: Some(TileMask::MOUNTAIN),
                ..Default::default()
            },
        );
        let ingot = GoodId::new(GoodCategory::Material, material::INGOT, metal);
        requirements.insert(
            ingot,
            ProductionRequirement {
                skill: skill(Skill::Smithing, metal_level(metal)),
                building: Some(BuildingKind::Smithy),
                ingredients: Some(IngredientRequirement::all(vec![(ore, dec!(3)), (log, dec!(1))])),
                ..Default::default()
            },
        );
        if let Some(i) = info.get_mut(&ingot) {
            i.batch_quantity = dec!(1);
            i.base_price = Decimal::from(metal as u32) * dec!(2);
            i.skill = Skill::Smithing;
        }
    }

    requirements.insert(
        flour,
        ProductionRequirement {
            skill: skill(Skill::Milling, 0),
            building: Some(BuildingKind::Mill),
            ingredients: Some(IngredientRequirement::all(vec![(wheat, dec!(20))])),
            ..Default::default()
        },
    );
    requirements.insert(
        bread,
        ProductionRequirement {
            skill: skill(Skill::Baking, 5),
            building: Some(BuildingKind::Bakery),
            ingredients: Some(IngredientRequirement::all(vec![(flour, dec!(5))])),
            ..Default::default()
        },
    );
    requirements.insert(
        stew,
        ProductionRequirement {
            skill: skill(Skill::Cooking, 0),
            tool: needs_tool(tool::KNIFE, Material::Stone),
            building: Some(BuildingKind::Kitchen),
            ingredients: Some(IngredientRequirement::any_one(vec![
                (vegetables, dec!(3)),
                (berries, dec!(5)),
                (wheat, dec!(4)),
            ])),
            ..Default::default()
        },
    );
    requirements.insert(
        plank,
        ProductionRequirement {
            skill: skill(Skill::Carpentry, 0),
            tool: needs_tool(tool::SAW, Material::Stone),
            building: Some(BuildingKind::Sawmill),
            ingredients: Some(IngredientRequirement::all(vec![(log, dec!(2))])),
            ..Default::default()
        },
    );
    requirements.insert(
        cloth,
        ProductionRequirement {
            skill: skill(Skill::Weaving, 0),
            building: Some(BuildingKind::House),
            ingredients: Some(IngredientRequirement::all(vec![(flax, dec!(4))])),
            ..Default::default()
        },
    );
    requirements.insert(
        brick,
        ProductionRequirement {
            skill: skill(Skill::Smithing, 0),
            building: Some(BuildingKind::Smithy),
            ingredients: Some(IngredientRequirement::all(vec![(clay, dec!(3)), (branch, dec!(1))])),
            ..Default::default()
        },
    );

    let mut tune = |id: GoodId, f: &dyn Fn(&mut GoodInfo)| {
        if let Some(i) = info.get_mut(&id) {
            f(i);
        }
    };
    tune(stone, &|i| i.batch_quantity = dec!(4));
    tune(branch, &|i| {
        i.base_time = dec!(10);
        i.skill = Skill::Foraging;
        i.base_price = dec!(0.5);
    });
    tune(berries, &|i| {
        i.base_time = dec!(15);
        i.batch_quantity = dec!(6);
        i.satiation = dec!(5);
        i.decay_rate = dec!(0.1);
        i.skill = Skill::Foraging;
    });
    tune(vegetables, &|i| i.satiation = dec!(8));
    tune(flour, &|i| {
        i.base_time = dec!(10);
        i.batch_quantity = dec!(10);
        i.decay_rate = dec!(0.01);
        i.skill = Skill::Milling;
        i.base_price = dec!(1.5);
    });
    tune(bread, &|i| {
        i.base_time = dec!(20);
        i.batch_quantity = dec!(5);
        i.satiation = dec!(25);
        i.skill = Skill::Baking;
        i.base_price = dec!(3);
    });
    tune(stew, &|i| {
        i.batch_quantity = dec!(2);
        i.satiation = dec!(40);
        i.decay_rate = dec!(0.2);
    });
    tune(plank, &|i| i.batch_quantity = dec!(6));
    tune(cloth, &|i| {
        i.skill = Skill::Weaving;
        i.batch_quantity = dec!(1);
        i.base_price = dec!(6);
    });
    tune(brick, &|i| {
        i.skill = Skill::Smithing;
        i.batch_quantity = dec!(4);
    });
}
