use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::agent::Profession;
use crate::catalog::{Catalog, Skill};
use crate::config::SimConfig;
use crate::goods::{Good, GoodCategory, GoodId, Material, food, plant, tool, wood};
use crate::map::{BuildingKind, TileKind, WorldMap};
use crate::types::BuildingId;
use crate::world::World;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: SimConfig,
    pub map: MapConfig,
    #[serde(default)]
    pub buildings: Vec<BuildingConfig>,
    pub agents: Vec<AgentConfig>,
    pub random_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub width: usize,
    pub height: usize,
    /// Tile kind per column, repeated across the map.
    pub columns: Vec<TileKind>,
    #[serde(default = "default_soil")]
    pub soil_quality: Decimal,
}

fn default_soil() -> Decimal {
    Decimal::ONE
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 8,
            height: 6,
            columns: vec![
                TileKind::Grassland,
                TileKind::Farmland,
                TileKind::Farmland,
                TileKind::Grassland,
                TileKind::Forest,
                TileKind::Forest,
                TileKind::Hills,
                TileKind::Mountain,
            ],
            soil_quality: Decimal::ONE,
        }
    }
}

/// A good named by its parts, readable in scenario files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodConfig {
    pub category: GoodCategory,
    pub subtype: u16,
    #[serde(default)]
    pub material: Option<Material>,
    pub quantity: Decimal,
}

impl GoodConfig {
    pub fn new(category: GoodCategory, subtype: u16, quantity: Decimal) -> Self {
        Self {
            category,
            subtype,
            material: None,
            quantity,
        }
    }

    pub fn tool(kind: u16, material: Material) -> Self {
        Self {
            category: GoodCategory::Tool,
            subtype: kind,
            material: Some(material),
            quantity: Decimal::ONE,
        }
    }

    pub fn id(&self) -> GoodId {
        GoodId::new(self.category, self.subtype, self.material.unwrap_or(Material::None))
    }

    pub fn good(&self) -> Good {
        Good::new(self.id(), self.quantity)
    }

    fn is_valid(&self) -> bool {
        self.subtype < self.category.subtype_count() && self.quantity >= Decimal::ZERO
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingConfig {
    pub kind: BuildingKind,
    #[serde(default)]
    pub variant: u8,
    pub x: usize,
    pub y: usize,
    pub max_users: u32,
    #[serde(default)]
    pub stock: Vec<GoodConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionConfig {
    pub category: GoodCategory,
    pub subtype: u16,
    #[serde(default)]
    pub material: Option<Material>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
}

impl ProfessionConfig {
    pub fn new(category: GoodCategory, subtype: u16) -> Self {
        Self {
            category,
            subtype,
            material: None,
            quantity: None,
        }
    }

    pub fn good(&self) -> GoodId {
        GoodId::new(self.category, self.subtype, self.material.unwrap_or(Material::None))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub x: usize,
    pub y: usize,
    pub money: Decimal,
    #[serde(default)]
    pub goods: Vec<GoodConfig>,
    #[serde(default)]
    pub skills: BTreeMap<Skill, u32>,
    #[serde(default)]
    pub profession: Option<ProfessionConfig>,
    /// Index into the scenario's buildings.
    #[serde(default)]
    pub home: Option<usize>,
}

impl AgentConfig {
    pub fn new(name: &str, x: usize, y: usize, money: Decimal) -> Self {
        Self {
            name: name.to_string(),
            x,
            y,
            money,
            goods: Vec::new(),
            skills: BTreeMap::new(),
            profession: None,
            home: None,
        }
    }
}

impl Scenario {
    pub fn new(name: String) -> Self {
        Self {
            name,
            description: String::new(),
            parameters: SimConfig::default(),
            map: MapConfig::default(),
            buildings: Vec::new(),
            agents: Vec::new(),
            random_seed: None,
        }
    }

    pub fn add_agent(&mut self, config: AgentConfig) {
        self.agents.push(config);
    }

    /// Returns the index agents use to name this building as their home.
    pub fn add_building(&mut self, config: BuildingConfig) -> usize {
        self.buildings.push(config);
        self.buildings.len() - 1
    }

    pub fn save_to_file(&self, path: &str) -> std::io::Result<()> {
        let text = if is_yaml(path) {
            serde_yaml::to_string(self).map_err(std::io::Error::other)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Load a scenario; `.yaml`/`.yml` files are read as YAML, anything else as JSON.
    pub fn load_from_file(path: &str) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let scenario: Self = if is_yaml(path) {
            serde_yaml::from_str(&text).map_err(std::io::Error::other)?
        } else {
            serde_json::from_str(&text)?
        };
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.parameters.validate()?;

        if self.map.width == 0 || self.map.height == 0 {
            return Err("Map must have at least one tile".to_string());
        }
        if self.map.columns.is_empty() {
            return Err("Map needs at least one column kind".to_string());
        }
        if self.map.soil_quality <= Decimal::ZERO {
            return Err("Soil quality must be positive".to_string());
        }
        if self.agents.is_empty() {
            return Err("Scenario must have at least one agent".to_string());
        }

        let on_map = |x: usize, y: usize| x < self.map.width && y < self.map.height;

        for (index, building) in self.buildings.iter().enumerate() {
            if !on_map(building.x, building.y) {
                return Err(format!(
                    "Building {} ({:?}) at ({}, {}) is off the map",
                    index, building.kind, building.x, building.y
                ));
            }
            if building.max_users == 0 {
                return Err(format!("Building {} ({:?}) has no room for users", index, building.kind));
            }
            if building.stock.iter().any(|g| !g.is_valid()) {
                return Err(format!("Building {} has an invalid good in stock", index));
            }
        }

        for agent in &self.agents {
            if !on_map(agent.x, agent.y) {
                return Err(format!("Agent {} at ({}, {}) is off the map", agent.name, agent.x, agent.y));
            }
            if agent.money < Decimal::ZERO {
                return Err(format!("Agent {} starts with negative money", agent.name));
            }
            if agent.goods.iter().any(|g| !g.is_valid()) {
                return Err(format!("Agent {} has an invalid starting good", agent.name));
            }
            if let Some(profession) = &agent.profession {
                if profession.subtype >= profession.category.subtype_count() {
                    return Err(format!("Agent {} has an unknown profession good", agent.name));
                }
                if profession.quantity.is_some_and(|q| q <= Decimal::ZERO) {
                    return Err(format!("Agent {} must produce a positive quantity", agent.name));
                }
            }
            if let Some(home) = agent.home {
                if home >= self.buildings.len() {
                    return Err(format!("Agent {} has home {} which does not exist", agent.name, home));
                }
            }
        }

        Ok(())
    }

    /// Lay out the map, place buildings and spawn agents.
    pub fn build_world(&self, catalog: Arc<Catalog>, seed: u64) -> Result<World, String> {
        self.validate()?;

        let columns = &self.map.columns;
        let mut map = WorldMap::grid(self.map.width, self.map.height, |x, _| columns[x % columns.len()]);
        for tile in map.tiles_mut() {
            tile.soil_quality = self.map.soil_quality;
        }

        let mut building_ids: Vec<BuildingId> = Vec::with_capacity(self.buildings.len());
        for config in &self.buildings {
            let tile = map
                .tile_at(config.x, config.y)
                .ok_or_else(|| format!("No tile at ({}, {})", config.x, config.y))?;
            let id = map
                .add_building(tile, config.kind, config.variant, config.max_users)
                .ok_or_else(|| format!("Could not place {:?}", config.kind))?;
            if let Some(building) = map.building_mut(id) {
                for good in &config.stock {
                    building.stockpile.add(good.good());
                }
            }
            building_ids.push(id);
        }

        let mut world = World::new(self.parameters.clone(), catalog, map, seed);
        for config in &self.agents {
            let tile = world
                .map
                .tile_at(config.x, config.y)
                .ok_or_else(|| format!("No tile at ({}, {})", config.x, config.y))?;
            let id = world
                .spawn(config.name.clone(), tile)
                .ok_or_else(|| format!("Could not spawn {}", config.name))?;
            let Some(agent) = world.agent_mut(id) else {
                continue;
            };
            agent.state.money = config.money;
            for good in &config.goods {
                agent.state.stockpile.add(good.good());
            }
            for (skill, level) in &config.skills {
                agent.state.skills.set_level(*skill, *level);
            }
            agent.state.home = config.home.and_then(|index| building_ids.get(index).copied());
            agent.profession = config.profession.as_ref().map(|p| Profession {
                good: p.good(),
                quantity: p.quantity,
            });
        }

        log::info!(
            "Scenario '{}' ready: {}x{} map, {} buildings, {} agents",
            self.name,
            self.map.width,
            self.map.height,
            self.buildings.len(),
            self.agents.len()
        );
        Ok(world)
    }
}

fn is_yaml(path: &str) -> bool {
    matches!(
        Path::new(path).extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario: {}", self.name)?;
        writeln!(f, "Description: {}", self.description)?;
        writeln!(f, "\nParameters:")?;
        writeln!(f, "  Day length: {}s", self.parameters.day_length)?;
        writeln!(
            f,
            "  Hunger: +{}/s, eat at {}, starve at {}",
            self.parameters.hunger_rate, self.parameters.hunger_threshold, self.parameters.starvation_limit
        )?;
        writeln!(
            f,
            "  Search depth: {}, recipe depth: {}",
            self.parameters.search_depth, self.parameters.max_recipe_depth
        )?;
        writeln!(
            f,
            "  Pricing: pay up to {}x base, sell at {}x base",
            self.parameters.price_ceiling_multiplier, self.parameters.sell_markup
        )?;

        writeln!(f, "\nMap: {}x{} {:?}", self.map.width, self.map.height, self.map.columns)?;

        if !self.buildings.is_empty() {
            writeln!(f, "\nBuildings:")?;
            for (index, building) in self.buildings.iter().enumerate() {
                writeln!(
                    f,
                    "  [{}] {:?} at ({}, {}), {} users",
                    index, building.kind, building.x, building.y, building.max_users
                )?;
            }
        }

        writeln!(f, "\nAgents:")?;
        for agent in &self.agents {
            let profession = agent
                .profession
                .as_ref()
                .map(|p| p.good().name())
                .unwrap_or_else(|| "none".to_string());
            writeln!(
                f,
                "  {} at ({}, {}): {} money, {} starting goods, makes {}",
                agent.name,
                agent.x,
                agent.y,
                agent.money,
                agent.goods.len(),
                profession
            )?;
        }

        Ok(())
    }
}

pub fn create_standard_scenarios() -> HashMap<String, Scenario> {
    let mut scenarios = HashMap::new();

    // Wheat -> flour -> bread, with a forager keeping everyone fed early on.
    let mut bakery = Scenario::new("bakery_chain".to_string());
    bakery.description = "Farmer, miller and baker trading along the bread chain".to_string();
    bakery.random_seed = Some(42);
    bakery.add_building(BuildingConfig {
        kind: BuildingKind::Farm,
        variant: 0,
        x: 1,
        y: 1,
        max_users: 2,
        stock: Vec::new(),
    });
    bakery.add_building(BuildingConfig {
        kind: BuildingKind::Mill,
        variant: 0,
        x: 3,
        y: 2,
        max_users: 1,
        stock: Vec::new(),
    });
    bakery.add_building(BuildingConfig {
        kind: BuildingKind::Bakery,
        variant: 0,
        x: 3,
        y: 3,
        max_users: 1,
        stock: Vec::new(),
    });
    let house = bakery.add_building(BuildingConfig {
        kind: BuildingKind::House,
        variant: 0,
        x: 2,
        y: 2,
        max_users: 4,
        stock: vec![GoodConfig::new(GoodCategory::Food, food::BREAD, dec!(6))],
    });

    let mut farmer = AgentConfig::new("Ada", 1, 1, dec!(40));
    farmer.goods.push(GoodConfig::tool(tool::HOE, Material::Wood));
    farmer.profession = Some(ProfessionConfig::new(GoodCategory::Plant, plant::WHEAT));
    farmer.home = Some(house);
    bakery.add_agent(farmer);

    let mut miller = AgentConfig::new("Bo", 3, 2, dec!(80));
    miller.profession = Some(ProfessionConfig::new(GoodCategory::Food, food::FLOUR));
    miller.home = Some(house);
    bakery.add_agent(miller);

    let mut baker = AgentConfig::new("Cy", 3, 3, dec!(80));
    baker.skills.insert(Skill::Baking, 5);
    baker.profession = Some(ProfessionConfig::new(GoodCategory::Food, food::BREAD));
    baker.home = Some(house);
    bakery.add_agent(baker);

    let mut forager = AgentConfig::new("Di", 4, 3, dec!(20));
    forager.profession = Some(ProfessionConfig::new(GoodCategory::Plant, plant::BERRIES));
    bakery.add_agent(forager);
    scenarios.insert("bakery".to_string(), bakery);

    // Logs -> planks at the sawmill.
    let mut lumber = Scenario::new("lumber_yard".to_string());
    lumber.description = "Woodcutter supplying a carpenter".to_string();
    lumber.random_seed = Some(7);
    lumber.add_building(BuildingConfig {
        kind: BuildingKind::Sawmill,
        variant: 0,
        x: 3,
        y: 2,
        max_users: 1,
        stock: Vec::new(),
    });

    let mut woodcutter = AgentConfig::new("Eli", 4, 2, dec!(30));
    woodcutter.goods.push(GoodConfig::tool(tool::AXE, Material::Stone));
    woodcutter.goods.push(GoodConfig::new(GoodCategory::Plant, plant::BERRIES, dec!(20)));
    woodcutter.profession = Some(ProfessionConfig::new(GoodCategory::Wood, wood::LOG));
    lumber.add_agent(woodcutter);

    let mut carpenter = AgentConfig::new("Fay", 3, 2, dec!(100));
    carpenter.goods.push(GoodConfig::tool(tool::SAW, Material::Stone));
    carpenter.goods.push(GoodConfig::new(GoodCategory::Plant, plant::BERRIES, dec!(20)));
    carpenter.profession = Some(ProfessionConfig::new(
        GoodCategory::Material,
        crate::goods::material::PLANK,
    ));
    lumber.add_agent(carpenter);
    scenarios.insert("lumber".to_string(), lumber);

    // Empty-handed woodcutter who has to make a stone axe first.
    let mut frontier = Scenario::new("frontier".to_string());
    frontier.description = "A lone settler bootstrapping tools from branches and stone".to_string();
    frontier.random_seed = Some(1);
    frontier.parameters.search_depth = 24;
    let mut settler = AgentConfig::new("Gus", 5, 2, dec!(0));
    settler.goods.push(GoodConfig::new(GoodCategory::Plant, plant::BERRIES, dec!(30)));
    settler.profession = Some(ProfessionConfig::new(GoodCategory::Wood, wood::LOG));
    frontier.add_agent(settler);
    scenarios.insert("frontier".to_string(), frontier);

    scenarios
}
