#[cfg(test)]
mod tests {
    use super::super::scenario::*;
    use crate::catalog::{Catalog, Skill};
    use crate::goods::{GoodCategory, GoodId, Material, food, plant, tool};
    use crate::map::{BuildingKind, TileKind};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn farm_at(x: usize, y: usize) -> BuildingConfig {
        BuildingConfig {
            kind: BuildingKind::Farm,
            variant: 0,
            x,
            y,
            max_users: 2,
            stock: Vec::new(),
        }
    }

    #[test]
    fn test_scenario_creation() {
        let mut scenario = Scenario::new("test_scenario".to_string());
        scenario.description = "A test scenario".to_string();

        let farm = scenario.add_building(farm_at(1, 1));
        let mut agent = AgentConfig::new("Ada", 1, 1, dec!(50.0));
        agent.home = Some(farm);
        scenario.add_agent(agent);

        assert_eq!(scenario.agents.len(), 1);
        assert_eq!(scenario.buildings.len(), 1);
        assert_eq!(scenario.name, "test_scenario");
    }

    #[test]
    fn test_scenario_validation() {
        let mut scenario = Scenario::new("invalid".to_string());

        assert!(scenario.validate().is_err());

        scenario.add_agent(AgentConfig::new("far_away", 100, 0, dec!(10.0)));
        assert!(scenario.validate().is_err());

        scenario.agents[0].x = 2;
        assert!(scenario.validate().is_ok());

        scenario.agents[0].home = Some(3);
        assert!(scenario.validate().is_err());
        scenario.agents[0].home = None;

        scenario.agents[0].goods.push(GoodConfig::new(GoodCategory::Food, 42, dec!(1)));
        assert!(scenario.validate().is_err());
        scenario.agents[0].goods.clear();

        scenario.parameters.starvation_limit = dec!(1);
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_scenario_serialization() {
        let scenario = create_standard_scenarios().get("bakery").unwrap().clone();

        let json = serde_json::to_string_pretty(&scenario).unwrap();
        let deserialized: Scenario = serde_json::from_str(&json).unwrap();

        assert_eq!(scenario.name, deserialized.name);
        assert_eq!(scenario.agents.len(), deserialized.agents.len());
        assert_eq!(scenario.agents[2].skills.get(&Skill::Baking), Some(&5));
    }

    #[test]
    fn test_minimal_yaml_scenario() {
        let yaml = r#"
name: tiny
description: one forager
map:
  width: 3
  height: 1
  columns: [Forest]
agents:
  - name: Zed
    x: 1
    y: 0
    money: 5
    profession:
      category: Plant
      subtype: 2
random_seed: 3
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert!(scenario.validate().is_ok());
        assert_eq!(scenario.map.soil_quality, dec!(1));
        assert_eq!(scenario.parameters.search_depth, 16);
        assert_eq!(
            scenario.agents[0].profession.as_ref().unwrap().good(),
            GoodId::plain(GoodCategory::Plant, plant::BERRIES)
        );
    }

    #[test]
    fn test_file_round_trip_by_extension() {
        let scenario = create_standard_scenarios().get("lumber").unwrap().clone();
        for name in ["colony_sim_scenario.json", "colony_sim_scenario.yaml"] {
            let path = std::env::temp_dir().join(name);
            let path = path.to_string_lossy();
            scenario.save_to_file(&path).unwrap();
            let loaded = Scenario::load_from_file(&path).unwrap();
            assert_eq!(loaded.name, scenario.name);
            assert_eq!(loaded.agents[0].goods, scenario.agents[0].goods);
            std::fs::remove_file(path.as_ref()).ok();
        }
    }

    #[test]
    fn test_scenario_display() {
        let scenarios = create_standard_scenarios();
        let scenario = scenarios.get("bakery").unwrap();
        let display = format!("{}", scenario);

        assert!(display.contains("Scenario: bakery_chain"));
        assert!(display.contains("Ada"));
        assert!(display.contains("makes Bread"));
    }

    #[test]
    fn test_build_world_places_everything() {
        let scenario = create_standard_scenarios().get("bakery").unwrap().clone();
        let world = scenario.build_world(Arc::new(Catalog::build()), 42).unwrap();

        assert_eq!(world.agents().len(), 4);
        assert_eq!(world.map.buildings().len(), 4);
        assert_eq!(world.map.tile(world.map.tile_at(7, 0).unwrap()).unwrap().kind, TileKind::Mountain);

        let ada = &world.agents()[0];
        assert_eq!(ada.state.name, "Ada");
        assert_eq!(ada.state.money, dec!(40));
        assert!(ada.state.stockpile.has(GoodId::tool(tool::HOE, Material::Wood), dec!(1)));
        let home = ada.state.home.unwrap();
        assert_eq!(world.map.building(home).unwrap().kind, BuildingKind::House);
        assert_eq!(
            world
                .map
                .building(home)
                .unwrap()
                .stockpile
                .quantity(GoodId::plain(GoodCategory::Food, food::BREAD)),
            dec!(6)
        );

        let cy = &world.agents()[2];
        assert_eq!(cy.state.skills.level(Skill::Baking), 5);
        assert_eq!(world.total_money(), dec!(220));
    }

    #[test]
    fn test_standard_scenarios_are_valid() {
        for (name, scenario) in create_standard_scenarios() {
            assert!(scenario.validate().is_ok(), "{} is invalid", name);
        }
    }
}
