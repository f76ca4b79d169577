#[cfg(test)]
mod tests {
    use super::super::task::*;
    use crate::agent::{Agent, AgentState};
    use crate::catalog::{Catalog, Skill};
    use crate::config::SimConfig;
    use crate::events::{ConsumptionPurpose, EventType};
    use crate::goods::{Good, GoodCategory, GoodId, Material, food, plant, tool};
    use crate::map::{BuildingKind, TileKind, WorldMap};
    use crate::market::{Account, Market, MarketError, OrderRequest, Side};
    use crate::stockpile::Stockpile;
    use crate::task_kinds::{BuyFromMarket, Eat, MoveTo, Produce, SellAtMarket, SourceGoods, Wait};
    use crate::types::{AgentId, BuildingId, Position};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    const WORKER: AgentId = AgentId(1);
    const MERCHANT: AgentId = AgentId(2);

    fn wheat() -> GoodId {
        GoodId::plain(GoodCategory::Plant, plant::WHEAT)
    }

    fn flour() -> GoodId {
        GoodId::plain(GoodCategory::Food, food::FLOUR)
    }

    /// One agent plus just enough world to run tasks against.
    struct Harness {
        agent: AgentState,
        others: HashMap<AgentId, Account>,
        map: WorldMap,
        market: Market,
        catalog: Catalog,
        config: SimConfig,
        rng: StdRng,
    }

    impl Harness {
        fn new(map: WorldMap, x: usize, y: usize) -> Self {
            let tile = map.tile_at(x, y).unwrap();
            let position = map.tile(tile).unwrap().position;
            Self {
                agent: Agent::new(WORKER, "worker", tile, position, 1.0).state,
                others: HashMap::new(),
                map,
                market: Market::new(),
                catalog: Catalog::build(),
                config: SimConfig::default(),
                rng: StdRng::seed_from_u64(7),
            }
        }

        /// Agent standing on a grassland grid with a single-user mill at (1, 1).
        fn at_mill() -> (Self, BuildingId) {
            let mut map = WorldMap::grid(4, 4, |_, _| TileKind::Grassland);
            let mill = map
                .add_building(map.tile_at(1, 1).unwrap(), BuildingKind::Mill, 0, 1)
                .unwrap();
            (Self::new(map, 1, 1), mill)
        }

        fn tick(&mut self, task: &mut Task, dt: Decimal) -> (TaskStatus, Vec<Task>, Vec<EventType>) {
            let mut ctx = TaskContext {
                agent: &mut self.agent,
                others: &mut self.others,
                map: &mut self.map,
                market: &mut self.market,
                catalog: &self.catalog,
                config: &self.config,
                rng: &mut self.rng,
                dt,
                followups: Vec::new(),
                events: Vec::new(),
            };
            let status = task.execute(&mut ctx);
            (status, ctx.followups, ctx.events)
        }

        fn users(&self, building: BuildingId) -> u32 {
            self.map.building(building).unwrap().current_users
        }
    }

    #[test]
    fn test_flour_batch_finishes_on_tick_equal_to_production_time() {
        let (mut h, mill) = Harness::at_mill();
        h.agent.stockpile.add(Good::new(wheat(), dec!(100)));
        let mut task = Task::new(TaskKind::Produce(Produce::new(flour(), dec!(10))));

        let mut events = Vec::new();
        for tick in 1..=9 {
            let (status, _, tick_events) = h.tick(&mut task, dec!(1));
            events.extend(tick_events);
            assert!(!status.complete, "finished early on tick {}", tick);
            assert_eq!(h.agent.stockpile.quantity(flour()), dec!(0));
            assert_eq!(h.users(mill), 1);
        }

        let (status, _, tick_events) = h.tick(&mut task, dec!(1));
        events.extend(tick_events);
        assert!(status.succeeded());
        assert_eq!(status.value, Some(Good::new(flour(), dec!(10))));
        assert_eq!(task.executions, 10);
        assert_eq!(h.agent.stockpile.quantity(flour()), dec!(10));
        assert_eq!(h.agent.stockpile.quantity(wheat()), dec!(80));
        assert_eq!(h.users(mill), 0);
        assert_eq!(h.agent.skills.level(Skill::Milling), 1);

        assert!(events.contains(&EventType::GoodsConsumed {
            good: wheat(),
            quantity: dec!(20),
            purpose: ConsumptionPurpose::Ingredient,
        }));
        assert!(events.contains(&EventType::GoodProduced {
            good: flour(),
            quantity: dec!(10),
            building: Some(mill),
        }));
    }

    #[test]
    fn test_finished_task_is_not_executed_again() {
        let (mut h, _) = Harness::at_mill();
        h.agent.stockpile.add(Good::new(wheat(), dec!(40)));
        let mut task = Task::new(TaskKind::Produce(Produce::new(flour(), dec!(10))));
        for _ in 0..10 {
            h.tick(&mut task, dec!(1));
        }
        assert!(task.is_complete());
        let executions = task.executions;

        let (status, _, events) = h.tick(&mut task, dec!(1));
        assert!(status.succeeded());
        assert_eq!(task.executions, executions);
        assert!(events.is_empty());
        assert_eq!(h.agent.stockpile.quantity(flour()), dec!(10));
        assert_eq!(h.agent.stockpile.quantity(wheat()), dec!(20));
    }

    #[test]
    fn test_executions_count_every_tick_including_child_ticks() {
        let (mut h, _) = Harness::at_mill();
        h.agent.stockpile.add(Good::new(wheat(), dec!(20)));
        let mut task = Task::new(TaskKind::Produce(Produce::new(flour(), dec!(10))));
        let mut last = 0;
        for _ in 0..5 {
            h.tick(&mut task, dec!(1));
            assert_eq!(task.executions, last + 1);
            last = task.executions;
        }
        assert!(task.initialized);
        assert!(task.children.is_empty());
    }

    #[test]
    fn test_abandon_releases_building() {
        let (mut h, mill) = Harness::at_mill();
        h.agent.stockpile.add(Good::new(wheat(), dec!(20)));
        let mut task = Task::new(TaskKind::Produce(Produce::new(flour(), dec!(10))));
        for _ in 0..3 {
            h.tick(&mut task, dec!(1));
        }
        assert_eq!(h.users(mill), 1);

        task.abandon(&mut h.map);
        assert_eq!(h.users(mill), 0);
    }

    #[test]
    fn test_full_building_fails_production() {
        let mut map = WorldMap::grid(4, 4, |_, _| TileKind::Grassland);
        let mill = map
            .add_building(map.tile_at(1, 1).unwrap(), BuildingKind::Mill, 0, 1)
            .unwrap();
        let mut h = Harness::new(map, 0, 1);
        h.agent.stockpile.add(Good::new(wheat(), dec!(20)));
        let mut task = Task::new(TaskKind::Produce(Produce::new(flour(), dec!(10))));

        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert!(!status.complete);
        assert!(matches!(task.children.front().map(|c| &c.kind), Some(TaskKind::MoveTo(_))));
        // Someone else takes the only slot while the worker is walking over.
        assert!(h.map.occupy(mill));

        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert!(status.failed);
        assert_eq!(status.error, Some(TaskError::BuildingFull(mill)));
        assert_eq!(h.users(mill), 1);
    }

    #[test]
    fn test_missing_ingredient_chain_fails_every_level() {
        // No wheat, nothing on offer, and no farm to grow it on.
        let (mut h, mill) = Harness::at_mill();
        let mut task = Task::new(TaskKind::Produce(Produce::new(flour(), dec!(10))));

        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert!(!status.complete);
        let (status, _, events) = h.tick(&mut task, dec!(1));

        assert!(status.failed);
        assert_eq!(status.error, Some(TaskError::NoBuilding(BuildingKind::Farm)));
        let failures = events
            .iter()
            .filter(|e| matches!(e, EventType::TaskFailed { .. }))
            .count();
        assert_eq!(failures, 3);
        assert_eq!(h.users(mill), 0);
    }

    #[test]
    fn test_parent_runs_in_same_tick_as_last_child() {
        let (mut h, _) = Harness::at_mill();
        let mut task = Task::new(TaskKind::Wait(Wait::new(dec!(0))));
        task.children.push_back(
            Task::new(TaskKind::Wait(Wait::new(dec!(1)))).then(Task::new(TaskKind::Eat(Eat::default()))),
        );

        let (status, followups, _) = h.tick(&mut task, dec!(1));
        assert!(status.succeeded());
        assert!(task.children.is_empty());
        assert_eq!(followups.len(), 1);
        assert!(matches!(followups[0].kind, TaskKind::Eat(_)));
    }

    #[test]
    fn test_child_failure_fails_parent_and_queues_fallback() {
        let (mut h, _) = Harness::at_mill();
        let mut task = Task::new(TaskKind::Wait(Wait::new(dec!(0))));
        let doomed = Task::new(TaskKind::SellAtMarket(SellAtMarket::new(
            Good::new(flour(), dec!(3)),
            dec!(2),
        )))
        .then(Task::new(TaskKind::Eat(Eat::default())))
        .or_else(Task::new(TaskKind::Wait(Wait::new(dec!(5)))));
        task.children.push_back(doomed);

        let (status, followups, _) = h.tick(&mut task, dec!(1));
        assert!(status.failed);
        assert_eq!(
            status.error,
            Some(TaskError::Market(MarketError::NothingToSell(flour())))
        );
        assert_eq!(followups.len(), 1);
        assert!(matches!(followups[0].kind, TaskKind::Wait(_)));
    }

    #[test]
    fn test_skill_and_depth_limits() {
        let mut map = WorldMap::grid(3, 3, |_, _| TileKind::Grassland);
        map.add_building(map.tile_at(1, 1).unwrap(), BuildingKind::Bakery, 0, 2);
        let mut h = Harness::new(map, 1, 1);

        let bread = GoodId::plain(GoodCategory::Food, food::BREAD);
        let mut task = Task::new(TaskKind::Produce(Produce::new(bread, dec!(5))));
        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert_eq!(
            status.error,
            Some(TaskError::SkillTooLow {
                skill: Skill::Baking,
                required: 5,
                actual: 0,
            })
        );

        let mut task = Task::new(TaskKind::Produce(Produce::new(flour(), dec!(10)).at_depth(5)));
        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert_eq!(status.error, Some(TaskError::RecursionLimit(flour())));

        let limit = h.config.max_recipe_depth;
        let mut task = Task::new(TaskKind::SourceGoods(SourceGoods::goods(
            Good::new(wheat(), dec!(5)),
            dec!(1),
            limit,
        )));
        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert_eq!(status.error, Some(TaskError::RecursionLimit(wheat())));
    }

    #[test]
    fn test_source_goods_buys_from_market() {
        let (mut h, _) = Harness::at_mill();
        h.agent.money = dec!(20);
        h.others.insert(
            MERCHANT,
            Account {
                money: dec!(0),
                stockpile: Stockpile::with([Good::new(wheat(), dec!(30))]),
            },
        );
        h.market
            .place_sell_order(
                OrderRequest::sell(MERCHANT, Good::new(wheat(), dec!(30)), dec!(0.5)),
                &mut h.others,
            )
            .unwrap();

        let mut task = Task::new(TaskKind::SourceGoods(SourceGoods::goods(
            Good::new(wheat(), dec!(20)),
            dec!(1.5),
            0,
        )));
        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert!(!status.complete);
        assert!(matches!(task.children.front().map(|c| &c.kind), Some(TaskKind::BuyFromMarket(_))));

        let (status, _, events) = h.tick(&mut task, dec!(1));
        assert!(status.succeeded());
        assert_eq!(status.value, Some(Good::new(wheat(), dec!(20))));
        assert_eq!(h.agent.money, dec!(10));
        assert_eq!(h.agent.stockpile.quantity(wheat()), dec!(20));
        assert_eq!(h.others[&MERCHANT].money, dec!(10));
        assert_eq!(h.market.goods_on_offer(wheat()), dec!(10));
        assert!(events.contains(&EventType::TradeExecuted {
            good: wheat(),
            quantity: dec!(20),
            price: dec!(0.5),
            counterparty: MERCHANT,
            side: Side::Buy,
        }));
    }

    #[test]
    fn test_source_goods_skips_overpriced_asks() {
        let (mut h, _) = Harness::at_mill();
        h.agent.money = dec!(100);
        h.others.insert(
            MERCHANT,
            Account {
                money: dec!(0),
                stockpile: Stockpile::with([Good::new(wheat(), dec!(30))]),
            },
        );
        h.market
            .place_sell_order(
                OrderRequest::sell(MERCHANT, Good::new(wheat(), dec!(30)), dec!(4)),
                &mut h.others,
            )
            .unwrap();

        let mut task = Task::new(TaskKind::SourceGoods(SourceGoods::goods(
            Good::new(wheat(), dec!(20)),
            dec!(1.5),
            0,
        )));
        h.tick(&mut task, dec!(1));
        assert!(matches!(task.children.front().map(|c| &c.kind), Some(TaskKind::Produce(_))));
        assert_eq!(h.agent.money, dec!(100));
    }

    #[test]
    fn test_source_goods_withdraws_from_home_first() {
        let mut map = WorldMap::grid(3, 3, |_, _| TileKind::Grassland);
        let house = map
            .add_building(map.tile_at(2, 2).unwrap(), BuildingKind::House, 0, 4)
            .unwrap();
        map.building_mut(house)
            .unwrap()
            .stockpile
            .add(Good::new(wheat(), dec!(20)));
        let mut h = Harness::new(map, 0, 0);
        h.agent.home = Some(house);

        let mut task = Task::new(TaskKind::SourceGoods(SourceGoods::goods(
            Good::new(wheat(), dec!(20)),
            dec!(1.5),
            0,
        )));
        let (status, followups, _) = h.tick(&mut task, dec!(1));
        assert!(status.succeeded());
        assert_eq!(status.value, Some(Good::new(wheat(), dec!(20))));
        assert!(task.children.is_empty());
        assert!(followups.is_empty());
        assert_eq!(h.agent.stockpile.quantity(wheat()), dec!(20));
        assert_eq!(h.map.building(house).unwrap().stockpile.quantity(wheat()), dec!(0));
        assert_eq!(h.market.books().count(), 0);
    }

    #[test]
    fn test_stew_picks_one_ingredient_alternative() {
        let stew = GoodId::plain(GoodCategory::Food, food::STEW);
        let alternatives = [
            Good::new(GoodId::plain(GoodCategory::Plant, plant::VEGETABLES), dec!(3)),
            Good::new(GoodId::plain(GoodCategory::Plant, plant::BERRIES), dec!(5)),
            Good::new(wheat(), dec!(4)),
        ];

        for seed in 0..8 {
            let mut map = WorldMap::grid(3, 3, |_, _| TileKind::Grassland);
            map.add_building(map.tile_at(1, 1).unwrap(), BuildingKind::Kitchen, 0, 2);
            let mut h = Harness::new(map, 1, 1);
            h.rng = StdRng::seed_from_u64(seed);
            h.agent
                .stockpile
                .add(Good::new(GoodId::tool(tool::KNIFE, Material::Stone), dec!(1)));

            let mut task = Task::new(TaskKind::Produce(Produce::new(stew, dec!(2))));
            let (status, _, _) = h.tick(&mut task, dec!(1));
            assert!(!status.complete);

            let TaskKind::Produce(produce) = &task.kind else {
                panic!("kind changed");
            };
            assert_eq!(produce.ingredients.len(), 1);
            assert!(alternatives.contains(&produce.ingredients[0]), "seed {}", seed);

            let sourced: Vec<&Good> = task
                .children
                .iter()
                .filter_map(|child| match &child.kind {
                    TaskKind::SourceGoods(source) if source.tool_min_material.is_none() => {
                        Some(&source.good)
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(sourced, vec![&produce.ingredients[0]]);
        }
    }

    #[test]
    fn test_fill_or_kill_refunds_unfilled_part() {
        let (mut h, _) = Harness::at_mill();
        h.agent.money = dec!(50);
        h.others.insert(
            MERCHANT,
            Account {
                money: dec!(0),
                stockpile: Stockpile::with([Good::new(wheat(), dec!(5))]),
            },
        );
        h.market
            .place_sell_order(
                OrderRequest::sell(MERCHANT, Good::new(wheat(), dec!(5)), dec!(1)),
                &mut h.others,
            )
            .unwrap();

        let mut task = Task::new(TaskKind::BuyFromMarket(BuyFromMarket::new(
            Good::new(wheat(), dec!(10)),
            dec!(2),
            true,
        )));
        let (status, _, events) = h.tick(&mut task, dec!(1));
        assert!(status.succeeded());
        assert_eq!(status.value, Some(Good::new(wheat(), dec!(5))));
        assert_eq!(h.agent.money, dec!(45));
        assert!(h.market.bids(wheat()).is_empty());
        assert_eq!(h.market.escrow_total(), dec!(0));
        assert!(events.iter().any(|e| matches!(e, EventType::OrderCancelled { .. })));
    }

    #[test]
    fn test_move_to_walks_then_snaps() {
        let map = WorldMap::grid(5, 1, |_, _| TileKind::Grassland);
        let mut h = Harness::new(map, 0, 0);
        let mut task = Task::new(TaskKind::MoveTo(MoveTo::new(Position::new(3.0, 0.0), 0.05)));

        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert!(!status.complete);
        assert_eq!(h.agent.position, Position::new(1.0, 0.0));
        assert_eq!(h.agent.tile, h.map.tile_at(1, 0).unwrap());

        h.tick(&mut task, dec!(1));
        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert!(status.succeeded());
        assert_eq!(h.agent.position, Position::new(3.0, 0.0));
        assert_eq!(h.agent.tile, h.map.tile_at(3, 0).unwrap());
    }

    #[test]
    fn test_plants_grow_slower_on_poor_soil() {
        let map = WorldMap::grid(2, 1, |_, _| TileKind::Forest);
        let mut h = Harness::new(map, 0, 0);
        let tile = h.agent.tile;
        h.map.tile_mut(tile).unwrap().soil_quality = dec!(0.5);

        let berries = GoodId::plain(GoodCategory::Plant, plant::BERRIES);
        let mut task = Task::new(TaskKind::Produce(Produce::new(berries, dec!(6))));
        for _ in 0..29 {
            let (status, _, _) = h.tick(&mut task, dec!(1));
            assert!(!status.complete);
        }
        let TaskKind::Produce(produce) = &task.kind else {
            panic!("kind changed");
        };
        assert_eq!(produce.total_time, dec!(30));

        let (status, _, _) = h.tick(&mut task, dec!(1));
        assert!(status.succeeded());
        assert_eq!(h.agent.stockpile.quantity(berries), dec!(6));
    }

    #[test]
    fn test_eat_prefers_most_satiating_food() {
        let (mut h, _) = Harness::at_mill();
        let berries = GoodId::plain(GoodCategory::Plant, plant::BERRIES);
        let bread = GoodId::plain(GoodCategory::Food, food::BREAD);
        h.agent.hunger = dec!(30);
        h.agent.stockpile.add(Good::new(berries, dec!(10)));
        h.agent.stockpile.add(Good::new(bread, dec!(1)));

        let mut task = Task::new(TaskKind::Eat(Eat::default()));
        let (status, _, events) = h.tick(&mut task, dec!(1));
        assert!(status.succeeded());
        assert_eq!(h.agent.hunger, dec!(0));
        assert_eq!(h.agent.stockpile.quantity(bread), dec!(0));
        assert_eq!(h.agent.stockpile.quantity(berries), dec!(9));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_queue_runs_priority_tasks_first() {
        let (mut h, _) = Harness::at_mill();
        let mut queue = TaskQueue::new();
        queue.push(Task::new(TaskKind::Wait(Wait::new(dec!(2)))));
        queue.push_priority(Task::new(TaskKind::Eat(Eat::default())));
        assert_eq!(queue.len(), 2);
        assert!(queue.contains_kind(|k| matches!(k, TaskKind::Eat(_))));

        let mut ctx = TaskContext {
            agent: &mut h.agent,
            others: &mut h.others,
            map: &mut h.map,
            market: &mut h.market,
            catalog: &h.catalog,
            config: &h.config,
            rng: &mut h.rng,
            dt: dec!(1),
            followups: Vec::new(),
            events: Vec::new(),
        };
        let finished = queue.advance(&mut ctx).unwrap();
        assert!(matches!(finished.kind, TaskKind::Eat(_)));
        assert!(!queue.contains_kind(|k| matches!(k, TaskKind::Eat(_))));

        assert!(queue.advance(&mut ctx).is_none());
        let finished = queue.advance(&mut ctx).unwrap();
        assert!(matches!(finished.kind, TaskKind::Wait(_)));
        assert!(queue.is_empty());
        assert!(queue.advance(&mut ctx).is_none());
    }

    #[test]
    fn test_task_tree_serializes_mid_flight() {
        let (mut h, _) = Harness::at_mill();
        h.agent.stockpile.add(Good::new(wheat(), dec!(20)));
        let mut task = Task::new(TaskKind::Produce(Produce::new(flour(), dec!(10))))
            .then(Task::new(TaskKind::SellAtMarket(SellAtMarket::new(
                Good::new(flour(), dec!(10)),
                dec!(2),
            ))));
        h.tick(&mut task, dec!(1));

        let json = serde_json::to_string(&task).unwrap();
        let restored: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, task);
    }
}
