//! Reference host: owns the map, market, agents, clock and RNG and ticks them in a
//! fixed order.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::{Agent, TickEnv};
use crate::catalog::Catalog;
use crate::config::SimConfig;
use crate::events::{DeathCause, EventLogger, EventType};
use crate::goods::GoodId;
use crate::map::WorldMap;
use crate::market::{Ledger, Market, Side};
use crate::stockpile::Stockpile;
use crate::types::{AgentId, TileId};

/// Ledger over every agent except the one currently acting.
struct Bystanders<'a> {
    before: &'a mut [Agent],
    after: &'a mut [Agent],
}

impl Bystanders<'_> {
    fn find(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.before
            .iter_mut()
            .chain(self.after.iter_mut())
            .find(|a| a.state.id == id)
    }
}

impl Ledger for Bystanders<'_> {
    fn money_mut(&mut self, agent: AgentId) -> Option<&mut Decimal> {
        self.find(agent).map(|a| &mut a.state.money)
    }

    fn stockpile_mut(&mut self, agent: AgentId) -> Option<&mut Stockpile> {
        self.find(agent).map(|a| &mut a.state.stockpile)
    }
}

/// Serializable copy of the whole simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: usize,
    pub clock: Decimal,
    pub day: u64,
    pub map: WorldMap,
    pub market: Market,
    pub agents: Vec<Agent>,
    pub next_agent_id: u32,
}

pub struct World {
    pub config: SimConfig,
    pub catalog: Arc<Catalog>,
    pub map: WorldMap,
    pub market: Market,
    agents: Vec<Agent>,
    /// Simulated seconds since start.
    pub clock: Decimal,
    pub day: u64,
    next_day_at: Decimal,
    pub tick_count: usize,
    rng: StdRng,
    pub events: EventLogger,
    next_agent_id: u32,
}

impl World {
    pub fn new(config: SimConfig, catalog: Arc<Catalog>, map: WorldMap, seed: u64) -> Self {
        let next_day_at = config.day_length;
        Self {
            config,
            catalog,
            map,
            market: Market::new(),
            agents: Vec::new(),
            clock: Decimal::ZERO,
            day: 0,
            next_day_at,
            tick_count: 0,
            rng: StdRng::seed_from_u64(seed),
            events: EventLogger::new(),
            next_agent_id: 1,
        }
    }

    /// Rebuild a world from a snapshot. The RNG is reseeded, so runs continue
    /// deterministically but not identically to the original.
    pub fn restore(snapshot: WorldSnapshot, config: SimConfig, catalog: Arc<Catalog>, seed: u64) -> Self {
        let day_length = config.day_length;
        let mut world = Self::new(config, catalog, snapshot.map, seed);
        world.market = snapshot.market;
        world.agents = snapshot.agents;
        world.clock = snapshot.clock;
        world.day = snapshot.day;
        world.next_day_at = day_length * Decimal::from(snapshot.day + 1);
        world.tick_count = snapshot.tick;
        world.next_agent_id = snapshot.next_agent_id;
        world
    }

    /// Create an agent standing on `tile`. Returns `None` for an unknown tile.
    pub fn spawn(&mut self, name: impl Into<String>, tile: TileId) -> Option<AgentId> {
        let position = self.map.tile(tile)?.position;
        let id = AgentId(self.next_agent_id);
        self.next_agent_id += 1;
        let agent = Agent::new(id, name, tile, position, self.config.default_speed);
        log::debug!("Spawned {} ({}) at {}", id, agent.state.name, tile);
        self.agents.push(agent);
        self.refresh_population();
        Some(id)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.state.id == id)
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.state.id == id)
    }

    pub fn tick(&mut self, dt: Decimal) {
        self.tick_count += 1;
        self.clock += dt;

        for index in 0..self.agents.len() {
            let (before, rest) = self.agents.split_at_mut(index);
            let Some((agent, after)) = rest.split_first_mut() else {
                break;
            };
            let mut others = Bystanders { before, after };
            let mut env = TickEnv {
                others: &mut others,
                map: &mut self.map,
                market: &mut self.market,
                catalog: self.catalog.as_ref(),
                config: &self.config,
                rng: &mut self.rng,
                dt,
            };
            let report = agent.tick(&mut env);
            let id = agent.state.id;
            for event in report.events {
                self.events.log(self.tick_count, Some(id), event);
            }
        }

        let starved: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|a| a.is_starved(&self.config))
            .map(|a| a.state.id)
            .collect();
        for id in starved {
            if let Some(agent) = self.remove_agent(id) {
                log::info!("{} ({}) starved at age {}s", id, agent.state.name, agent.state.age);
                self.events.log(
                    self.tick_count,
                    Some(id),
                    EventType::AgentDied {
                        cause: DeathCause::Starvation,
                        age: agent.state.age,
                    },
                );
            }
        }

        self.refresh_population();

        while self.config.day_length > Decimal::ZERO && self.clock >= self.next_day_at {
            self.end_of_day();
        }
    }

    /// Take an agent out of the simulation. Its building slots are freed and its
    /// resting orders are pulled, escrow going back to the removed agent.
    pub fn remove_agent(&mut self, id: AgentId) -> Option<Agent> {
        let index = self.agents.iter().position(|a| a.state.id == id)?;
        let mut agent = self.agents.remove(index);
        let dropped = agent.release_all(&mut self.map);
        for order in self.market.remove_agent(id) {
            match order.side {
                Side::Buy => agent.state.money += order.escrow,
                Side::Sell => agent.state.stockpile.add(order.good),
            }
        }
        log::debug!("Removed {} with {} queued tasks", id, dropped);
        self.refresh_population();
        Some(agent)
    }

    fn refresh_population(&mut self) {
        for tile in self.map.tiles_mut() {
            tile.population = 0;
        }
        for agent in &self.agents {
            if let Some(tile) = self.map.tile_mut(agent.state.tile) {
                tile.population += 1;
            }
        }
    }

    fn end_of_day(&mut self) {
        self.day += 1;
        self.next_day_at += self.config.day_length;

        let catalog = self.catalog.as_ref();
        let mut spoiled = Decimal::ZERO;
        for agent in &mut self.agents {
            spoiled += agent.state.stockpile.daily_decay(catalog);
        }
        for building in self.map.buildings_mut() {
            spoiled += building.stockpile.daily_decay(catalog);
        }
        for tile in self.map.tiles_mut() {
            spoiled += tile.stockpile.daily_decay(catalog);
        }

        log::info!(
            "Day {} ended: {} agents alive, {} units spoiled",
            self.day,
            self.agents.len(),
            spoiled.round_dp(3)
        );
        self.events
            .log(self.tick_count, None, EventType::DayPassed { day: self.day, spoiled });
    }

    /// Money held by agents plus money escrowed in resting bids.
    pub fn total_money(&self) -> Decimal {
        self.agents.iter().map(|a| a.state.money).sum::<Decimal>() + self.market.escrow_total()
    }

    /// Units of `good` held by agents plus units resting in asks.
    pub fn total_goods(&self, good: GoodId) -> Decimal {
        self.agents
            .iter()
            .map(|a| a.state.stockpile.quantity(good))
            .sum::<Decimal>()
            + self.market.goods_on_offer(good)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick_count,
            clock: self.clock,
            day: self.day,
            map: self.map.clone(),
            market: self.market.clone(),
            agents: self.agents.clone(),
            next_agent_id: self.next_agent_id,
        }
    }

    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Tick {} (t={}s, day {}): {} agents, {} money in circulation",
            self.tick_count,
            self.clock,
            self.day,
            self.agents.len(),
            self.total_money()
        )];
        for agent in &self.agents {
            lines.push(format!(
                "  {} {:<10} money {:>8} hunger {:>6} goods {:>6} | {}",
                agent.state.id,
                agent.state.name,
                agent.state.money.round_dp(2),
                agent.state.hunger.round_dp(1),
                agent.state.stockpile.total().round_dp(2),
                agent.current_task().unwrap_or_else(|| "idle".to_string())
            ));
        }
        for (good, _) in self.market.books() {
            lines.push(format!("  {}", self.market.describe(*good)));
        }
        lines.join("\n")
    }
}
