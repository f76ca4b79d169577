//! Agents: the state tasks operate on plus the queue that drives them.

use rand::rngs::StdRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::{Catalog, Skill};
use crate::config::SimConfig;
use crate::events::EventType;
use crate::goods::{Good, GoodId};
use crate::map::WorldMap;
use crate::market::{Ledger, Market};
use crate::stockpile::Stockpile;
use crate::task::{Task, TaskContext, TaskKind, TaskQueue};
use crate::task_kinds::{BuyFromMarket, Eat, Produce, SellAtMarket, Wait};
use crate::types::{AgentId, BuildingId, Position, TileId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillProgress {
    pub level: u32,
    /// Experience banked towards the next level.
    pub experience: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skills(BTreeMap<Skill, SkillProgress>);

impl Skills {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, skill: Skill) -> u32 {
        self.0.get(&skill).map(|p| p.level).unwrap_or(0)
    }

    pub fn set_level(&mut self, skill: Skill, level: u32) {
        self.0.entry(skill).or_default().level = level;
    }

    /// Bank experience; returns the new level if it went up.
    pub fn gain(&mut self, skill: Skill, experience: Decimal, config: &SimConfig) -> Option<u32> {
        if experience <= Decimal::ZERO {
            return None;
        }
        let progress = self.0.entry(skill).or_default();
        progress.experience += experience;

        let mut leveled = None;
        while progress.level < config.max_skill_level {
            let needed = config.experience_per_level * Decimal::from(progress.level + 1);
            if progress.experience < needed {
                break;
            }
            progress.experience -= needed;
            progress.level += 1;
            leveled = Some(progress.level);
        }
        leveled
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Skill, &SkillProgress)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub name: String,
    pub money: Decimal,
    pub stockpile: Stockpile,
    pub skills: Skills,
    pub hunger: Decimal,
    /// Seconds alive.
    pub age: Decimal,
    pub position: Position,
    pub tile: TileId,
    pub home: Option<BuildingId>,
    /// Tiles per second.
    pub speed: f64,
}

/// What an idle agent makes for a living.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profession {
    pub good: GoodId,
    /// Amount per goal; one catalog batch when unset.
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub state: AgentState,
    pub tasks: TaskQueue,
    pub profession: Option<Profession>,
}

/// The parts of the world an agent's tasks may touch during one tick.
pub struct TickEnv<'a, 'l> {
    pub others: &'a mut (dyn Ledger + 'l),
    pub map: &'a mut WorldMap,
    pub market: &'a mut Market,
    pub catalog: &'a Catalog,
    pub config: &'a SimConfig,
    pub rng: &'a mut StdRng,
    pub dt: Decimal,
}

#[derive(Debug, Default)]
pub struct TickReport {
    /// Top-level task that completed this tick, if any.
    pub finished: Option<Task>,
    pub events: Vec<EventType>,
}

impl Agent {
    pub fn new(id: AgentId, name: impl Into<String>, tile: TileId, position: Position, speed: f64) -> Self {
        Self {
            state: AgentState {
                id,
                name: name.into(),
                money: Decimal::ZERO,
                stockpile: Stockpile::new(),
                skills: Skills::new(),
                hunger: Decimal::ZERO,
                age: Decimal::ZERO,
                position,
                tile,
                home: None,
                speed,
            },
            tasks: TaskQueue::new(),
            profession: None,
        }
    }

    pub fn id(&self) -> AgentId {
        self.state.id
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_starved(&self, config: &SimConfig) -> bool {
        self.state.hunger >= config.starvation_limit
    }

    pub fn assign(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn current_task(&self) -> Option<String> {
        self.tasks.peek().map(Task::describe)
    }

    /// Advance the agent by one tick: grow hungry, pick a goal if idle, run one step
    /// of the active task.
    pub fn tick(&mut self, env: &mut TickEnv<'_, '_>) -> TickReport {
        let dt = env.dt;
        self.state.age += dt;
        self.state.hunger += env.config.hunger_rate * dt;

        if self.state.hunger >= env.config.hunger_threshold
            && !self.tasks.contains_kind(|k| matches!(k, TaskKind::Eat(_)))
        {
            // Without food on hand or on offer there is nothing to interrupt work for.
            let meal = self.plan_meal(env.market, env.catalog);
            if meal.is_some() || self.has_food(env.catalog) {
                log::debug!("{} is hungry ({})", self.state.id, self.state.hunger);
                if let Some(meal) = meal {
                    self.tasks.push_priority(meal);
                }
                self.tasks.push_priority(Task::new(TaskKind::Eat(Eat::default())));
            }
        }

        if self.tasks.is_empty() {
            if let Some(goal) = self.next_goal(env.catalog, env.config) {
                log::debug!("{} picked goal: {}", self.state.id, goal.describe());
                self.tasks.push(goal);
            }
        }

        let mut ctx = TaskContext {
            agent: &mut self.state,
            others: &mut *env.others,
            map: &mut *env.map,
            market: &mut *env.market,
            catalog: env.catalog,
            config: env.config,
            rng: &mut *env.rng,
            dt,
            followups: Vec::new(),
            events: Vec::new(),
        };
        let finished = self.tasks.advance(&mut ctx);
        let TaskContext {
            followups, events, ..
        } = ctx;

        for task in followups {
            self.tasks.push(task);
        }

        let mut report = TickReport {
            finished: None,
            events,
        };
        if let Some(mut task) = finished {
            let next = if task.status.failed {
                log::info!(
                    "{} gave up on {}: {}",
                    self.state.id,
                    task.kind.describe(),
                    task.status
                        .error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default()
                );
                task.on_failure.take()
            } else {
                task.on_success.take()
            };
            if let Some(next) = next {
                self.tasks.push(*next);
            }
            report.finished = Some(task);
        }
        report
    }

    pub fn has_food(&self, catalog: &Catalog) -> bool {
        self.state
            .stockpile
            .iter()
            .any(|g| catalog.satiation(g.id) > Decimal::ZERO)
    }

    /// With no food on hand, buy enough of the best-value food on offer to eat.
    fn plan_meal(&self, market: &Market, catalog: &Catalog) -> Option<Task> {
        if self.has_food(catalog) {
            return None;
        }

        let hunger = self.state.hunger;
        market
            .books()
            .filter_map(|(id, _)| {
                let satiation = catalog.satiation(*id);
                if satiation <= Decimal::ZERO {
                    return None;
                }
                let wanted = Good::new(*id, (hunger / satiation).ceil().max(Decimal::ONE));
                let cost = market.check_price(wanted);
                let limit = market.fill_limit(wanted)?;
                (cost > Decimal::ZERO && wanted.quantity * limit <= self.state.money)
                    .then_some((wanted, limit, cost / satiation))
            })
            .min_by(|a, b| a.2.cmp(&b.2))
            .map(|(wanted, limit, _)| Task::new(TaskKind::BuyFromMarket(BuyFromMarket::new(wanted, limit, true))))
    }

    /// Produce one lot of the profession's good, then put it up for sale. A failed
    /// attempt backs off before the next one.
    fn next_goal(&self, catalog: &Catalog, config: &SimConfig) -> Option<Task> {
        let profession = self.profession.as_ref()?;
        let good = profession.good;
        let quantity = profession.quantity.unwrap_or_else(|| {
            catalog
                .info(good)
                .map(|i| i.batch_quantity)
                .unwrap_or(Decimal::ONE)
        });
        let price = catalog.base_price(good) * config.sell_markup;

        let produce = Task::new(TaskKind::Produce(Produce::new(good, quantity)));
        let sell = Task::new(TaskKind::SellAtMarket(SellAtMarket::new(Good::new(good, quantity), price)));
        let back_off = Task::new(TaskKind::Wait(Wait::new(config.failure_backoff)));
        Some(produce.then(sell).or_else(back_off))
    }

    /// Drop every queued task, giving back building slots the task trees hold.
    pub fn release_all(&mut self, map: &mut WorldMap) -> usize {
        let tasks = self.tasks.drain();
        let count = tasks.len();
        for mut task in tasks {
            task.abandon(map);
        }
        count
    }
}
