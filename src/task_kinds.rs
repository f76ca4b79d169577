//! Per-kind task behaviour.
//!
//! Each payload carries its own progress. `initialize` runs once, on the first tick
//! the task is runnable; `step` runs on that tick and every later one until it
//! returns something other than [`Step::Pending`]. Either may queue children on the
//! owning task, which then run before the next `step`.

use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::catalog::{IngredientMode, ProductionRequirement, ToolRequirement};
use crate::events::{ConsumptionPurpose, EventType};
use crate::goods::{Good, GoodCategory, GoodId, Material};
use crate::locator::{self, Found, Target};
use crate::map::WorldMap;
use crate::market::{MarketError, OrderRequest, Placement};
use crate::stockpile::Stockpile;
use crate::task::{Task, TaskContext, TaskError, TaskKind};
use crate::types::{BuildingId, Position};

/// Slowest soil still counts as this fertile.
const MIN_SOIL_QUALITY: Decimal = dec!(0.1);

/// Outcome of one `step`.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Pending,
    Done(Option<Good>),
    Fail(TaskError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveTo {
    pub target: Position,
    pub threshold: f64,
    /// Unit vector towards `target`, fixed at initialization.
    pub direction: (f64, f64),
}

impl MoveTo {
    pub fn new(target: Position, threshold: f64) -> Self {
        Self {
            target,
            threshold,
            direction: (0.0, 0.0),
        }
    }

    pub(crate) fn initialize(&mut self, ctx: &mut TaskContext<'_, '_>) -> Result<(), TaskError> {
        let from = ctx.agent.position;
        let distance = from.distance(&self.target);
        if distance > 0.0 {
            self.direction = (
                (self.target.x - from.x) / distance,
                (self.target.y - from.y) / distance,
            );
        }
        Ok(())
    }

    pub(crate) fn step(&mut self, ctx: &mut TaskContext<'_, '_>) -> Step {
        let position = ctx.agent.position;
        let remaining = position.distance(&self.target);
        let stride = ctx.agent.speed * ctx.dt.to_f64().unwrap_or(0.0);

        let next = if remaining <= self.threshold || stride >= remaining {
            self.target
        } else {
            Position::new(
                position.x + self.direction.0 * stride,
                position.y + self.direction.1 * stride,
            )
        };
        ctx.agent.position = next;
        if let Some(tile) = ctx.map.tile_at_position(next) {
            ctx.agent.tile = tile;
        }

        if next == self.target {
            Step::Done(None)
        } else {
            Step::Pending
        }
    }

    pub fn describe(&self) -> String {
        format!("Move to ({:.1}, {:.1})", self.target.x, self.target.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceStage {
    #[default]
    Start,
    Buying,
    Producing,
}

/// Make sure the agent holds some goods, by whatever means work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceGoods {
    pub good: Good,
    /// Set when sourcing a tool: any tool of `good`'s kind at this grade or better.
    pub tool_min_material: Option<Material>,
    /// Highest unit price worth paying.
    pub ceiling: Decimal,
    pub depth: u8,
    pub stage: SourceStage,
}

impl SourceGoods {
    pub fn goods(good: Good, ceiling: Decimal, depth: u8) -> Self {
        Self {
            good,
            tool_min_material: None,
            ceiling,
            depth,
            stage: SourceStage::Start,
        }
    }

    pub fn tool(requirement: ToolRequirement, ceiling: Decimal, depth: u8) -> Self {
        Self {
            good: Good::new(requirement.minimum_good(), Decimal::ONE),
            tool_min_material: Some(requirement.min_material),
            ceiling,
            depth,
            stage: SourceStage::Start,
        }
    }

    fn tool_requirement(&self) -> Option<ToolRequirement> {
        self.tool_min_material.map(|min_material| ToolRequirement {
            kind: self.good.id.subtype(),
            min_material,
        })
    }

    fn is_held(&self, stockpile: &Stockpile) -> bool {
        match self.tool_requirement() {
            Some(requirement) => stockpile.find_tool(&requirement).is_some(),
            None => stockpile.has(self.good.id, self.good.quantity),
        }
    }

    fn missing(&self, stockpile: &Stockpile) -> Decimal {
        if self.is_held(stockpile) {
            Decimal::ZERO
        } else if self.tool_min_material.is_some() {
            Decimal::ONE
        } else {
            self.good.quantity - stockpile.quantity(self.good.id)
        }
    }

    /// Kinds that would satisfy the request, cheapest grade first.
    fn candidates(&self) -> Vec<GoodId> {
        match self.tool_min_material {
            Some(min) => Material::ALL
                .iter()
                .filter(|m| **m >= min)
                .map(|m| GoodId::tool(self.good.id.subtype(), *m))
                .collect(),
            None => vec![self.good.id],
        }
    }

    fn held_value(&self, stockpile: &Stockpile) -> Good {
        match self.tool_requirement() {
            Some(requirement) => stockpile
                .find_tool(&requirement)
                .map(|id| Good::new(id, stockpile.quantity(id)))
                .unwrap_or(Good::none(self.good.id)),
            None => self.good,
        }
    }

    /// Move what the agent's home building has in store into the agent's stockpile.
    fn withdraw_from_home(&self, ctx: &mut TaskContext<'_, '_>) -> bool {
        let Some(home) = ctx.agent.home else {
            return false;
        };
        let missing = self.missing(&ctx.agent.stockpile);
        let Some(building) = ctx.map.building_mut(home) else {
            return false;
        };
        let taken = match self.tool_requirement() {
            Some(requirement) => match building.stockpile.find_tool(&requirement) {
                Some(tool) => building.stockpile.take(tool, Decimal::ONE),
                None => return false,
            },
            None => building.stockpile.take(self.good.id, missing),
        };
        if taken.is_empty() {
            return false;
        }
        log::debug!("{} took {} from {}", ctx.agent.id, taken, home);
        ctx.agent.stockpile.add(taken);
        self.is_held(&ctx.agent.stockpile)
    }

    /// Queue a fill-or-kill purchase if the asks can cover the shortfall affordably.
    fn try_buy(&self, children: &mut VecDeque<Task>, ctx: &mut TaskContext<'_, '_>) -> bool {
        let missing = self.missing(&ctx.agent.stockpile);
        if missing <= Decimal::ZERO {
            return false;
        }
        for id in self.candidates() {
            let wanted = Good::new(id, missing);
            let cost = ctx.market.check_price(wanted);
            if cost <= Decimal::ZERO || cost > missing * self.ceiling {
                continue;
            }
            let Some(limit) = ctx.market.fill_limit(wanted) else {
                continue;
            };
            if missing * limit > ctx.agent.money {
                continue;
            }
            children.push_back(Task::new(TaskKind::BuyFromMarket(BuyFromMarket::new(
                wanted, limit, true,
            ))));
            return true;
        }
        false
    }

    /// Queue production of the shortfall, if this agent could make it.
    fn start_production(&mut self, children: &mut VecDeque<Task>, ctx: &mut TaskContext<'_, '_>) -> Step {
        let id = self.good.id;
        let Some(requirement) = ctx.catalog.requirements(id) else {
            log::warn!("No production rule for {}", id);
            return Step::Fail(TaskError::MissingRule(id));
        };
        if let Some(skill) = requirement.skill {
            let actual = ctx.agent.skills.level(skill.skill);
            if actual < skill.level {
                return Step::Fail(TaskError::SkillTooLow {
                    skill: skill.skill,
                    required: skill.level,
                    actual,
                });
            }
        }
        if self.depth >= ctx.config.max_recipe_depth {
            return Step::Fail(TaskError::RecursionLimit(id));
        }

        let quantity = self.missing(&ctx.agent.stockpile);
        let produce = Produce::new(id, quantity).at_depth(self.depth + 1);
        children.push_back(Task::new(TaskKind::Produce(produce)));
        self.stage = SourceStage::Producing;
        Step::Pending
    }

    pub(crate) fn step(&mut self, children: &mut VecDeque<Task>, ctx: &mut TaskContext<'_, '_>) -> Step {
        if self.is_held(&ctx.agent.stockpile) {
            return Step::Done(Some(self.held_value(&ctx.agent.stockpile)));
        }
        match self.stage {
            SourceStage::Start => {
                if self.withdraw_from_home(ctx) {
                    return Step::Done(Some(self.held_value(&ctx.agent.stockpile)));
                }
                if self.try_buy(children, ctx) {
                    self.stage = SourceStage::Buying;
                    return Step::Pending;
                }
                self.start_production(children, ctx)
            }
            // The purchase came up short, e.g. the asks moved.
            SourceStage::Buying => self.start_production(children, ctx),
            SourceStage::Producing => Step::Fail(TaskError::Unsatisfiable(format!(
                "still short of {} after producing it",
                self.good
            ))),
        }
    }

    pub fn describe(&self) -> String {
        match self.tool_min_material {
            Some(min) => format!("Source {:?}+ {}", min, self.good.id.name()),
            None => format!("Source {}", self.good),
        }
    }
}

/// Produce `quantity` of `good` at a suitable site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Produce {
    pub good: GoodId,
    pub quantity: Decimal,
    /// Nesting level inside the goal that spawned it.
    pub depth: u8,
    pub site: Option<Found>,
    /// Ingredients fixed at initialization, already scaled to `quantity`.
    pub ingredients: Vec<Good>,
    pub tool: Option<ToolRequirement>,
    pub total_time: Decimal,
    pub elapsed: Decimal,
    pub occupying: Option<BuildingId>,
}

impl Produce {
    pub fn new(good: GoodId, quantity: Decimal) -> Self {
        Self {
            good,
            quantity,
            depth: 0,
            site: None,
            ingredients: Vec::new(),
            tool: None,
            total_time: Decimal::ZERO,
            elapsed: Decimal::ZERO,
            occupying: None,
        }
    }

    pub fn at_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }

    fn batches(&self, batch_quantity: Decimal) -> Decimal {
        if batch_quantity > Decimal::ZERO {
            self.quantity / batch_quantity
        } else {
            self.quantity
        }
    }

    fn locate(
        &self,
        requirement: &ProductionRequirement,
        ctx: &mut TaskContext<'_, '_>,
    ) -> Result<Option<Found>, TaskError> {
        let start = ctx.agent.tile;
        let depth = ctx.config.search_depth;
        match (requirement.building, requirement.tiles) {
            (Some(kind), tiles) => {
                let target = Target::usable_building(kind);
                let found = locator::find_with(ctx.map, start, depth, &mut *ctx.rng, |map, tile| {
                    let ground_ok = tiles.is_none_or(|mask| {
                        map.tile(tile).is_some_and(|t| mask.contains(t.kind))
                    });
                    if ground_ok { target.test(map, tile) } else { None }
                });
                found.map(Some).ok_or(TaskError::NoBuilding(kind))
            }
            (None, Some(mask)) => locator::find(ctx.map, start, Target::TileKinds(mask), depth, &mut *ctx.rng)
                .map(Some)
                .ok_or_else(|| TaskError::Unsatisfiable(format!("no tile to produce {} on", self.good))),
            (None, None) => Ok(None),
        }
    }

    pub(crate) fn initialize(
        &mut self,
        children: &mut VecDeque<Task>,
        ctx: &mut TaskContext<'_, '_>,
    ) -> Result<(), TaskError> {
        if self.depth > ctx.config.max_recipe_depth {
            return Err(TaskError::RecursionLimit(self.good));
        }
        let catalog = ctx.catalog;
        let (Some(requirement), Some(info)) = (catalog.requirements(self.good), catalog.info(self.good)) else {
            log::warn!("No production rule for {}", self.good);
            return Err(TaskError::MissingRule(self.good));
        };
        if let Some(skill) = requirement.skill {
            let actual = ctx.agent.skills.level(skill.skill);
            if actual < skill.level {
                return Err(TaskError::SkillTooLow {
                    skill: skill.skill,
                    required: skill.level,
                    actual,
                });
            }
        }

        let site = self.locate(requirement, ctx)?;
        let batches = self.batches(info.batch_quantity);
        let multiplier = ctx.config.price_ceiling_multiplier;

        if let Some(ingredients) = &requirement.ingredients {
            let chosen: Vec<(GoodId, Decimal)> = match ingredients.mode {
                IngredientMode::All => ingredients.goods.clone(),
                IngredientMode::AnyOne => ingredients.goods.choose(&mut *ctx.rng).copied().into_iter().collect(),
            };
            self.ingredients = chosen
                .into_iter()
                .map(|(id, per_batch)| Good::new(id, per_batch * batches))
                .collect();
        }
        for ingredient in &self.ingredients {
            let ceiling = catalog.base_price(ingredient.id) * multiplier;
            children.push_back(Task::new(TaskKind::SourceGoods(SourceGoods::goods(
                *ingredient,
                ceiling,
                self.depth,
            ))));
        }

        self.tool = requirement.tool;
        if let Some(tool) = requirement.tool {
            let ceiling = catalog.base_price(tool.minimum_good()) * multiplier;
            children.push_back(Task::new(TaskKind::SourceGoods(SourceGoods::tool(
                tool, ceiling, self.depth,
            ))));
        }

        self.site = site;
        self.walk_to_site(children, ctx);

        let skill = requirement.skill.map(|s| s.skill).unwrap_or(info.skill);
        let level = Decimal::from(ctx.agent.skills.level(skill).min(ctx.config.max_skill_level)).min(dec!(200));
        let mut total = info.base_time * batches * (dec!(200) - level) / dec!(200);
        if self.good.category() == Some(GoodCategory::Plant) {
            let map: &WorldMap = ctx.map;
            if let Some(tile) = site.and_then(|found| found.tile(map)).and_then(|t| map.tile(t)) {
                total /= tile.soil_quality.max(MIN_SOIL_QUALITY);
            }
        }
        self.total_time = total;

        log::debug!(
            "{} will produce {} {} in {}s ({} prerequisites)",
            ctx.agent.id,
            self.quantity,
            self.good,
            self.total_time,
            children.len()
        );
        Ok(())
    }

    /// Queue a move to the site unless the agent is already there.
    fn walk_to_site(&self, children: &mut VecDeque<Task>, ctx: &mut TaskContext<'_, '_>) -> bool {
        let site_position = self.site.and_then(|found| match found {
            Found::Building(building) => ctx.map.building_position(building),
            Found::Tile(tile) => ctx.map.tile(tile).map(|t| t.position),
        });
        let Some(position) = site_position else {
            return false;
        };
        let threshold = ctx.config.arrival_threshold;
        if ctx.agent.position.distance(&position) <= threshold {
            return false;
        }
        children.push_back(Task::new(TaskKind::MoveTo(MoveTo::new(position, threshold))));
        true
    }

    pub(crate) fn step(&mut self, children: &mut VecDeque<Task>, ctx: &mut TaskContext<'_, '_>) -> Step {
        // Sourcing may have taken the agent elsewhere.
        if self.occupying.is_none() && self.walk_to_site(children, ctx) {
            return Step::Pending;
        }
        if let Some(Found::Building(building)) = self.site {
            if self.occupying.is_none() {
                if !ctx.map.occupy(building) {
                    return Step::Fail(TaskError::BuildingFull(building));
                }
                self.occupying = Some(building);
            }
        }

        self.elapsed += ctx.dt;
        if self.elapsed < self.total_time {
            return Step::Pending;
        }
        self.finish(ctx)
    }

    fn finish(&mut self, ctx: &mut TaskContext<'_, '_>) -> Step {
        for ingredient in &self.ingredients {
            let used = ctx.agent.stockpile.take(ingredient.id, ingredient.quantity);
            if used.quantity < ingredient.quantity {
                log::debug!(
                    "{} was short of {} (used {})",
                    ctx.agent.id,
                    ingredient,
                    used.quantity
                );
            }
            if !used.is_empty() {
                ctx.events.push(EventType::GoodsConsumed {
                    good: used.id,
                    quantity: used.quantity,
                    purpose: ConsumptionPurpose::Ingredient,
                });
            }
        }

        let catalog = ctx.catalog;
        if let Some(info) = catalog.info(self.good) {
            if let Some(requirement) = &self.tool {
                if let Some(tool) = ctx.agent.stockpile.find_tool(requirement) {
                    let wear = info.tool_wear * self.batches(info.batch_quantity);
                    ctx.agent.stockpile.wear(tool, wear);
                }
            }
            let experience = self.quantity * info.experience_yield;
            if let Some(level) = ctx.agent.skills.gain(info.skill, experience, ctx.config) {
                log::info!("{} reached {:?} level {}", ctx.agent.id, info.skill, level);
            }
        }

        let output = Good::new(self.good, self.quantity);
        ctx.agent.stockpile.add(output);
        log::info!("{} produced {}", ctx.agent.id, output);
        ctx.events.push(EventType::GoodProduced {
            good: output.id,
            quantity: output.quantity,
            building: self.occupying,
        });
        Step::Done(Some(output))
    }

    pub(crate) fn release(&mut self, map: &mut WorldMap) {
        if let Some(building) = self.occupying.take() {
            map.release(building);
        }
    }

    pub fn describe(&self) -> String {
        if self.total_time > Decimal::ZERO {
            format!(
                "Produce {} {} ({}/{}s)",
                self.quantity,
                self.good,
                self.elapsed.min(self.total_time).round_dp(1),
                self.total_time.round_dp(1)
            )
        } else {
            format!("Produce {} {}", self.quantity, self.good)
        }
    }
}

/// Eat the most satiating food on hand until no longer hungry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Eat {
    pub eaten: Decimal,
}

impl Eat {
    pub(crate) fn step(&mut self, ctx: &mut TaskContext<'_, '_>) -> Step {
        let catalog = ctx.catalog;
        let mut edible: Vec<(GoodId, Decimal)> = ctx
            .agent
            .stockpile
            .iter()
            .map(|g| (g.id, catalog.satiation(g.id)))
            .filter(|(_, satiation)| *satiation > Decimal::ZERO)
            .collect();
        edible.sort_by(|a, b| b.1.cmp(&a.1));

        for (id, satiation) in edible {
            if ctx.agent.hunger <= Decimal::ZERO {
                break;
            }
            let eaten = ctx.agent.stockpile.take(id, ctx.agent.hunger / satiation);
            if eaten.is_empty() {
                continue;
            }
            ctx.agent.hunger = (ctx.agent.hunger - eaten.quantity * satiation).max(Decimal::ZERO);
            self.eaten += eaten.quantity;
            ctx.events.push(EventType::GoodsConsumed {
                good: id,
                quantity: eaten.quantity,
                purpose: ConsumptionPurpose::Eating,
            });
        }
        Step::Done(None)
    }

    pub fn describe(&self) -> String {
        "Eat".to_string()
    }
}

fn report_placement(ctx: &mut TaskContext<'_, '_>, request: &OrderRequest, placement: &Placement) {
    let agent = ctx.agent.id;
    ctx.events.push(EventType::OrderPlaced {
        good: request.good.id,
        quantity: request.good.quantity,
        price: request.price,
        side: request.side,
        order_id: placement.order_id,
    });
    for fill in &placement.fills {
        let counterparty = if fill.buyer == agent { fill.seller } else { fill.buyer };
        ctx.events.push(EventType::TradeExecuted {
            good: fill.good,
            quantity: fill.quantity,
            price: fill.price,
            counterparty,
            side: request.side,
        });
    }
}

/// Offer goods at a limit price. Whatever does not trade right away rests in the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellAtMarket {
    pub good: Good,
    pub price: Decimal,
}

impl SellAtMarket {
    pub fn new(good: Good, price: Decimal) -> Self {
        Self { good, price }
    }

    pub(crate) fn step(&mut self, ctx: &mut TaskContext<'_, '_>) -> Step {
        let request = OrderRequest::sell(ctx.agent.id, self.good, self.price);
        match ctx.trade(|market, ledger| market.place_sell_order(request, ledger)) {
            Ok(placement) => {
                report_placement(ctx, &request, &placement);
                Step::Done(Some(placement.filled))
            }
            Err(e) => Step::Fail(e.into()),
        }
    }

    pub fn describe(&self) -> String {
        format!("Sell {} at {}", self.good, self.price)
    }
}

/// Bid for goods. With `fill_or_kill` any part that does not trade immediately is
/// cancelled and its escrow refunded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyFromMarket {
    pub good: Good,
    pub price: Decimal,
    pub fill_or_kill: bool,
}

impl BuyFromMarket {
    pub fn new(good: Good, price: Decimal, fill_or_kill: bool) -> Self {
        Self {
            good,
            price,
            fill_or_kill,
        }
    }

    pub(crate) fn step(&mut self, ctx: &mut TaskContext<'_, '_>) -> Step {
        let request = OrderRequest::buy(ctx.agent.id, self.good, self.price);
        let fill_or_kill = self.fill_or_kill;
        let result = ctx.trade(|market, ledger| {
            let placement = market.place_buy_order(request, ledger)?;
            if let (true, Some(order)) = (fill_or_kill, placement.resting) {
                market.cancel_order(request.agent, request.good.id, order, ledger)?;
            }
            Ok::<_, MarketError>(placement)
        });
        match result {
            Ok(placement) => {
                report_placement(ctx, &request, &placement);
                if fill_or_kill && placement.resting.is_some() {
                    ctx.events.push(EventType::OrderCancelled {
                        good: request.good.id,
                        order_id: placement.order_id,
                    });
                }
                Step::Done(Some(placement.filled))
            }
            Err(e) => Step::Fail(e.into()),
        }
    }

    pub fn describe(&self) -> String {
        format!("Buy {} at up to {}", self.good, self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wait {
    pub duration: Decimal,
    pub elapsed: Decimal,
}

impl Wait {
    pub fn new(duration: Decimal) -> Self {
        Self {
            duration,
            elapsed: Decimal::ZERO,
        }
    }

    pub(crate) fn step(&mut self, ctx: &mut TaskContext<'_, '_>) -> Step {
        self.elapsed += ctx.dt;
        if self.elapsed >= self.duration {
            Step::Done(None)
        } else {
            Step::Pending
        }
    }

    pub fn describe(&self) -> String {
        format!("Wait {}s", self.duration - self.elapsed.min(self.duration))
    }
}
