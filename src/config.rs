use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Tunable constants shared by the world, agents and tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seconds per simulated day; stockpiles decay once per day.
    pub day_length: Decimal,
    /// Distance at which a move counts as arrived.
    pub arrival_threshold: f64,
    /// Tiles per second for agents without an explicit speed.
    pub default_speed: f64,
    /// `max_depth` handed to the locator.
    pub search_depth: usize,
    /// How many nested Produce tasks a single goal may spawn.
    pub max_recipe_depth: u8,
    /// Willingness to pay, as a multiple of a good's base price.
    pub price_ceiling_multiplier: Decimal,
    /// Ask price for produced goods, as a multiple of base price.
    pub sell_markup: Decimal,
    /// Hunger gained per second.
    pub hunger_rate: Decimal,
    /// Hunger at which an agent goes to eat.
    pub hunger_threshold: Decimal,
    /// Hunger at which an agent dies.
    pub starvation_limit: Decimal,
    /// Idle time after a failed goal.
    pub failure_backoff: Decimal,
    /// Experience needed per level is `experience_per_level * (level + 1)`.
    pub experience_per_level: Decimal,
    pub max_skill_level: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            day_length: dec!(600),
            arrival_threshold: 0.05,
            default_speed: 1.0,
            search_depth: 16,
            max_recipe_depth: 4,
            price_ceiling_multiplier: dec!(3),
            sell_markup: dec!(1.2),
            hunger_rate: dec!(0.05),
            hunger_threshold: dec!(50),
            starvation_limit: dec!(100),
            failure_backoff: dec!(10),
            experience_per_level: dec!(10),
            max_skill_level: 100,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.day_length <= Decimal::ZERO {
            return Err("day_length must be positive".to_string());
        }
        if self.hunger_threshold >= self.starvation_limit {
            return Err(format!(
                "hunger_threshold ({}) must be below starvation_limit ({})",
                self.hunger_threshold, self.starvation_limit
            ));
        }
        if self.arrival_threshold <= 0.0 || self.default_speed <= 0.0 {
            return Err("arrival_threshold and default_speed must be positive".to_string());
        }
        if self.max_skill_level > 200 {
            return Err("max_skill_level above 200 would make production time negative".to_string());
        }
        Ok(())
    }
}
