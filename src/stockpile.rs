//! Stockpile - owned quantity-by-good inventory
//!
//! Every agent, building and tile owns exactly one. One `Good` record per id:
//! additions merge, removals clamp, and records that reach (near) zero are pruned.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::{Catalog, ToolRequirement};
use crate::goods::{Good, GoodId};

/// Quantities below this are treated as gone.
pub const PRUNE_EPSILON: Decimal = dec!(0.001);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stockpile {
    goods: BTreeMap<GoodId, Good>,
}

impl Stockpile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(goods: impl IntoIterator<Item = Good>) -> Self {
        let mut stockpile = Self::new();
        for good in goods {
            stockpile.add(good);
        }
        stockpile
    }

    /// Merge `good` into the existing record for its id.
    pub fn add(&mut self, good: Good) {
        if good.is_empty() {
            return;
        }
        self.goods
            .entry(good.id)
            .and_modify(|g| g.quantity += good.quantity)
            .or_insert(good);
    }

    /// Remove up to `quantity`; returns what was actually removed.
    pub fn take(&mut self, id: GoodId, quantity: Decimal) -> Good {
        let Some(entry) = self.goods.get_mut(&id) else {
            return Good::none(id);
        };
        let taken = quantity.max(Decimal::ZERO).min(entry.quantity);
        entry.quantity -= taken;
        if entry.quantity <= Decimal::ZERO {
            self.goods.remove(&id);
        }
        Good::new(id, taken)
    }

    /// Look at a record without removing anything.
    pub fn borrow(&self, id: GoodId) -> Option<&Good> {
        self.goods.get(&id)
    }

    pub fn quantity(&self, id: GoodId) -> Decimal {
        self.goods.get(&id).map(|g| g.quantity).unwrap_or(Decimal::ZERO)
    }

    pub fn has(&self, id: GoodId, quantity: Decimal) -> bool {
        self.quantity(id) >= quantity
    }

    /// Best-grade tool satisfying `requirement`. Any positive quantity counts,
    /// worn tools are still tools.
    pub fn find_tool(&self, requirement: &ToolRequirement) -> Option<GoodId> {
        self.goods
            .values()
            .filter(|g| requirement.accepts(g.id) && !g.is_empty())
            .max_by_key(|g| g.id.material())
            .map(|g| g.id)
    }

    /// Reduce a tool's remaining durability by `amount`.
    pub fn wear(&mut self, id: GoodId, amount: Decimal) -> Decimal {
        self.take(id, amount).quantity
    }

    /// Apply one day of spoilage and drop records that fall below the epsilon.
    pub fn daily_decay(&mut self, catalog: &Catalog) -> Decimal {
        let mut lost = Decimal::ZERO;
        for good in self.goods.values_mut() {
            let rate = catalog.decay_rate(good.id);
            if rate > Decimal::ZERO {
                let decay = good.quantity * rate.min(Decimal::ONE);
                good.quantity -= decay;
                lost += decay;
            }
        }
        self.goods.retain(|_, g| {
            if g.quantity < PRUNE_EPSILON {
                lost += g.quantity;
                false
            } else {
                true
            }
        });
        lost
    }

    pub fn iter(&self) -> impl Iterator<Item = &Good> {
        self.goods.values()
    }

    pub fn len(&self) -> usize {
        self.goods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goods.is_empty()
    }

    /// Sum of all quantities, regardless of kind.
    pub fn total(&self) -> Decimal {
        self.goods.values().map(|g| g.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goods::{GoodCategory, Material, food, plant, tool};

    fn wheat() -> GoodId {
        GoodId::plain(GoodCategory::Plant, plant::WHEAT)
    }

    #[test]
    fn test_add_merges_records() {
        let mut stockpile = Stockpile::new();
        stockpile.add(Good::new(wheat(), dec!(10)));
        stockpile.add(Good::new(wheat(), dec!(5.5)));
        assert_eq!(stockpile.len(), 1);
        assert_eq!(stockpile.quantity(wheat()), dec!(15.5));
    }

    #[test]
    fn test_take_clamps_and_prunes() {
        let mut stockpile = Stockpile::with([Good::new(wheat(), dec!(8))]);
        let taken = stockpile.take(wheat(), dec!(3));
        assert_eq!(taken.quantity, dec!(3));
        assert_eq!(stockpile.quantity(wheat()), dec!(5));

        let rest = stockpile.take(wheat(), dec!(100));
        assert_eq!(rest.quantity, dec!(5));
        assert!(stockpile.is_empty());
        assert!(stockpile.borrow(wheat()).is_none());

        assert_eq!(stockpile.take(wheat(), dec!(1)).quantity, dec!(0));
        assert_eq!(stockpile.take(wheat(), dec!(-4)).quantity, dec!(0));
    }

    #[test]
    fn test_find_tool_prefers_best_grade() {
        let stone_axe = GoodId::tool(tool::AXE, Material::Stone);
        let iron_axe = GoodId::tool(tool::AXE, Material::Iron);
        let stockpile = Stockpile::with([
            Good::new(stone_axe, dec!(1)),
            Good::new(iron_axe, dec!(0.2)),
        ]);
        let req = ToolRequirement {
            kind: tool::AXE,
            min_material: Material::Stone,
        };
        assert_eq!(stockpile.find_tool(&req), Some(iron_axe));

        let copper_saw = ToolRequirement {
            kind: tool::SAW,
            min_material: Material::Copper,
        };
        assert_eq!(stockpile.find_tool(&copper_saw), None);
    }

    #[test]
    fn test_daily_decay_prunes_spoiled_food() {
        let catalog = Catalog::build();
        let stew = GoodId::plain(GoodCategory::Food, food::STEW);
        let stone = GoodId::plain(GoodCategory::Raw, crate::goods::raw::STONE);
        let mut stockpile = Stockpile::with([
            Good::new(stew, dec!(0.001)),
            Good::new(stone, dec!(10)),
        ]);
        stockpile.daily_decay(&catalog);
        assert_eq!(stockpile.quantity(stone), dec!(10));
        assert!(stockpile.borrow(stew).is_none());

        let mut fresh = Stockpile::with([Good::new(stew, dec!(10))]);
        let lost = fresh.daily_decay(&catalog);
        assert_eq!(fresh.quantity(stew), dec!(8));
        assert_eq!(lost, dec!(2));
    }
}
