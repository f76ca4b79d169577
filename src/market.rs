//! Continuous double-sided market.
//!
//! One [`OrderBook`] per good id. Bids are kept sorted by descending price, asks by
//! ascending price, and orders at equal prices keep their arrival order. Incoming
//! orders match immediately against the opposite side, best price first, at the
//! resting order's price; whatever is left over rests in the book.
//!
//! Buyers escrow `quantity * limit` when the order is placed and sellers escrow the
//! goods themselves, so a match only ever moves value that is already held by the
//! market. Money (agents + escrow) and goods (stockpiles + asks) are conserved.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;

use crate::goods::{Good, GoodId};
use crate::stockpile::Stockpile;
use crate::types::{AgentId, OrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// A request to place an order in the market
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub agent: AgentId,
    pub side: Side,
    pub good: Good,
    /// Limit price per unit.
    pub price: Decimal,
}

impl OrderRequest {
    pub fn buy(agent: AgentId, good: Good, price: Decimal) -> Self {
        Self {
            agent,
            side: Side::Buy,
            good,
            price,
        }
    }

    pub fn sell(agent: AgentId, good: Good, price: Decimal) -> Self {
        Self {
            agent,
            side: Side::Sell,
            good,
            price,
        }
    }
}

/// An order resting in a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    pub id: OrderId,
    pub agent: AgentId,
    pub side: Side,
    /// Remaining (unfilled) quantity.
    pub good: Good,
    pub price: Decimal,
    /// Funds held for a bid. Always `good.quantity * price` between matches; zero for asks.
    pub escrow: Decimal,
}

/// One matched pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub good: GoodId,
    pub buyer: AgentId,
    pub seller: AgentId,
    pub buy_order: OrderId,
    pub sell_order: OrderId,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl Fill {
    pub fn value(&self) -> Decimal {
        self.quantity * self.price
    }
}

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub order_id: OrderId,
    /// Goods received (buy) or delivered (sell) by immediate matching.
    pub filled: Good,
    pub fills: Vec<Fill>,
    /// Set when a remainder was left resting in the book.
    pub resting: Option<OrderId>,
}

impl Placement {
    pub fn is_fully_filled(&self) -> bool {
        self.resting.is_none()
    }

    pub fn traded_value(&self) -> Decimal {
        self.fills.iter().map(Fill::value).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketError {
    InsufficientFunds { needed: Decimal, available: Decimal },
    NothingToSell(GoodId),
    InvalidQuantity(Decimal),
    InvalidPrice(Decimal),
    UnknownAgent(AgentId),
    OrderNotFound(OrderId),
    NotOwner { order: OrderId, agent: AgentId },
}

impl fmt::Display for MarketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketError::InsufficientFunds { needed, available } => {
                write!(f, "Insufficient funds: need {}, have {}", needed, available)
            }
            MarketError::NothingToSell(good) => write!(f, "No {} to sell", good),
            MarketError::InvalidQuantity(q) => write!(f, "Invalid quantity {}", q),
            MarketError::InvalidPrice(p) => write!(f, "Invalid price {}", p),
            MarketError::UnknownAgent(agent) => write!(f, "Unknown agent {}", agent),
            MarketError::OrderNotFound(order) => write!(f, "Order {} not found", order),
            MarketError::NotOwner { order, agent } => {
                write!(f, "{} does not own {}", agent, order)
            }
        }
    }
}

impl Error for MarketError {}

/// The market's view of agents' wallets and inventories.
pub trait Ledger {
    fn money_mut(&mut self, agent: AgentId) -> Option<&mut Decimal>;
    fn stockpile_mut(&mut self, agent: AgentId) -> Option<&mut Stockpile>;
}

/// Plain wallet + inventory, handy for driving the market without a world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub money: Decimal,
    pub stockpile: Stockpile,
}

impl Ledger for HashMap<AgentId, Account> {
    fn money_mut(&mut self, agent: AgentId) -> Option<&mut Decimal> {
        self.get_mut(&agent).map(|a| &mut a.money)
    }

    fn stockpile_mut(&mut self, agent: AgentId) -> Option<&mut Stockpile> {
        self.get_mut(&agent).map(|a| &mut a.stockpile)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Descending price, arrival order within a price.
    pub bids: Vec<MarketOrder>,
    /// Ascending price, arrival order within a price.
    pub asks: Vec<MarketOrder>,
}

impl OrderBook {
    fn insert(&mut self, order: MarketOrder) {
        match order.side {
            Side::Buy => {
                let at = self.bids.partition_point(|o| o.price >= order.price);
                self.bids.insert(at, order);
            }
            Side::Sell => {
                let at = self.asks.partition_point(|o| o.price <= order.price);
                self.asks.insert(at, order);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.bids.windows(2).all(|w| w[0].price >= w[1].price)
            && self.asks.windows(2).all(|w| w[0].price <= w[1].price)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Market {
    books: BTreeMap<GoodId, OrderBook>,
    last_prices: BTreeMap<GoodId, Decimal>,
    next_order_id: u64,
}

impl Market {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    /// Check a request and return its notional value, `quantity * price`.
    fn validate(request: &OrderRequest) -> Result<Decimal, MarketError> {
        if request.good.quantity <= Decimal::ZERO {
            return Err(MarketError::InvalidQuantity(request.good.quantity));
        }
        if request.price < Decimal::ZERO {
            return Err(MarketError::InvalidPrice(request.price));
        }
        request
            .good
            .quantity
            .checked_mul(request.price)
            .ok_or(MarketError::InvalidQuantity(request.good.quantity))
    }

    /// Escrow the buyer's funds, match against asks at or below the limit, and rest
    /// the remainder. Price improvement is refunded to the buyer straight away.
    pub fn place_buy_order(
        &mut self,
        request: OrderRequest,
        ledger: &mut dyn Ledger,
    ) -> Result<Placement, MarketError> {
        let cost = Self::validate(&request)?;
        let buyer = request.agent;
        let money = ledger
            .money_mut(buyer)
            .ok_or(MarketError::UnknownAgent(buyer))?;
        if *money < cost {
            return Err(MarketError::InsufficientFunds {
                needed: cost,
                available: *money,
            });
        }
        *money -= cost;

        let mut order = MarketOrder {
            id: self.allocate_id(),
            agent: buyer,
            side: Side::Buy,
            good: request.good,
            price: request.price,
            escrow: cost,
        };

        let mut refund = Decimal::ZERO;
        let fills = self.match_buy(&mut order, &mut refund, ledger);
        let bought: Decimal = fills.iter().map(|f| f.quantity).sum();
        if order.good.quantity <= Decimal::ZERO {
            // Rounding remainder of a filled order's escrow goes back to the buyer.
            refund += order.escrow;
            order.escrow = Decimal::ZERO;
        }

        if let Some(money) = ledger.money_mut(buyer) {
            *money += refund;
        }
        if let Some(stockpile) = ledger.stockpile_mut(buyer) {
            stockpile.add(Good::new(order.good.id, bought));
        }

        let order_id = order.id;
        let resting = self.rest(order);
        log::debug!(
            "{} bought {} {} in {} fills (resting: {:?})",
            buyer,
            bought,
            request.good.id,
            fills.len(),
            resting
        );
        Ok(Placement {
            order_id,
            filled: Good::new(request.good.id, bought),
            fills,
            resting,
        })
    }

    /// Escrow the seller's goods (clamped to what they hold), match against bids at
    /// or above the limit, and rest the remainder.
    pub fn place_sell_order(
        &mut self,
        request: OrderRequest,
        ledger: &mut dyn Ledger,
    ) -> Result<Placement, MarketError> {
        Self::validate(&request)?;
        let seller = request.agent;
        let stockpile = ledger
            .stockpile_mut(seller)
            .ok_or(MarketError::UnknownAgent(seller))?;
        let offered = stockpile.take(request.good.id, request.good.quantity);
        if offered.is_empty() {
            return Err(MarketError::NothingToSell(request.good.id));
        }

        let mut order = MarketOrder {
            id: self.allocate_id(),
            agent: seller,
            side: Side::Sell,
            good: offered,
            price: request.price,
            escrow: Decimal::ZERO,
        };

        let fills = self.match_sell(&mut order, ledger);
        let sold: Decimal = fills.iter().map(|f| f.quantity).sum();
        let proceeds: Decimal = fills.iter().map(Fill::value).sum();
        if let Some(money) = ledger.money_mut(seller) {
            *money += proceeds;
        }

        let order_id = order.id;
        let resting = self.rest(order);
        log::debug!(
            "{} sold {} {} for {} (resting: {:?})",
            seller,
            sold,
            request.good.id,
            proceeds,
            resting
        );
        Ok(Placement {
            order_id,
            filled: Good::new(request.good.id, sold),
            fills,
            resting,
        })
    }

    fn rest(&mut self, order: MarketOrder) -> Option<OrderId> {
        if order.good.quantity <= Decimal::ZERO {
            return None;
        }
        let id = order.id;
        self.books.entry(order.good.id).or_default().insert(order);
        Some(id)
    }

    fn match_buy(
        &mut self,
        order: &mut MarketOrder,
        refund: &mut Decimal,
        ledger: &mut dyn Ledger,
    ) -> Vec<Fill> {
        let mut fills = Vec::new();
        let Some(book) = self.books.get_mut(&order.good.id) else {
            return fills;
        };

        let mut i = 0;
        while order.good.quantity > Decimal::ZERO && i < book.asks.len() {
            let ask = &mut book.asks[i];
            if ask.price > order.price {
                break;
            }
            let Some(seller_money) = ledger.money_mut(ask.agent) else {
                log::warn!("Dropping {} from unknown seller {}", ask.id, ask.agent);
                book.asks.remove(i);
                continue;
            };

            let quantity = order.good.quantity.min(ask.good.quantity);
            let paid = quantity * ask.price;
            let held = quantity * order.price;
            *seller_money += paid;
            *refund += held - paid;
            order.escrow -= held;
            order.good.quantity -= quantity;
            ask.good.quantity -= quantity;

            fills.push(Fill {
                good: order.good.id,
                buyer: order.agent,
                seller: ask.agent,
                buy_order: order.id,
                sell_order: ask.id,
                quantity,
                price: ask.price,
            });

            if ask.good.quantity <= Decimal::ZERO {
                book.asks.remove(i);
            } else {
                i += 1;
            }
        }

        if let Some(last) = fills.last() {
            self.last_prices.insert(order.good.id, last.price);
        }
        fills
    }

    fn match_sell(&mut self, order: &mut MarketOrder, ledger: &mut dyn Ledger) -> Vec<Fill> {
        let mut fills = Vec::new();
        let Some(book) = self.books.get_mut(&order.good.id) else {
            return fills;
        };

        let mut i = 0;
        while order.good.quantity > Decimal::ZERO && i < book.bids.len() {
            let bid = &mut book.bids[i];
            if bid.price < order.price {
                break;
            }
            let Some(buyer_stock) = ledger.stockpile_mut(bid.agent) else {
                log::warn!("Dropping {} from unknown buyer {}", bid.id, bid.agent);
                book.bids.remove(i);
                continue;
            };

            let quantity = order.good.quantity.min(bid.good.quantity);
            buyer_stock.add(Good::new(order.good.id, quantity));
            bid.escrow -= quantity * bid.price;
            bid.good.quantity -= quantity;
            order.good.quantity -= quantity;
            if bid.good.quantity <= Decimal::ZERO && !bid.escrow.is_zero() {
                match ledger.money_mut(bid.agent) {
                    Some(money) => *money += bid.escrow,
                    None => log::warn!("Escrow remainder for {} has no owner", bid.id),
                }
                bid.escrow = Decimal::ZERO;
            }

            fills.push(Fill {
                good: order.good.id,
                buyer: bid.agent,
                seller: order.agent,
                buy_order: bid.id,
                sell_order: order.id,
                quantity,
                price: bid.price,
            });

            if bid.good.quantity <= Decimal::ZERO {
                book.bids.remove(i);
            } else {
                i += 1;
            }
        }

        if let Some(last) = fills.last() {
            self.last_prices.insert(order.good.id, last.price);
        }
        fills
    }

    /// Withdraw a resting order. Only its owner may do so; bids are refunded and
    /// asks hand their goods back.
    pub fn cancel_order(
        &mut self,
        agent: AgentId,
        good: GoodId,
        order_id: OrderId,
        ledger: &mut dyn Ledger,
    ) -> Result<MarketOrder, MarketError> {
        let book = self
            .books
            .get_mut(&good)
            .ok_or(MarketError::OrderNotFound(order_id))?;

        let (side, index) = if let Some(i) = book.bids.iter().position(|o| o.id == order_id) {
            (Side::Buy, i)
        } else if let Some(i) = book.asks.iter().position(|o| o.id == order_id) {
            (Side::Sell, i)
        } else {
            return Err(MarketError::OrderNotFound(order_id));
        };

        let list = match side {
            Side::Buy => &mut book.bids,
            Side::Sell => &mut book.asks,
        };
        if list[index].agent != agent {
            return Err(MarketError::NotOwner {
                order: order_id,
                agent,
            });
        }
        let order = list.remove(index);
        if book.is_empty() {
            self.books.remove(&good);
        }

        match order.side {
            Side::Buy => match ledger.money_mut(agent) {
                Some(money) => *money += order.escrow,
                None => log::warn!("Refund for {} has no owner", order.id),
            },
            Side::Sell => match ledger.stockpile_mut(agent) {
                Some(stockpile) => stockpile.add(order.good),
                None => log::warn!("Returned goods for {} have no owner", order.id),
            },
        }
        Ok(order)
    }

    /// Drop every order of an agent that left the simulation. Their escrow leaves
    /// with them.
    pub fn remove_agent(&mut self, agent: AgentId) -> Vec<MarketOrder> {
        let mut removed = Vec::new();
        for book in self.books.values_mut() {
            for list in [&mut book.bids, &mut book.asks] {
                let (gone, kept): (Vec<_>, Vec<_>) =
                    list.drain(..).partition(|o| o.agent == agent);
                *list = kept;
                removed.extend(gone);
            }
        }
        self.books.retain(|_, book| !book.is_empty());
        removed
    }

    /// Total cost of buying `good.quantity` at the current asks, or zero if the asks
    /// cannot fill it.
    pub fn check_price(&self, good: Good) -> Decimal {
        let Some(book) = self.books.get(&good.id) else {
            return Decimal::ZERO;
        };
        let mut needed = good.quantity;
        let mut cost = Decimal::ZERO;
        for ask in &book.asks {
            if needed <= Decimal::ZERO {
                break;
            }
            let quantity = needed.min(ask.good.quantity);
            let Some(total) = quantity
                .checked_mul(ask.price)
                .and_then(|value| cost.checked_add(value))
            else {
                return Decimal::ZERO;
            };
            cost = total;
            needed -= quantity;
        }
        if needed > Decimal::ZERO { Decimal::ZERO } else { cost }
    }

    /// Lowest limit price that would fill `good.quantity` entirely from the current
    /// asks, i.e. the price of the last ask the sweep would touch.
    pub fn fill_limit(&self, good: Good) -> Option<Decimal> {
        let mut needed = good.quantity;
        for ask in self.asks(good.id) {
            needed -= ask.good.quantity;
            if needed <= Decimal::ZERO {
                return Some(ask.price);
            }
        }
        None
    }

    pub fn book(&self, good: GoodId) -> Option<&OrderBook> {
        self.books.get(&good)
    }

    pub fn books(&self) -> impl Iterator<Item = (&GoodId, &OrderBook)> {
        self.books.iter()
    }

    pub fn bids(&self, good: GoodId) -> &[MarketOrder] {
        self.books.get(&good).map(|b| b.bids.as_slice()).unwrap_or(&[])
    }

    pub fn asks(&self, good: GoodId) -> &[MarketOrder] {
        self.books.get(&good).map(|b| b.asks.as_slice()).unwrap_or(&[])
    }

    pub fn best_bid(&self, good: GoodId) -> Option<Decimal> {
        self.bids(good).first().map(|o| o.price)
    }

    pub fn best_ask(&self, good: GoodId) -> Option<Decimal> {
        self.asks(good).first().map(|o| o.price)
    }

    pub fn last_price(&self, good: GoodId) -> Option<Decimal> {
        self.last_prices.get(&good).copied()
    }

    pub fn orders_of(&self, agent: AgentId) -> impl Iterator<Item = &MarketOrder> {
        self.books
            .values()
            .flat_map(|b| b.bids.iter().chain(b.asks.iter()))
            .filter(move |o| o.agent == agent)
    }

    /// Funds currently held for resting bids.
    pub fn escrow_total(&self) -> Decimal {
        self.books
            .values()
            .flat_map(|b| b.bids.iter())
            .map(|o| o.escrow)
            .sum()
    }

    /// Goods currently held for resting asks of `good`.
    pub fn goods_on_offer(&self, good: GoodId) -> Decimal {
        self.asks(good).iter().map(|o| o.good.quantity).sum()
    }

    pub fn describe(&self, good: GoodId) -> String {
        let bids = self.bids(good);
        let asks = self.asks(good);
        let best = |p: Option<Decimal>| p.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        format!(
            "{}: {} bids (best {}), {} asks (best {}), last {}",
            good,
            bids.len(),
            best(self.best_bid(good)),
            asks.len(),
            best(self.best_ask(good)),
            best(self.last_price(good)),
        )
    }
}
