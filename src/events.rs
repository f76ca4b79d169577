//! Structured simulation event log with timestamps.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::goods::GoodId;
use crate::market::Side;
use crate::types::{AgentId, BuildingId, OrderId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub tick: usize,
    /// Acting agent, `None` for world-level events.
    pub agent: Option<AgentId>,
    pub event_type: EventType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventType {
    GoodProduced {
        good: GoodId,
        quantity: Decimal,
        building: Option<BuildingId>,
    },
    GoodsConsumed {
        good: GoodId,
        quantity: Decimal,
        purpose: ConsumptionPurpose,
    },
    OrderPlaced {
        good: GoodId,
        quantity: Decimal,
        price: Decimal,
        side: Side,
        order_id: OrderId,
    },
    TradeExecuted {
        good: GoodId,
        quantity: Decimal,
        price: Decimal,
        counterparty: AgentId,
        side: Side,
    },
    OrderCancelled {
        good: GoodId,
        order_id: OrderId,
    },
    TaskFailed {
        description: String,
        reason: String,
    },
    AgentDied {
        cause: DeathCause,
        age: Decimal,
    },
    DayPassed {
        day: u64,
        spoiled: Decimal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumptionPurpose {
    Eating,
    Ingredient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathCause {
    Starvation,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.agent {
            Some(agent) => write!(f, "[{}] {}: ", self.tick, agent)?,
            None => write!(f, "[{}] world: ", self.tick)?,
        }
        write!(f, "{}", self.event_type)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::GoodProduced {
                good,
                quantity,
                building,
            } => match building {
                Some(building) => write!(f, "Produced {} {} at {}", quantity, good, building),
                None => write!(f, "Produced {} {}", quantity, good),
            },
            EventType::GoodsConsumed {
                good,
                quantity,
                purpose,
            } => {
                write!(f, "Consumed {} {} for {:?}", quantity, good, purpose)
            }
            EventType::OrderPlaced {
                good,
                quantity,
                price,
                side,
                order_id,
            } => {
                write!(
                    f,
                    "Placed {:?} order {} for {} {} at {}",
                    side, order_id, quantity, good, price
                )
            }
            EventType::TradeExecuted {
                good,
                quantity,
                price,
                counterparty,
                side,
            } => {
                write!(
                    f,
                    "{:?} {} {} at {} with {}",
                    side, quantity, good, price, counterparty
                )
            }
            EventType::OrderCancelled { good, order_id } => {
                write!(f, "Cancelled order {} for {}", order_id, good)
            }
            EventType::TaskFailed {
                description,
                reason,
            } => {
                write!(f, "Task '{}' failed: {}", description, reason)
            }
            EventType::AgentDied { cause, age } => {
                write!(f, "Died of {:?} at age {}s", cause, age)
            }
            EventType::DayPassed { day, spoiled } => {
                write!(f, "Day {} ended, {} units spoiled", day, spoiled)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EventLogger {
    events: Vec<Event>,
}

impl EventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, tick: usize, agent: Option<AgentId>, event_type: EventType) {
        self.events.push(Event {
            timestamp: Utc::now(),
            tick,
            agent,
            event_type,
        });
    }

    pub fn get_events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_of(&self, agent: AgentId) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.agent == Some(agent))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn save_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.events)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file(path: &str) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let events: Vec<Event> = serde_json::from_str(&json)?;
        Ok(Self { events })
    }
}
