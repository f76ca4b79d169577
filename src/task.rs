//! Resumable hierarchical tasks.
//!
//! A [`Task`] is an explicit state object: every "local" a long-running job needs
//! (elapsed time, resolved building, sourced ingredients) lives in its [`TaskKind`]
//! payload, and [`Task::execute`] is re-invoked once per tick until the task reports
//! `complete`. Returning with `complete == false` is the only suspension point.
//!
//! Tasks form a tree. A task initializes on its first execution, and any children
//! it queues there start in that same tick. A task with queued children runs its
//! front child instead of itself; one child advances per tick. A failed child fails
//! its parent on the spot, a succeeded child is dropped, and when the last child
//! finishes the parent gets to run in that same tick.

use rand::rngs::StdRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;

use crate::agent::AgentState;
use crate::catalog::{Catalog, Skill};
use crate::config::SimConfig;
use crate::events::EventType;
use crate::goods::{Good, GoodId};
use crate::map::{BuildingKind, WorldMap};
use crate::market::{Ledger, Market, MarketError};
use crate::stockpile::Stockpile;
use crate::task_kinds::{
    BuyFromMarket, Eat, MoveTo, Produce, SellAtMarket, SourceGoods, Step, Wait,
};
use crate::types::{AgentId, BuildingId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskError {
    /// A tile, building or ingredient could not be located or obtained.
    Unsatisfiable(String),
    /// The catalog has no rule for the good. A data bug, not a gameplay outcome.
    MissingRule(GoodId),
    SkillTooLow {
        skill: Skill,
        required: u32,
        actual: u32,
    },
    NoBuilding(BuildingKind),
    BuildingFull(BuildingId),
    RecursionLimit(GoodId),
    Market(MarketError),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Unsatisfiable(msg) => write!(f, "Unsatisfiable: {}", msg),
            TaskError::MissingRule(good) => write!(f, "No production rule for {}", good),
            TaskError::SkillTooLow {
                skill,
                required,
                actual,
            } => write!(f, "{:?} level {} below required {}", skill, actual, required),
            TaskError::NoBuilding(kind) => write!(f, "No usable {:?} in range", kind),
            TaskError::BuildingFull(id) => write!(f, "{} is full", id),
            TaskError::RecursionLimit(good) => {
                write!(f, "Recipe chain for {} is too deep", good)
            }
            TaskError::Market(e) => write!(f, "Market: {}", e),
        }
    }
}

impl Error for TaskError {}

impl From<MarketError> for TaskError {
    fn from(e: MarketError) -> Self {
        TaskError::Market(e)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub complete: bool,
    pub failed: bool,
    /// What the task hands back to whoever queued it, e.g. goods bought or produced.
    pub value: Option<Good>,
    pub error: Option<TaskError>,
}

impl TaskStatus {
    pub fn succeeded(&self) -> bool {
        self.complete && !self.failed
    }
}

/// Kind-specific behaviour and progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TaskKind {
    MoveTo(MoveTo),
    SourceGoods(SourceGoods),
    Produce(Produce),
    Eat(Eat),
    SellAtMarket(SellAtMarket),
    BuyFromMarket(BuyFromMarket),
    Wait(Wait),
}

impl TaskKind {
    fn initialize(
        &mut self,
        children: &mut VecDeque<Task>,
        ctx: &mut TaskContext<'_, '_>,
    ) -> Result<(), TaskError> {
        match self {
            TaskKind::MoveTo(t) => t.initialize(ctx),
            TaskKind::Produce(t) => t.initialize(children, ctx),
            TaskKind::SourceGoods(_)
            | TaskKind::Eat(_)
            | TaskKind::SellAtMarket(_)
            | TaskKind::BuyFromMarket(_)
            | TaskKind::Wait(_) => Ok(()),
        }
    }

    fn step(&mut self, children: &mut VecDeque<Task>, ctx: &mut TaskContext<'_, '_>) -> Step {
        match self {
            TaskKind::MoveTo(t) => t.step(ctx),
            TaskKind::SourceGoods(t) => t.step(children, ctx),
            TaskKind::Produce(t) => t.step(children, ctx),
            TaskKind::Eat(t) => t.step(ctx),
            TaskKind::SellAtMarket(t) => t.step(ctx),
            TaskKind::BuyFromMarket(t) => t.step(ctx),
            TaskKind::Wait(t) => t.step(ctx),
        }
    }

    /// Give back anything held in the world (building slots).
    fn release(&mut self, map: &mut WorldMap) {
        if let TaskKind::Produce(t) = self {
            t.release(map);
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TaskKind::MoveTo(t) => t.describe(),
            TaskKind::SourceGoods(t) => t.describe(),
            TaskKind::Produce(t) => t.describe(),
            TaskKind::Eat(t) => t.describe(),
            TaskKind::SellAtMarket(t) => t.describe(),
            TaskKind::BuyFromMarket(t) => t.describe(),
            TaskKind::Wait(t) => t.describe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub children: VecDeque<Task>,
    /// Queued on the owning agent when this task succeeds.
    pub on_success: Option<Box<Task>>,
    /// Queued on the owning agent when this task fails.
    pub on_failure: Option<Box<Task>>,
    pub initialized: bool,
    /// Ticks this task (or one of its children) has been executed.
    pub executions: u32,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            status: TaskStatus::default(),
            children: VecDeque::new(),
            on_success: None,
            on_failure: None,
            initialized: false,
            executions: 0,
        }
    }

    pub fn then(mut self, next: Task) -> Self {
        self.on_success = Some(Box::new(next));
        self
    }

    pub fn or_else(mut self, fallback: Task) -> Self {
        self.on_failure = Some(Box::new(fallback));
        self
    }

    pub fn is_complete(&self) -> bool {
        self.status.complete
    }

    pub fn describe(&self) -> String {
        match self.children.front() {
            Some(child) => format!("{} (waiting on: {})", self.kind.describe(), child.describe()),
            None => self.kind.describe(),
        }
    }

    /// Advance this task by one tick.
    pub fn execute(&mut self, ctx: &mut TaskContext<'_, '_>) -> TaskStatus {
        if self.status.complete {
            log::warn!("Execute called on finished task: {}", self.kind.describe());
            return self.status.clone();
        }
        self.executions += 1;

        if !self.initialized {
            self.initialized = true;
            if let Err(error) = self.kind.initialize(&mut self.children, ctx) {
                self.fail(ctx, error);
                return self.status.clone();
            }
        }

        if let Some(child) = self.children.front_mut() {
            let child_status = child.execute(ctx);
            if !child_status.complete {
                return self.status.clone();
            }
            if let Some(mut child) = self.children.pop_front() {
                let followup = if child_status.failed {
                    child.on_failure.take()
                } else {
                    child.on_success.take()
                };
                if let Some(next) = followup {
                    ctx.followups.push(*next);
                }
            }
            if child_status.failed {
                let error = child_status
                    .error
                    .unwrap_or_else(|| TaskError::Unsatisfiable("subtask failed".to_string()));
                self.fail(ctx, error);
                return self.status.clone();
            }
            if !self.children.is_empty() {
                return self.status.clone();
            }
        }

        match self.kind.step(&mut self.children, ctx) {
            Step::Pending => {}
            Step::Done(value) => self.succeed(ctx, value),
            Step::Fail(error) => self.fail(ctx, error),
        }
        self.status.clone()
    }

    fn succeed(&mut self, ctx: &mut TaskContext<'_, '_>, value: Option<Good>) {
        self.kind.release(ctx.map);
        log::debug!("{} finished: {}", ctx.agent.id, self.kind.describe());
        self.status = TaskStatus {
            complete: true,
            failed: false,
            value,
            error: None,
        };
    }

    fn fail(&mut self, ctx: &mut TaskContext<'_, '_>, error: TaskError) {
        self.kind.release(ctx.map);
        if let Some(child) = self.children.iter_mut().find(|c| c.initialized) {
            child.abandon(ctx.map);
        }
        log::debug!("{} failed {}: {}", ctx.agent.id, self.kind.describe(), error);
        ctx.events.push(EventType::TaskFailed {
            description: self.kind.describe(),
            reason: error.to_string(),
        });
        self.status = TaskStatus {
            complete: true,
            failed: true,
            value: None,
            error: Some(error),
        };
    }

    /// Drop the whole subtree, giving back any building slots it holds. Used when the
    /// owning agent leaves the simulation.
    pub fn abandon(&mut self, map: &mut WorldMap) {
        self.kind.release(map);
        for child in self.children.iter_mut() {
            child.abandon(map);
        }
    }
}

/// Everything a task may touch while it runs for one agent during one tick.
pub struct TaskContext<'a, 'l> {
    pub agent: &'a mut AgentState,
    /// Every other agent, reachable only through the market.
    pub others: &'a mut (dyn Ledger + 'l),
    pub map: &'a mut WorldMap,
    pub market: &'a mut Market,
    pub catalog: &'a Catalog,
    pub config: &'a SimConfig,
    pub rng: &'a mut StdRng,
    /// Seconds since the previous tick.
    pub dt: Decimal,
    /// Follow-up tasks to hand to the owning agent's queue.
    pub followups: Vec<Task>,
    pub events: Vec<EventType>,
}

impl TaskContext<'_, '_> {
    /// Run a market operation with a ledger that covers the acting agent as well as
    /// everybody else.
    pub fn trade<T>(&mut self, f: impl FnOnce(&mut Market, &mut dyn Ledger) -> T) -> T {
        let mut ledger = AgentLedger {
            acting: &mut *self.agent,
            others: &mut *self.others,
        };
        f(&mut *self.market, &mut ledger)
    }
}

/// Ledger over the acting agent plus the rest of the world.
pub struct AgentLedger<'a, 'l> {
    pub acting: &'a mut AgentState,
    pub others: &'a mut (dyn Ledger + 'l),
}

impl Ledger for AgentLedger<'_, '_> {
    fn money_mut(&mut self, agent: AgentId) -> Option<&mut Decimal> {
        if agent == self.acting.id {
            Some(&mut self.acting.money)
        } else {
            self.others.money_mut(agent)
        }
    }

    fn stockpile_mut(&mut self, agent: AgentId) -> Option<&mut Stockpile> {
        if agent == self.acting.id {
            Some(&mut self.acting.stockpile)
        } else {
            self.others.stockpile_mut(agent)
        }
    }
}

/// Per-agent queue: urgent tasks first, everything else in assignment order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskQueue {
    priority: VecDeque<Task>,
    fifo: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        self.fifo.push_back(task);
    }

    pub fn push_priority(&mut self, task: Task) {
        self.priority.push_back(task);
    }

    pub fn peek(&self) -> Option<&Task> {
        self.priority.front().or_else(|| self.fifo.front())
    }

    pub fn peek_mut(&mut self) -> Option<&mut Task> {
        if self.priority.is_empty() {
            self.fifo.front_mut()
        } else {
            self.priority.front_mut()
        }
    }

    pub fn dequeue(&mut self) -> Option<Task> {
        self.priority.pop_front().or_else(|| self.fifo.pop_front())
    }

    pub fn len(&self) -> usize {
        self.priority.len() + self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_empty() && self.fifo.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.priority.iter().chain(self.fifo.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.priority.iter_mut().chain(self.fifo.iter_mut())
    }

    pub fn contains_kind(&self, pred: impl Fn(&TaskKind) -> bool) -> bool {
        self.iter().any(|t| pred(&t.kind))
    }

    /// Execute the active task for one tick. A task that completes is dequeued and
    /// returned; it will not be executed again.
    pub fn advance(&mut self, ctx: &mut TaskContext<'_, '_>) -> Option<Task> {
        let task = self.peek_mut()?;
        let status = task.execute(ctx);
        if status.complete { self.dequeue() } else { None }
    }

    /// Remove every task, e.g. when the owner dies.
    pub fn drain(&mut self) -> Vec<Task> {
        self.priority.drain(..).chain(self.fifo.drain(..)).collect()
    }
}
