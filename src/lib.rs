pub mod agent;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod events;
pub mod goods;
pub mod locator;
pub mod map;
pub mod market;
pub mod scenario;
pub mod stockpile;
pub mod task;
pub mod task_kinds;
pub mod types;
pub mod world;

#[cfg(test)]
mod scenario_test;
#[cfg(test)]
mod task_test;
