//! station_sim: core library for the simulated radio station.
//!
//! Catalog loading, rule compilation, daily playlist generation and window
//! extraction live here. The `stationsim` CLI and any player consume this crate.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod draw_pool;
pub mod engine;
pub mod error;
pub mod loader;
pub mod locator;
pub mod playlist;
pub mod resolver;
pub mod rules;
pub mod time;
pub mod window;

pub use engine::StationEngine;
pub use error::{Result, SimError};
