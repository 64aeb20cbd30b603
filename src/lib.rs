//! Data and domain-state layer for a traffic-metered subscription bot.
//!
//! The bot binary wires a [`config::AppConfig`], a [`storage::Database`] and a
//! [`service::ServiceRegistry`] together; everything above (command dispatch,
//! webhook routing, message transport) lives outside this crate.

#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod service;
pub mod storage;

pub use error::{BotError, BotResult};
