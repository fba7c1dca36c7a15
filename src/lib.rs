pub mod adapter;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod labels;
pub mod logging;
pub mod provider;
pub mod resolver;
pub mod tags;
