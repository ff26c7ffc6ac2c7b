pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod health;
pub mod metrics;
pub mod models;
pub mod store;
pub mod utils;
pub mod validation;
