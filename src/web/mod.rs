//! Web API for driving the fleet remotely.

pub mod api;
pub mod models;
