pub mod config;
pub mod control;
pub mod coordinator;
pub mod registry;
pub mod reports;
pub mod state;
pub mod web;
