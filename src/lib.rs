pub mod backend;
pub mod commands;
pub mod config;
pub mod context;
pub mod device;
pub mod mqtt;
pub mod orchestrator;
pub mod persistence;
pub mod platform;
