pub mod config;
pub mod context;
pub mod core;
pub mod db;
pub mod events;
pub mod hooks;
pub mod logging;
pub mod session;
pub mod simulation;
