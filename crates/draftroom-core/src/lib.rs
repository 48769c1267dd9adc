// Library root: re-exports all modules so the console binary and integration
// tests can reach the engine's public API.

pub mod config;
pub mod db;
pub mod draft;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod players;
pub mod timer;
