//! Core types shared by the engine, loader and orchestrator.

pub mod audit;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;
