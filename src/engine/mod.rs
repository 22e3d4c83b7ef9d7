//! Policy engine.
//!
//! This module contains the logic for evaluating conditions, named predicates
//! and whole policies against tool invocations.

pub mod evaluator;
pub mod matcher;
pub mod predicates;
