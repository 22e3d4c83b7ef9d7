//! Validation utilities.
//!
//! Policy documents and tool parameters are both checked here before the
//! engine or a tool handler ever sees them.

pub mod contract_validator;
pub mod policy_validator;
