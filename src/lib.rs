// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! tool-warden: a policy-governed tool dispatcher.
//!
//! This library executes named tools on behalf of a calling agent. Every
//! invocation is validated against the tool's input contract and checked
//! against an effective policy merged from one or more rule-set files before
//! the tool runs.

pub mod config;
pub mod engine;
pub mod engine_core;
pub mod loader;
pub mod orchestrator;
pub mod utils;

pub use config::Config;
pub use engine_core::errors::{ExecuteError, PolicyError, ToolFailure, ValidationError};
pub use engine_core::models::{ExecuteRequest, Policy, Rule};
pub use engine_core::traits::{ContextFactory, Tool};
pub use loader::{merge, PolicyLoader};
pub use orchestrator::{Execution, Orchestrator, ToolContext, ToolRegistry};
