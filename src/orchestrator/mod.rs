//! Policy-governed execution pipeline and its collaborators.

pub mod context;
pub mod hints;
pub mod pipeline;
pub mod registry;

pub use context::{DefaultContextFactory, ToolContext};
pub use hints::{ChainHint, ChainHints};
pub use pipeline::{Execution, Orchestrator, OrchestratorBuilder};
pub use registry::{FnTool, ToolRegistry};
