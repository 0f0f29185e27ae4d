//! Request orchestration over task graphs.

mod orchestrator;

pub use orchestrator::{OrchestratorEvent, RequestOrchestrator, ToolPlan};
