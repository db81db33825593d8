/// Workflow management layer
///
/// Handles workflow definitions, the durable store, and the hot-reload
/// registry of compiled workflows.

pub mod registry;
pub mod storage;
pub mod types;

pub use registry::{CompiledWorkflow, WorkflowRegistry};
pub use storage::EngineStorage;
pub use types::{
    Edge, Node, NodeExecutionContext, NodeResult, NodeType, RunStatus, ScheduleStatus,
    ScheduledWorkflow, Workflow, WorkflowRun,
};
