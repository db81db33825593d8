/// Execution runtime: node handlers, graph walking, run orchestration and
/// the deferred-execution scheduler
pub mod executor;
pub mod handlers;
pub mod scheduler;
pub mod walker;

pub use executor::{WorkflowExecutor, MAX_NODE_EXECUTIONS};
pub use handlers::{HandlerRegistry, NodeHandler};
pub use scheduler::{SchedulerService, SweepEntry, SweepSummary};
pub use walker::GraphWalker;
