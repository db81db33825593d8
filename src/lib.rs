/// Pulseflow: workflow execution and scheduling engine
///
/// Organization-scoped workflow definitions compiled into an in-memory
/// registry, executed as bounded graph walks with per-node error
/// containment, scheduled for deferred execution by a sweeping claim loop,
/// and observable over a live event stream.

// Core configuration and setup
pub mod config;

// Workflow management layer - definitions, storage, and hot-reload registry
pub mod workflow;

// Runtime execution engine - node handlers, graph walking, scheduling
pub mod runtime;

// Live event broadcasting for connected dashboards
pub mod realtime;

// HTTP API layer - REST endpoints and the SSE stream
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use realtime::{EventBroadcaster, RealtimeEvent};
pub use runtime::{SchedulerService, WorkflowExecutor};
pub use server::start_server;
pub use workflow::{Edge, Node, NodeType, Workflow};
