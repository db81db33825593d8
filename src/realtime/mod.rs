/// In-process event broadcasting for live dashboards
///
/// Best-effort telemetry fan-out: events are pushed to per-organization
/// channels and delivered to whoever is subscribed at that moment. There is
/// no persistence or replay — a subscriber connecting after an event was
/// broadcast never sees it. Delivery must never affect core execution
/// correctness, so every failure path here is logged and swallowed.

use crate::workflow::storage::RunStats;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

/// Buffered events per channel before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 256;

/// Per-node status values carried on `node-status` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatusKind {
    Running,
    Success,
    Error,
}

/// Event taxonomy pushed to connected dashboard streams
///
/// Serializes as `{"type": "...", "data": {...}}` frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum RealtimeEvent {
    StatsUpdate(RunStats),
    NewRun {
        run_id: String,
        workflow_id: String,
    },
    RunComplete {
        run_id: String,
        workflow_id: String,
        status: crate::workflow::types::RunStatus,
    },
    WorkflowCreated {
        workflow_id: String,
    },
    WorkflowUpdated {
        workflow_id: String,
    },
    WorkflowDeleted {
        workflow_id: String,
    },
    Notification {
        message: String,
    },
    NodeStatus {
        run_id: String,
        node_id: String,
        status: NodeStatusKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    IntegrationMissing {
        channel: String,
    },
}

/// Publish/subscribe hub keyed by channel name (organization id)
///
/// Each subscriber holds an independent broadcast receiver; dropping the
/// receiver is the unsubscribe, and a dropped or lagging subscriber never
/// blocks delivery to the others. Broadcasts on one channel are delivered
/// in the order `broadcast` was called.
#[derive(Debug)]
pub struct EventBroadcaster {
    channels: RwLock<HashMap<String, broadcast::Sender<RealtimeEvent>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a channel, creating it on first use
    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<RealtimeEvent> {
        // Fast path: channel already exists.
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(channel) {
                return sender.subscribe();
            }
        }

        let mut channels = self.channels.write().await;
        // Double-check: another task may have created it meanwhile.
        if let Some(sender) = channels.get(channel) {
            return sender.subscribe();
        }
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(channel.to_string(), sender);
        receiver
    }

    /// Broadcast an event to all current subscribers of a channel
    ///
    /// A channel nobody ever subscribed to, or one whose subscribers have
    /// all disconnected, drops the event silently — this is live telemetry,
    /// not a durable log.
    pub async fn broadcast(&self, channel: &str, event: RealtimeEvent) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(channel) {
            match sender.send(event) {
                Ok(delivered) => {
                    tracing::debug!("📡 Broadcast on '{}' reached {} subscribers", channel, delivered)
                }
                Err(_) => {
                    tracing::debug!("📡 Broadcast on '{}' had no subscribers, dropped", channel)
                }
            }
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
