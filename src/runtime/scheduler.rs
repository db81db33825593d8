/// Scheduler loop for deferred workflow execution
///
/// A recurring sweep polls the store for due PENDING schedules and hands
/// each to the workflow executor exactly once. The claim-then-execute
/// ordering (an atomic conditional PENDING → EXECUTING update in the store)
/// is what prevents two sweep cycles, or two process instances sharing the
/// store, from double-running the same schedule.

use crate::runtime::executor::WorkflowExecutor;
use crate::workflow::storage::EngineStorage;
use crate::workflow::types::ScheduleStatus;
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Sweep cadence: every 30 seconds
const SWEEP_SCHEDULE: &str = "*/30 * * * * *";

/// Upper bound on schedules processed per sweep, capping sweep cost; the
/// next sweep picks up whatever remains
pub const SWEEP_BATCH_SIZE: i64 = 10;

/// Summary returned by one sweep pass
#[derive(Debug, Serialize)]
pub struct SweepSummary {
    pub processed: usize,
    pub results: Vec<SweepEntry>,
}

/// Outcome of one schedule entry within a sweep
#[derive(Debug, Serialize)]
pub struct SweepEntry {
    pub schedule_id: String,
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub status: ScheduleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Background scheduler service
///
/// One logical instance per process, constructed and injected by the host
/// rather than materialized as an import-time singleton. `start`/`stop` are
/// idempotent; `stop` only prevents new sweeps and never aborts executions
/// already in flight.
pub struct SchedulerService {
    scheduler: RwLock<JobScheduler>,
    sweep_job_id: RwLock<Option<Uuid>>,
    running: AtomicBool,
    /// The underlying ticker is started once and left running; start/stop
    /// only add and remove the sweep job.
    ticker_started: AtomicBool,
    executor: Arc<WorkflowExecutor>,
    storage: EngineStorage,
}

impl SchedulerService {
    pub async fn new(executor: Arc<WorkflowExecutor>, storage: EngineStorage) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: RwLock::new(scheduler),
            sweep_job_id: RwLock::new(None),
            running: AtomicBool::new(false),
            ticker_started: AtomicBool::new(false),
            executor,
            storage,
        })
    }

    /// Start the recurring sweep; a second start is a logged no-op
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("⏰ Scheduler already running, start ignored");
            return Ok(());
        }

        tracing::info!("⏰ Starting scheduler sweep every 30s");

        let service = Arc::clone(self);
        let job = Job::new_async(SWEEP_SCHEDULE, move |_uuid, _lock| {
            let service = Arc::clone(&service);
            Box::pin(async move {
                match service.sweep().await {
                    Ok(summary) if summary.processed > 0 => {
                        tracing::info!("🧹 Sweep processed {} schedules", summary.processed)
                    }
                    Ok(_) => tracing::debug!("🧹 Sweep found nothing due"),
                    Err(e) => tracing::error!("❌ Sweep failed: {}", e),
                }
            })
        })?;

        let job_id = {
            let scheduler = self.scheduler.read().await;
            scheduler.add(job).await?
        };
        *self.sweep_job_id.write().await = Some(job_id);

        if !self.ticker_started.swap(true, Ordering::SeqCst) {
            let scheduler = self.scheduler.read().await;
            scheduler.start().await?;
        }

        tracing::info!("✅ Scheduler started");
        Ok(())
    }

    /// Stop future sweeps; a second stop is a logged no-op
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("⏰ Scheduler not running, stop ignored");
            return Ok(());
        }

        if let Some(job_id) = self.sweep_job_id.write().await.take() {
            let scheduler = self.scheduler.read().await;
            scheduler.remove(&job_id).await?;
        }

        tracing::info!("⏹️ Scheduler stopped (in-flight executions unaffected)");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One due-schedule sweep pass
    ///
    /// Also callable directly through the HTTP sweep entrypoint, so an
    /// external cron can drive the scheduler where the process itself is
    /// short-lived. Errors are isolated per schedule entry: one failing
    /// execution transitions only that entry to FAILED and the sweep keeps
    /// going. FAILED schedules are never retried automatically.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        let due = self.storage.due_schedules(Utc::now(), SWEEP_BATCH_SIZE).await?;
        let mut results = Vec::new();

        for schedule in due {
            // Claim before executing. Losing the claim means another sweep
            // already owns the entry; skip it silently.
            if !self.storage.claim_schedule(&schedule.id).await? {
                tracing::debug!("⏭️ Schedule {} already claimed, skipping", schedule.id);
                continue;
            }

            tracing::info!(
                "🔔 Executing schedule {} (workflow {})",
                schedule.id,
                schedule.workflow_id
            );

            match self
                .executor
                .execute(
                    &schedule.workflow_id,
                    &schedule.organization_id,
                    schedule.payload.clone(),
                    None,
                )
                .await
            {
                Ok(run_id) => {
                    if let Err(e) = self.storage.mark_schedule_executed(&schedule.id, &run_id).await
                    {
                        tracing::error!("❌ Failed to mark schedule {} executed: {}", schedule.id, e);
                    }
                    results.push(SweepEntry {
                        schedule_id: schedule.id.clone(),
                        workflow_id: schedule.workflow_id.clone(),
                        run_id: Some(run_id),
                        status: ScheduleStatus::Executed,
                        error: None,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    if let Err(e) = self.storage.mark_schedule_failed(&schedule.id, &message).await {
                        tracing::error!("❌ Failed to mark schedule {} failed: {}", schedule.id, e);
                    }
                    tracing::warn!("❌ Schedule {} failed: {}", schedule.id, message);
                    results.push(SweepEntry {
                        schedule_id: schedule.id.clone(),
                        workflow_id: schedule.workflow_id.clone(),
                        run_id: None,
                        status: ScheduleStatus::Failed,
                        error: Some(message),
                    });
                }
            }
        }

        Ok(SweepSummary {
            processed: results.len(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::EventBroadcaster;
    use crate::runtime::handlers::HandlerRegistry;
    use crate::workflow::registry::WorkflowRegistry;
    use crate::workflow::types::{Edge, Node, NodeType, RunStatus, ScheduledWorkflow, Workflow};
    use chrono::Duration;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn service() -> (EngineStorage, Arc<WorkflowRegistry>, Arc<SchedulerService>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let storage = EngineStorage::new(pool);
        storage.init_schema().await.expect("schema");

        let registry = Arc::new(WorkflowRegistry::new(storage.clone()));
        let broadcaster = Arc::new(EventBroadcaster::new());
        let handlers = Arc::new(HandlerRegistry::with_builtins(Arc::clone(&broadcaster)));
        let executor = Arc::new(WorkflowExecutor::new(
            Arc::clone(&registry),
            handlers,
            storage.clone(),
            broadcaster,
        ));
        let scheduler = Arc::new(
            SchedulerService::new(executor, storage.clone())
                .await
                .expect("scheduler"),
        );
        (storage, registry, scheduler)
    }

    async fn install_delay_workflow(
        storage: &EngineStorage,
        registry: &WorkflowRegistry,
        id: &str,
        enabled: bool,
    ) {
        let workflow = Workflow {
            id: id.into(),
            organization_id: "org-a".into(),
            name: format!("workflow {id}"),
            enabled,
            nodes: vec![Node {
                id: "only".into(),
                node_type: NodeType::Delay,
                params: json!({ "duration_ms": 0 }),
            }],
            edges: Vec::<Edge>::new(),
        };
        storage.save_workflow(&workflow).await.unwrap();
        registry.reload_workflow(id).await.unwrap();
    }

    fn schedule(id: &str, workflow_id: &str, offset_secs: i64) -> ScheduledWorkflow {
        ScheduledWorkflow {
            id: id.into(),
            workflow_id: workflow_id.into(),
            organization_id: "org-a".into(),
            scheduled_at: Utc::now() + Duration::seconds(offset_secs),
            payload: None,
            status: ScheduleStatus::Pending,
            executed_at: None,
            run_id: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sweep_before_due_processes_nothing() {
        let (storage, registry, scheduler) = service().await;
        install_delay_workflow(&storage, &registry, "wf-1", true).await;
        storage.insert_schedule(&schedule("s-future", "wf-1", 60)).await.unwrap();

        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.processed, 0);

        let entry = storage.get_schedule("org-a", "s-future").await.unwrap().unwrap();
        assert_eq!(entry.status, ScheduleStatus::Pending);
    }

    #[tokio::test]
    async fn due_schedule_is_executed_exactly_once_with_a_run_id() {
        let (storage, registry, scheduler) = service().await;
        install_delay_workflow(&storage, &registry, "wf-1", true).await;
        storage.insert_schedule(&schedule("s-due", "wf-1", -1)).await.unwrap();

        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.results[0].status, ScheduleStatus::Executed);
        let run_id = summary.results[0].run_id.clone().unwrap();

        let entry = storage.get_schedule("org-a", "s-due").await.unwrap().unwrap();
        assert_eq!(entry.status, ScheduleStatus::Executed);
        assert_eq!(entry.run_id.as_deref(), Some(run_id.as_str()));
        assert!(entry.executed_at.is_some());

        let run = storage.get_run("org-a", &run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);

        // A second sweep finds nothing: the entry is terminal.
        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn concurrent_sweeps_yield_exactly_one_execution() {
        let (storage, registry, scheduler) = service().await;
        install_delay_workflow(&storage, &registry, "wf-1", true).await;
        storage.insert_schedule(&schedule("s-race", "wf-1", -1)).await.unwrap();

        let (first, second) = tokio::join!(scheduler.sweep(), scheduler.sweep());
        let total = first.unwrap().processed + second.unwrap().processed;
        assert_eq!(total, 1);

        let runs = storage.list_runs("org-a", "wf-1").await.unwrap();
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn executor_failure_fails_only_that_schedule_and_is_not_retried() {
        let (storage, registry, scheduler) = service().await;
        install_delay_workflow(&storage, &registry, "wf-on", true).await;
        install_delay_workflow(&storage, &registry, "wf-off", false).await;
        storage.insert_schedule(&schedule("s-bad", "wf-off", -10)).await.unwrap();
        storage.insert_schedule(&schedule("s-good", "wf-on", -5)).await.unwrap();

        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.processed, 2);

        let bad = storage.get_schedule("org-a", "s-bad").await.unwrap().unwrap();
        assert_eq!(bad.status, ScheduleStatus::Failed);
        assert!(bad.error_message.unwrap().contains("disabled"));

        let good = storage.get_schedule("org-a", "s-good").await.unwrap().unwrap();
        assert_eq!(good.status, ScheduleStatus::Executed);

        // FAILED entries are never swept again.
        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (_storage, _registry, scheduler) = service().await;

        assert!(!scheduler.is_running());
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        // Second start is a no-op.
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());
        // Second stop is a no-op.
        scheduler.stop().await.unwrap();

        // The service can be started again after a stop.
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        scheduler.stop().await.unwrap();
    }
}
