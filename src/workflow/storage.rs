/// SQLite persistence layer — the engine's durable store
///
/// Holds the four engine entities (workflows, runs, node results, scheduled
/// workflows) in one database. Workflow definitions are stored as JSON for
/// flexibility while keeping indexed lookup columns; the scheduled-workflow
/// claim is a single conditional UPDATE so concurrent sweeps cannot both
/// take the same entry.

use crate::workflow::types::{
    format_timestamp, parse_timestamp, NodeResult, RunStatus, ScheduleStatus, ScheduledWorkflow,
    Workflow, WorkflowRun,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;

/// SQLite-backed store for all engine entities
#[derive(Debug, Clone)]
pub struct EngineStorage {
    pool: SqlitePool,
}

/// Basic workflow metadata for listing operations
#[derive(Debug, serde::Serialize)]
pub struct WorkflowMetadata {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregate run counters for one organization, pushed on `stats-update`
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunStats {
    pub total_runs: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub running: i64,
}

impl EngineStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the engine schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_runs (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                organization_id TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_results (
                run_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                node_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                output JSON,
                error TEXT,
                duration_ms INTEGER NOT NULL,
                PRIMARY KEY (run_id, position)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_workflows (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                organization_id TEXT NOT NULL,
                scheduled_at TEXT NOT NULL,
                payload JSON,
                status TEXT NOT NULL,
                executed_at TEXT,
                run_id TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_org ON workflows(organization_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_workflow ON workflow_runs(workflow_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_schedules_due ON scheduled_workflows(status, scheduled_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    /// Store a new workflow or update an existing one
    ///
    /// Uses UPSERT to handle both create and update atomically and bumps
    /// the updated_at timestamp.
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, organization_id, name, enabled, definition, updated_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                organization_id = excluded.organization_id,
                name = excluded.name,
                enabled = excluded.enabled,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.organization_id)
        .bind(&workflow.name)
        .bind(workflow.enabled)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a workflow by ID
    pub async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                let workflow: Workflow = serde_json::from_str(&definition_json)?;
                Ok(Some(workflow))
            }
            None => Ok(None),
        }
    }

    /// List workflows owned by one organization
    pub async fn list_workflows(&self, organization_id: &str) -> Result<Vec<WorkflowMetadata>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, enabled, created_at, updated_at FROM workflows
            WHERE organization_id = ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        let mut workflows = Vec::new();
        for row in rows {
            workflows.push(WorkflowMetadata {
                id: row.get("id"),
                name: row.get("name"),
                enabled: row.get("enabled"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(workflows)
    }

    /// Load all workflows for registry initialization
    pub async fn load_all_workflows(&self) -> Result<HashMap<String, Workflow>> {
        let rows = sqlx::query("SELECT id, definition FROM workflows")
            .fetch_all(&self.pool)
            .await?;

        let mut workflows = HashMap::new();
        for row in rows {
            let id: String = row.get("id");
            let definition_json: String = row.get("definition");
            let workflow: Workflow = serde_json::from_str(&definition_json)?;
            workflows.insert(id, workflow);
        }

        Ok(workflows)
    }

    /// Delete a workflow by ID, scoped to its organization
    ///
    /// Historical runs keep referencing the deleted workflow id; runs are
    /// append-only history and are never removed here.
    pub async fn delete_workflow(&self, organization_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ? AND organization_id = ?")
            .bind(id)
            .bind(organization_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Runs and node results
    // ------------------------------------------------------------------

    pub async fn create_run(&self, run: &WorkflowRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_runs (id, workflow_id, organization_id, status, started_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.workflow_id)
        .bind(&run.organization_id)
        .bind(run.status.as_str())
        .bind(format_timestamp(run.started_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Move a run to its terminal status
    ///
    /// Sets finished_at; runs are never re-opened afterwards.
    pub async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE workflow_runs SET status = ?, finished_at = ?, error = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(format_timestamp(Utc::now()))
        .bind(error)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append one node result to a run's ordered history
    pub async fn append_node_result(
        &self,
        run_id: &str,
        position: usize,
        result: &NodeResult,
    ) -> Result<()> {
        let output_json = match &result.output {
            Some(output) => Some(serde_json::to_string(output)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO node_results (run_id, position, node_id, success, output, error, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(position as i64)
        .bind(&result.node_id)
        .bind(result.success)
        .bind(output_json)
        .bind(&result.error)
        .bind(result.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_run(&self, organization_id: &str, run_id: &str) -> Result<Option<WorkflowRun>> {
        let row = sqlx::query(
            "SELECT * FROM workflow_runs WHERE id = ? AND organization_id = ?",
        )
        .bind(run_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| run_from_row(&row)).transpose()
    }

    pub async fn get_node_results(&self, run_id: &str) -> Result<Vec<NodeResult>> {
        let rows = sqlx::query(
            "SELECT node_id, success, output, error, duration_ms FROM node_results WHERE run_id = ? ORDER BY position ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::new();
        for row in rows {
            let output_json: Option<String> = row.get("output");
            let output = match output_json {
                Some(json) => Some(serde_json::from_str::<Value>(&json)?),
                None => None,
            };
            results.push(NodeResult {
                node_id: row.get("node_id"),
                success: row.get("success"),
                output,
                error: row.get("error"),
                duration_ms: row.get("duration_ms"),
            });
        }

        Ok(results)
    }

    pub async fn list_runs(
        &self,
        organization_id: &str,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowRun>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflow_runs
            WHERE workflow_id = ? AND organization_id = ?
            ORDER BY started_at DESC
            "#,
        )
        .bind(workflow_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }

    /// Aggregate run counters for one organization
    pub async fn run_stats(&self, organization_id: &str) -> Result<RunStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_runs,
                COALESCE(SUM(status = 'SUCCESS'), 0) AS succeeded,
                COALESCE(SUM(status = 'FAILED'), 0) AS failed,
                COALESCE(SUM(status = 'RUNNING'), 0) AS running
            FROM workflow_runs WHERE organization_id = ?
            "#,
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RunStats {
            total_runs: row.get("total_runs"),
            succeeded: row.get("succeeded"),
            failed: row.get("failed"),
            running: row.get("running"),
        })
    }

    // ------------------------------------------------------------------
    // Scheduled workflows
    // ------------------------------------------------------------------

    pub async fn insert_schedule(&self, schedule: &ScheduledWorkflow) -> Result<()> {
        let payload_json = match &schedule.payload {
            Some(payload) => Some(serde_json::to_string(payload)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO scheduled_workflows
                (id, workflow_id, organization_id, scheduled_at, payload, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&schedule.id)
        .bind(&schedule.workflow_id)
        .bind(&schedule.organization_id)
        .bind(format_timestamp(schedule.scheduled_at))
        .bind(payload_json)
        .bind(schedule.status.as_str())
        .bind(format_timestamp(schedule.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_schedule(
        &self,
        organization_id: &str,
        id: &str,
    ) -> Result<Option<ScheduledWorkflow>> {
        let row = sqlx::query(
            "SELECT * FROM scheduled_workflows WHERE id = ? AND organization_id = ?",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| schedule_from_row(&row)).transpose()
    }

    pub async fn list_schedules(&self, organization_id: &str) -> Result<Vec<ScheduledWorkflow>> {
        let rows = sqlx::query(
            "SELECT * FROM scheduled_workflows WHERE organization_id = ? ORDER BY scheduled_at ASC",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(schedule_from_row).collect()
    }

    /// Fetch due PENDING schedules across all organizations, bounded batch
    ///
    /// Ordered by scheduled_at so the oldest entries go first when a sweep
    /// cannot drain the backlog in one pass.
    pub async fn due_schedules(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledWorkflow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM scheduled_workflows
            WHERE status = 'PENDING' AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            LIMIT ?
            "#,
        )
        .bind(format_timestamp(now))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(schedule_from_row).collect()
    }

    /// Claim a schedule for execution: atomic PENDING → EXECUTING
    ///
    /// The conditional UPDATE is the compare-and-swap that prevents two sweep
    /// cycles (or two process instances) from double-running the same entry.
    /// Returns false when another caller already claimed it.
    pub async fn claim_schedule(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_workflows SET status = ? WHERE id = ? AND status = ?",
        )
        .bind(ScheduleStatus::Executing.as_str())
        .bind(id)
        .bind(ScheduleStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_schedule_executed(&self, id: &str, run_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_workflows SET status = ?, executed_at = ?, run_id = ? WHERE id = ?",
        )
        .bind(ScheduleStatus::Executed.as_str())
        .bind(format_timestamp(Utc::now()))
        .bind(run_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_schedule_failed(&self, id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_workflows SET status = ?, executed_at = ?, error_message = ? WHERE id = ?",
        )
        .bind(ScheduleStatus::Failed.as_str())
        .bind(format_timestamp(Utc::now()))
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cancel a schedule: conditional PENDING → CANCELLED
    ///
    /// Returns false when the schedule is not in PENDING (claimed, terminal,
    /// or already cancelled) or belongs to another organization.
    pub async fn cancel_schedule(&self, organization_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_workflows SET status = ? WHERE id = ? AND organization_id = ? AND status = ?",
        )
        .bind(ScheduleStatus::Cancelled.as_str())
        .bind(id)
        .bind(organization_id)
        .bind(ScheduleStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn run_from_row(row: &SqliteRow) -> Result<WorkflowRun> {
    let status_raw: String = row.get("status");
    let status = RunStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("unknown run status in store: {}", status_raw))?;
    let started_at_raw: String = row.get("started_at");
    let finished_at_raw: Option<String> = row.get("finished_at");

    Ok(WorkflowRun {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        organization_id: row.get("organization_id"),
        status,
        started_at: parse_timestamp(&started_at_raw)?,
        finished_at: finished_at_raw.as_deref().map(parse_timestamp).transpose()?,
        error: row.get("error"),
    })
}

fn schedule_from_row(row: &SqliteRow) -> Result<ScheduledWorkflow> {
    let status_raw: String = row.get("status");
    let status = ScheduleStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("unknown schedule status in store: {}", status_raw))?;
    let scheduled_at_raw: String = row.get("scheduled_at");
    let executed_at_raw: Option<String> = row.get("executed_at");
    let created_at_raw: String = row.get("created_at");
    let payload_json: Option<String> = row.get("payload");
    let payload = match payload_json {
        Some(json) => Some(serde_json::from_str::<Value>(&json)?),
        None => None,
    };

    Ok(ScheduledWorkflow {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        organization_id: row.get("organization_id"),
        scheduled_at: parse_timestamp(&scheduled_at_raw)?,
        payload,
        status,
        executed_at: executed_at_raw.as_deref().map(parse_timestamp).transpose()?,
        run_id: row.get("run_id"),
        error_message: row.get("error_message"),
        created_at: parse_timestamp(&created_at_raw)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Edge, Node, NodeType};
    use chrono::Duration;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_storage() -> EngineStorage {
        // A single connection keeps every statement on the same in-memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let storage = EngineStorage::new(pool);
        storage.init_schema().await.expect("schema");
        storage
    }

    fn sample_workflow(id: &str, org: &str) -> Workflow {
        Workflow {
            id: id.into(),
            organization_id: org.into(),
            name: format!("workflow {id}"),
            enabled: true,
            nodes: vec![Node {
                id: "n1".into(),
                node_type: NodeType::Delay,
                params: json!({ "duration_ms": 0 }),
            }],
            edges: Vec::<Edge>::new(),
        }
    }

    fn sample_schedule(id: &str, workflow_id: &str, org: &str, offset_secs: i64) -> ScheduledWorkflow {
        ScheduledWorkflow {
            id: id.into(),
            workflow_id: workflow_id.into(),
            organization_id: org.into(),
            scheduled_at: Utc::now() + Duration::seconds(offset_secs),
            payload: Some(json!({ "ok": true })),
            status: ScheduleStatus::Pending,
            executed_at: None,
            run_id: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn workflow_upsert_and_org_scoped_listing() {
        let storage = memory_storage().await;
        storage.save_workflow(&sample_workflow("wf-1", "org-a")).await.unwrap();
        storage.save_workflow(&sample_workflow("wf-2", "org-b")).await.unwrap();

        let mut updated = sample_workflow("wf-1", "org-a");
        updated.name = "renamed".into();
        storage.save_workflow(&updated).await.unwrap();

        let listed = storage.list_workflows("org-a").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "renamed");

        let fetched = storage.get_workflow("wf-1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "renamed");

        // Deleting with the wrong organization is a no-op.
        assert!(!storage.delete_workflow("org-b", "wf-1").await.unwrap());
        assert!(storage.delete_workflow("org-a", "wf-1").await.unwrap());
        assert!(storage.get_workflow("wf-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_lifecycle_and_node_results() {
        let storage = memory_storage().await;
        let run = WorkflowRun {
            id: "run-1".into(),
            workflow_id: "wf-1".into(),
            organization_id: "org-a".into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        storage.create_run(&run).await.unwrap();

        storage
            .append_node_result(
                "run-1",
                0,
                &NodeResult {
                    node_id: "n1".into(),
                    success: true,
                    output: Some(json!({ "decision": true })),
                    error: None,
                    duration_ms: 3,
                },
            )
            .await
            .unwrap();
        storage
            .append_node_result(
                "run-1",
                1,
                &NodeResult {
                    node_id: "n2".into(),
                    success: false,
                    output: None,
                    error: Some("boom".into()),
                    duration_ms: 1,
                },
            )
            .await
            .unwrap();

        storage.finish_run("run-1", RunStatus::Failed, None).await.unwrap();

        let fetched = storage.get_run("org-a", "run-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Failed);
        assert!(fetched.finished_at.is_some());

        // Cross-organization reads come back empty.
        assert!(storage.get_run("org-b", "run-1").await.unwrap().is_none());

        let results = storage.get_node_results("run-1").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node_id, "n1");
        assert_eq!(results[1].error.as_deref(), Some("boom"));

        let stats = storage.run_stats("org-a").await.unwrap();
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn claim_is_a_single_winner_compare_and_swap() {
        let storage = memory_storage().await;
        storage.insert_schedule(&sample_schedule("s-1", "wf-1", "org-a", -5)).await.unwrap();

        assert!(storage.claim_schedule("s-1").await.unwrap());
        // Second claim loses: the row is no longer PENDING.
        assert!(!storage.claim_schedule("s-1").await.unwrap());

        let schedule = storage.get_schedule("org-a", "s-1").await.unwrap().unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Executing);
    }

    #[tokio::test]
    async fn due_fetch_respects_time_status_and_batch_bound() {
        let storage = memory_storage().await;
        storage.insert_schedule(&sample_schedule("past-1", "wf", "org-a", -60)).await.unwrap();
        storage.insert_schedule(&sample_schedule("past-2", "wf", "org-a", -30)).await.unwrap();
        storage.insert_schedule(&sample_schedule("future", "wf", "org-a", 3600)).await.unwrap();

        let due = storage.due_schedules(Utc::now(), 10).await.unwrap();
        assert_eq!(due.len(), 2);
        // Oldest first.
        assert_eq!(due[0].id, "past-1");

        let bounded = storage.due_schedules(Utc::now(), 1).await.unwrap();
        assert_eq!(bounded.len(), 1);

        // Claimed entries drop out of the due set.
        assert!(storage.claim_schedule("past-1").await.unwrap());
        let remaining = storage.due_schedules(Utc::now(), 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "past-2");
    }

    #[tokio::test]
    async fn cancel_is_only_reachable_from_pending() {
        let storage = memory_storage().await;
        storage.insert_schedule(&sample_schedule("s-1", "wf", "org-a", 3600)).await.unwrap();

        assert!(storage.cancel_schedule("org-a", "s-1").await.unwrap());
        // Already cancelled.
        assert!(!storage.cancel_schedule("org-a", "s-1").await.unwrap());

        storage.insert_schedule(&sample_schedule("s-2", "wf", "org-a", 3600)).await.unwrap();
        assert!(storage.claim_schedule("s-2").await.unwrap());
        // Claimed entries can no longer be cancelled.
        assert!(!storage.cancel_schedule("org-a", "s-2").await.unwrap());

        storage.insert_schedule(&sample_schedule("s-3", "wf", "org-b", 3600)).await.unwrap();
        // Wrong organization.
        assert!(!storage.cancel_schedule("org-a", "s-3").await.unwrap());
    }

    #[tokio::test]
    async fn terminal_schedule_transitions_record_outcome() {
        let storage = memory_storage().await;
        storage.insert_schedule(&sample_schedule("s-ok", "wf", "org-a", -5)).await.unwrap();
        storage.insert_schedule(&sample_schedule("s-bad", "wf", "org-a", -5)).await.unwrap();

        storage.claim_schedule("s-ok").await.unwrap();
        storage.mark_schedule_executed("s-ok", "run-42").await.unwrap();
        let executed = storage.get_schedule("org-a", "s-ok").await.unwrap().unwrap();
        assert_eq!(executed.status, ScheduleStatus::Executed);
        assert_eq!(executed.run_id.as_deref(), Some("run-42"));
        assert!(executed.executed_at.is_some());

        storage.claim_schedule("s-bad").await.unwrap();
        storage.mark_schedule_failed("s-bad", "workflow is disabled").await.unwrap();
        let failed = storage.get_schedule("org-a", "s-bad").await.unwrap().unwrap();
        assert_eq!(failed.status, ScheduleStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("workflow is disabled"));
    }
}
