/// SQLite persistence layer for workflow definitions
///
/// Handles workflow CRUD in SQLite. Definitions are stored as JSON for
/// flexibility while keeping the name column indexed for lookups. Only
/// definitions are persisted; run-time engine state lives in the state store.

use crate::workflow::types::Workflow;
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;

/// SQLite-based workflow definition storage
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the workflow storage schema.
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                name TEXT PRIMARY KEY,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new workflow or update an existing one (UPSERT by name).
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (name, definition, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(name) DO UPDATE SET
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.name)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve a workflow definition by name.
    pub async fn get_workflow(&self, name: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE name = ?")
            .bind(name)
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

    /// List workflow names with timestamps for the management API.
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowMetadata>> {
        let rows = sqlx::query(
            "SELECT name, created_at, updated_at FROM workflows ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut workflows = Vec::new();
        for row in rows {
            workflows.push(WorkflowMetadata {
                name: row.get("name"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(workflows)
    }

    /// Load all workflows for registry initialization.
    pub async fn load_all_workflows(&self) -> Result<HashMap<String, Workflow>> {
        let rows = sqlx::query("SELECT name, definition FROM workflows")
            .fetch_all(&self.pool)
            .await?;

        let mut workflows = HashMap::new();
        for row in rows {
            let name: String = row.get("name");
            let definition_json: String = row.get("definition");
            let workflow: Workflow = serde_json::from_str(&definition_json)?;
            workflows.insert(name, workflow);
        }

        Ok(workflows)
    }

    /// Delete a workflow by name; returns whether anything was removed.
    pub async fn delete_workflow(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Basic workflow metadata for listing operations
#[derive(Debug, serde::Serialize)]
pub struct WorkflowMetadata {
    pub name: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::Step;

    async fn memory_storage() -> WorkflowStorage {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let storage = WorkflowStorage::new(pool);
        storage.init_schema().await.unwrap();
        storage
    }

    fn sample_workflow(name: &str) -> Workflow {
        Workflow {
            name: name.to_string(),
            description: "test".to_string(),
            steps: vec![Step {
                number: 1,
                step_id: "only".to_string(),
                callout_url: Some("http://svc/one".to_string()),
                method: Default::default(),
                callout_timeout_secs: 10,
                sub_steps: Vec::new(),
                retry: None,
                callback: None,
                webhook: None,
                scale_group: None,
                stop_on_action_failed: false,
                stop_on_webhook_failed: false,
                forward_response_data: false,
            }],
        }
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let storage = memory_storage().await;
        storage.save_workflow(&sample_workflow("wf-a")).await.unwrap();

        let loaded = storage.get_workflow("wf-a").await.unwrap().unwrap();
        assert_eq!(loaded.name, "wf-a");
        assert_eq!(loaded.steps.len(), 1);
        assert!(storage.get_workflow("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_is_upsert() {
        let storage = memory_storage().await;
        storage.save_workflow(&sample_workflow("wf-a")).await.unwrap();

        let mut updated = sample_workflow("wf-a");
        updated.description = "v2".to_string();
        storage.save_workflow(&updated).await.unwrap();

        let loaded = storage.get_workflow("wf-a").await.unwrap().unwrap();
        assert_eq!(loaded.description, "v2");
        assert_eq!(storage.list_workflows().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_removal() {
        let storage = memory_storage().await;
        storage.save_workflow(&sample_workflow("wf-a")).await.unwrap();

        assert!(storage.delete_workflow("wf-a").await.unwrap());
        assert!(!storage.delete_workflow("wf-a").await.unwrap());
    }

    #[tokio::test]
    async fn definitions_survive_a_reconnect() {
        use sqlx::sqlite::SqliteConnectOptions;
        use std::str::FromStr;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/wf.db", dir.path().display());
        let options = SqliteConnectOptions::from_str(&url)
            .unwrap()
            .create_if_missing(true);

        {
            let pool = SqlitePool::connect_with(options.clone()).await.unwrap();
            let storage = WorkflowStorage::new(pool.clone());
            storage.init_schema().await.unwrap();
            storage.save_workflow(&sample_workflow("wf-a")).await.unwrap();
            pool.close().await;
        }

        let pool = SqlitePool::connect_with(options).await.unwrap();
        let storage = WorkflowStorage::new(pool);
        let loaded = storage.get_workflow("wf-a").await.unwrap().unwrap();
        assert_eq!(loaded.name, "wf-a");
    }

    #[tokio::test]
    async fn load_all_returns_every_definition() {
        let storage = memory_storage().await;
        storage.save_workflow(&sample_workflow("wf-a")).await.unwrap();
        storage.save_workflow(&sample_workflow("wf-b")).await.unwrap();

        let all = storage.load_all_workflows().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("wf-a") && all.contains_key("wf-b"));
    }
}
