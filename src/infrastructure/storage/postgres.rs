//! PostgreSQL workflow store with connection pooling

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Postgres, Row, Transaction};

use crate::config::DatabaseConfig;
use crate::domain::workflow::{
    validate_workflow_name, verify_positions, Implementation, Input, Output, Step, StepDetail,
    StepId, StepType, Workflow, WorkflowId, WorkflowStore, WorkflowTransaction,
};
use crate::domain::DomainError;

/// PostgreSQL workflow store
///
/// Name and position uniqueness, parent existence and cascade delete are all
/// enforced by the schema in [`super::migrations`].
#[derive(Debug, Clone)]
pub struct PostgresWorkflowStore {
    pool: PgPool,
}

impl PostgresWorkflowStore {
    /// Creates a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a store with its own connection pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WorkflowStore for PostgresWorkflowStore {
    async fn begin(&self) -> Result<Box<dyn WorkflowTransaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn find_workflow_by_name(&self, name: &str) -> Result<Workflow, DomainError> {
        find_workflow_by_name(&self.pool, name).await
    }

    async fn load_steps(&self, workflow_id: WorkflowId) -> Result<Vec<StepDetail>, DomainError> {
        let steps: Vec<Step> = sqlx::query(
            r#"
            SELECT id, workflow_id, name, doc, step_type, position
            FROM steps
            WHERE workflow_id = $1
            ORDER BY position
            "#,
        )
        .bind(workflow_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to load steps: {}", e)))?
        .iter()
        .map(row_to_step)
        .collect::<Result<_, _>>()?;

        let step_ids: Vec<i64> = steps.iter().map(|s| s.id.value()).collect();

        let inputs: Vec<Input> = sqlx::query(
            "SELECT id, step_id, doc FROM inputs WHERE step_id = ANY($1) ORDER BY id",
        )
        .bind(step_ids.as_slice())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to load inputs: {}", e)))?
        .iter()
        .map(row_to_input)
        .collect::<Result<_, _>>()?;

        let outputs: Vec<Output> = sqlx::query(
            "SELECT id, step_id, doc, extension FROM outputs WHERE step_id = ANY($1) ORDER BY id",
        )
        .bind(step_ids.as_slice())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to load outputs: {}", e)))?
        .iter()
        .map(row_to_output)
        .collect::<Result<_, _>>()?;

        let implementations: Vec<Implementation> = sqlx::query(
            r#"
            SELECT id, step_id, file_name, language
            FROM implementations
            WHERE step_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(step_ids.as_slice())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to load implementations: {}", e)))?
        .iter()
        .map(row_to_implementation)
        .collect::<Result<_, _>>()?;

        Ok(assemble_details(steps, inputs, outputs, implementations))
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| DomainError::storage(format!("Database ping failed: {}", e)))
    }
}

/// A PostgreSQL transaction; rolled back by sqlx when dropped uncommitted
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl WorkflowTransaction for PostgresTransaction {
    async fn find_workflow_by_name(&mut self, name: &str) -> Result<Workflow, DomainError> {
        find_workflow_by_name(&mut *self.tx, name).await
    }

    async fn create_workflow(
        &mut self,
        name: &str,
        about: &str,
        user_name: &str,
    ) -> Result<Workflow, DomainError> {
        validate_workflow_name(name)?;

        let row = sqlx::query(
            r#"
            INSERT INTO workflows (name, about, user_name)
            VALUES ($1, $2, $3)
            RETURNING id, name, about, user_name, complete, created_at
            "#,
        )
        .bind(name)
        .bind(about)
        .bind(user_name)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::duplicate_name(format!(
                    "There is already a phenotype with the name '{}'",
                    name
                ))
            } else {
                DomainError::storage(format!("Failed to create workflow: {}", e))
            }
        })?;

        row_to_workflow(&row)
    }

    async fn delete_workflow(&mut self, name: &str) -> Result<(), DomainError> {
        let result = sqlx::query("DELETE FROM workflows WHERE name = $1")
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete workflow: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "Workflow '{}' not found",
                name
            )));
        }

        Ok(())
    }

    async fn create_step(
        &mut self,
        workflow_id: WorkflowId,
        name: &str,
        doc: &str,
        step_type: StepType,
        position: i32,
    ) -> Result<Step, DomainError> {
        if position < 1 {
            return Err(DomainError::validation(format!(
                "Step position must be >= 1, got {}",
                position
            )));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO steps (workflow_id, name, doc, step_type, position)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, workflow_id, name, doc, step_type, position
            "#,
        )
        .bind(workflow_id.value())
        .bind(name)
        .bind(doc)
        .bind(step_type.as_str())
        .bind(position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                DomainError::dangling_reference(format!("Workflow {} does not exist", workflow_id))
            } else if is_unique_violation(&e) {
                DomainError::position_conflict(format!(
                    "Workflow {} already has a step at position {}",
                    workflow_id, position
                ))
            } else {
                DomainError::storage(format!("Failed to create step: {}", e))
            }
        })?;

        row_to_step(&row)
    }

    async fn create_input(&mut self, step_id: StepId, doc: &str) -> Result<Input, DomainError> {
        let row = sqlx::query(
            "INSERT INTO inputs (step_id, doc) VALUES ($1, $2) RETURNING id, step_id, doc",
        )
        .bind(step_id.value())
        .bind(doc)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_child_error(e, step_id, "input"))?;

        row_to_input(&row)
    }

    async fn create_output(
        &mut self,
        step_id: StepId,
        doc: &str,
        extension: &str,
    ) -> Result<Output, DomainError> {
        let row = sqlx::query(
            r#"
            INSERT INTO outputs (step_id, doc, extension)
            VALUES ($1, $2, $3)
            RETURNING id, step_id, doc, extension
            "#,
        )
        .bind(step_id.value())
        .bind(doc)
        .bind(extension)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_child_error(e, step_id, "output"))?;

        row_to_output(&row)
    }

    async fn create_implementation(
        &mut self,
        step_id: StepId,
        file_name: &str,
        language: &str,
    ) -> Result<Implementation, DomainError> {
        let row = sqlx::query(
            r#"
            INSERT INTO implementations (step_id, file_name, language)
            VALUES ($1, $2, $3)
            RETURNING id, step_id, file_name, language
            "#,
        )
        .bind(step_id.value())
        .bind(file_name)
        .bind(language)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_child_error(e, step_id, "implementation"))?;

        row_to_implementation(&row)
    }

    async fn mark_workflow_complete(&mut self, workflow_id: WorkflowId) -> Result<(), DomainError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workflows WHERE id = $1)")
                .bind(workflow_id.value())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| DomainError::storage(format!("Failed to check workflow: {}", e)))?;

        if !exists {
            return Err(DomainError::dangling_reference(format!(
                "Workflow {} does not exist",
                workflow_id
            )));
        }

        let positions: Vec<i32> = sqlx::query_scalar(
            "SELECT position FROM steps WHERE workflow_id = $1 ORDER BY position",
        )
        .bind(workflow_id.value())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to read step positions: {}", e)))?;

        verify_positions(workflow_id, &positions)?;

        sqlx::query("UPDATE workflows SET complete = TRUE WHERE id = $1")
            .bind(workflow_id.value())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to mark workflow complete: {}", e)))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to roll back transaction: {}", e)))
    }
}

async fn find_workflow_by_name<'e, E>(executor: E, name: &str) -> Result<Workflow, DomainError>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        SELECT id, name, about, user_name, complete, created_at
        FROM workflows
        WHERE name = $1
        "#,
    )
    .bind(name)
    .fetch_optional(executor)
    .await
    .map_err(|e| DomainError::storage(format!("Failed to find workflow: {}", e)))?;

    match row {
        Some(row) => row_to_workflow(&row),
        None => Err(DomainError::not_found(format!(
            "Workflow '{}' not found",
            name
        ))),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn map_child_error(err: sqlx::Error, step_id: StepId, kind: &str) -> DomainError {
    if is_foreign_key_violation(&err) {
        DomainError::dangling_reference(format!("Step {} does not exist", step_id))
    } else {
        DomainError::storage(format!("Failed to create {}: {}", kind, err))
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| DomainError::storage(format!("Invalid column '{}': {}", name, e)))
}

fn row_to_workflow(row: &PgRow) -> Result<Workflow, DomainError> {
    let created_at: DateTime<Utc> = column(row, "created_at")?;

    Ok(Workflow {
        id: WorkflowId::new(column(row, "id")?),
        name: column(row, "name")?,
        about: column(row, "about")?,
        user_name: column(row, "user_name")?,
        complete: column(row, "complete")?,
        created_at,
    })
}

fn row_to_step(row: &PgRow) -> Result<Step, DomainError> {
    let step_type: String = column(row, "step_type")?;

    Ok(Step {
        id: StepId::new(column(row, "id")?),
        workflow_id: WorkflowId::new(column(row, "workflow_id")?),
        name: column(row, "name")?,
        doc: column(row, "doc")?,
        step_type: step_type
            .parse()
            .map_err(|e| DomainError::storage(format!("Invalid step type in database: {}", e)))?,
        position: column(row, "position")?,
    })
}

fn row_to_input(row: &PgRow) -> Result<Input, DomainError> {
    Ok(Input {
        id: column(row, "id")?,
        step_id: StepId::new(column(row, "step_id")?),
        doc: column(row, "doc")?,
    })
}

fn row_to_output(row: &PgRow) -> Result<Output, DomainError> {
    Ok(Output {
        id: column(row, "id")?,
        step_id: StepId::new(column(row, "step_id")?),
        doc: column(row, "doc")?,
        extension: column(row, "extension")?,
    })
}

fn row_to_implementation(row: &PgRow) -> Result<Implementation, DomainError> {
    Ok(Implementation {
        id: column(row, "id")?,
        step_id: StepId::new(column(row, "step_id")?),
        file_name: column(row, "file_name")?,
        language: column(row, "language")?,
    })
}

/// Attach artifacts to their steps, keeping step order
fn assemble_details(
    steps: Vec<Step>,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    implementations: Vec<Implementation>,
) -> Vec<StepDetail> {
    steps
        .into_iter()
        .map(|step| {
            let id = step.id;

            StepDetail {
                step,
                inputs: inputs.iter().filter(|i| i.step_id == id).cloned().collect(),
                outputs: outputs.iter().filter(|o| o.step_id == id).cloned().collect(),
                implementations: implementations
                    .iter()
                    .filter(|i| i.step_id == id)
                    .cloned()
                    .collect(),
            }
        })
        .collect()
}
