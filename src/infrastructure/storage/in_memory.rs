//! In-memory workflow store

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::workflow::{
    validate_workflow_name, verify_positions, Implementation, Input, Output, Step, StepDetail,
    StepId, StepType, Workflow, WorkflowId, WorkflowStore, WorkflowTransaction,
};
use crate::domain::DomainError;

/// Thread-safe in-memory workflow store
///
/// Useful for testing and development. Data is lost when the process terminates.
/// A transaction holds the store lock for its whole lifetime and works on a
/// private copy of the tables that replaces the shared copy on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowStore {
    tables: Arc<Mutex<Tables>>,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    pub workflows: usize,
    pub steps: usize,
    pub inputs: usize,
    pub outputs: usize,
    pub implementations: usize,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    sequence: i64,
    workflows: BTreeMap<i64, Workflow>,
    steps: BTreeMap<i64, Step>,
    inputs: BTreeMap<i64, Input>,
    outputs: BTreeMap<i64, Output>,
    implementations: BTreeMap<i64, Implementation>,
}

impl InMemoryWorkflowStore {
    /// Creates a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn row_counts(&self) -> RowCounts {
        let tables = self.tables.lock().await;

        RowCounts {
            workflows: tables.workflows.len(),
            steps: tables.steps.len(),
            inputs: tables.inputs.len(),
            outputs: tables.outputs.len(),
            implementations: tables.implementations.len(),
        }
    }
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    fn find_workflow_by_name(&self, name: &str) -> Result<Workflow, DomainError> {
        self.workflows
            .values()
            .find(|w| w.name == name)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("Workflow '{}' not found", name)))
    }

    fn create_workflow(
        &mut self,
        name: &str,
        about: &str,
        user_name: &str,
    ) -> Result<Workflow, DomainError> {
        validate_workflow_name(name)?;

        if self.workflows.values().any(|w| w.name == name) {
            return Err(DomainError::duplicate_name(format!(
                "There is already a phenotype with the name '{}'",
                name
            )));
        }

        let workflow = Workflow {
            id: WorkflowId::new(self.next_id()),
            name: name.to_string(),
            about: about.to_string(),
            user_name: user_name.to_string(),
            complete: false,
            created_at: Utc::now(),
        };
        self.workflows.insert(workflow.id.value(), workflow.clone());

        Ok(workflow)
    }

    fn delete_workflow(&mut self, name: &str) -> Result<(), DomainError> {
        let workflow = self.find_workflow_by_name(name)?;
        self.workflows.remove(&workflow.id.value());

        let step_ids: Vec<StepId> = self
            .steps
            .values()
            .filter(|s| s.workflow_id == workflow.id)
            .map(|s| s.id)
            .collect();

        self.steps.retain(|_, s| s.workflow_id != workflow.id);
        self.inputs.retain(|_, i| !step_ids.contains(&i.step_id));
        self.outputs.retain(|_, o| !step_ids.contains(&o.step_id));
        self.implementations
            .retain(|_, i| !step_ids.contains(&i.step_id));

        Ok(())
    }

    fn create_step(
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

        if !self.workflows.contains_key(&workflow_id.value()) {
            return Err(DomainError::dangling_reference(format!(
                "Workflow {} does not exist",
                workflow_id
            )));
        }

        let taken = self
            .steps
            .values()
            .any(|s| s.workflow_id == workflow_id && s.position == position);

        if taken {
            return Err(DomainError::position_conflict(format!(
                "Workflow {} already has a step at position {}",
                workflow_id, position
            )));
        }

        let step = Step {
            id: StepId::new(self.next_id()),
            workflow_id,
            name: name.to_string(),
            doc: doc.to_string(),
            step_type,
            position,
        };
        self.steps.insert(step.id.value(), step.clone());

        Ok(step)
    }

    fn require_step(&self, step_id: StepId) -> Result<(), DomainError> {
        if self.steps.contains_key(&step_id.value()) {
            Ok(())
        } else {
            Err(DomainError::dangling_reference(format!(
                "Step {} does not exist",
                step_id
            )))
        }
    }

    fn mark_workflow_complete(&mut self, workflow_id: WorkflowId) -> Result<(), DomainError> {
        let positions: Vec<i32> = self
            .steps
            .values()
            .filter(|s| s.workflow_id == workflow_id)
            .map(|s| s.position)
            .collect();

        let workflow = self
            .workflows
            .get_mut(&workflow_id.value())
            .ok_or_else(|| {
                DomainError::dangling_reference(format!("Workflow {} does not exist", workflow_id))
            })?;

        verify_positions(workflow_id, &positions)?;
        workflow.complete = true;

        Ok(())
    }

    fn load_steps(&self, workflow_id: WorkflowId) -> Vec<StepDetail> {
        let mut steps: Vec<&Step> = self
            .steps
            .values()
            .filter(|s| s.workflow_id == workflow_id)
            .collect();
        steps.sort_by_key(|s| s.position);

        steps
            .into_iter()
            .map(|step| StepDetail {
                step: step.clone(),
                inputs: self
                    .inputs
                    .values()
                    .filter(|i| i.step_id == step.id)
                    .cloned()
                    .collect(),
                outputs: self
                    .outputs
                    .values()
                    .filter(|o| o.step_id == step.id)
                    .cloned()
                    .collect(),
                implementations: self
                    .implementations
                    .values()
                    .filter(|i| i.step_id == step.id)
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn begin(&self) -> Result<Box<dyn WorkflowTransaction>, DomainError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn find_workflow_by_name(&self, name: &str) -> Result<Workflow, DomainError> {
        self.tables.lock().await.find_workflow_by_name(name)
    }

    async fn load_steps(&self, workflow_id: WorkflowId) -> Result<Vec<StepDetail>, DomainError> {
        Ok(self.tables.lock().await.load_steps(workflow_id))
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Exclusive working copy of the tables
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl WorkflowTransaction for InMemoryTransaction {
    async fn find_workflow_by_name(&mut self, name: &str) -> Result<Workflow, DomainError> {
        self.working.find_workflow_by_name(name)
    }

    async fn create_workflow(
        &mut self,
        name: &str,
        about: &str,
        user_name: &str,
    ) -> Result<Workflow, DomainError> {
        self.working.create_workflow(name, about, user_name)
    }

    async fn delete_workflow(&mut self, name: &str) -> Result<(), DomainError> {
        self.working.delete_workflow(name)
    }

    async fn create_step(
        &mut self,
        workflow_id: WorkflowId,
        name: &str,
        doc: &str,
        step_type: StepType,
        position: i32,
    ) -> Result<Step, DomainError> {
        self.working
            .create_step(workflow_id, name, doc, step_type, position)
    }

    async fn create_input(&mut self, step_id: StepId, doc: &str) -> Result<Input, DomainError> {
        self.working.require_step(step_id)?;

        let input = Input {
            id: self.working.next_id(),
            step_id,
            doc: doc.to_string(),
        };
        self.working.inputs.insert(input.id, input.clone());

        Ok(input)
    }

    async fn create_output(
        &mut self,
        step_id: StepId,
        doc: &str,
        extension: &str,
    ) -> Result<Output, DomainError> {
        self.working.require_step(step_id)?;

        let output = Output {
            id: self.working.next_id(),
            step_id,
            doc: doc.to_string(),
            extension: extension.to_string(),
        };
        self.working.outputs.insert(output.id, output.clone());

        Ok(output)
    }

    async fn create_implementation(
        &mut self,
        step_id: StepId,
        file_name: &str,
        language: &str,
    ) -> Result<Implementation, DomainError> {
        self.working.require_step(step_id)?;

        let implementation = Implementation {
            id: self.working.next_id(),
            step_id,
            file_name: file_name.to_string(),
            language: language.to_string(),
        };
        self.working
            .implementations
            .insert(implementation.id, implementation.clone());

        Ok(implementation)
    }

    async fn mark_workflow_complete(&mut self, workflow_id: WorkflowId) -> Result<(), DomainError> {
        self.working.mark_workflow_complete(workflow_id)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::PYTHON;

    async fn seed(store: &InMemoryWorkflowStore, name: &str, steps: i32) -> Workflow {
        let mut tx = store.begin().await.unwrap();
        let workflow = tx.create_workflow(name, "about", "alice").await.unwrap();

        for position in 1..=steps {
            let step = tx
                .create_step(workflow.id, "step", "doc", StepType::Logic, position)
                .await
                .unwrap();
            tx.create_input(step.id, "in").await.unwrap();
            tx.create_output(step.id, "out", "csv").await.unwrap();
            tx.create_implementation(step.id, "step.py", PYTHON)
                .await
                .unwrap();
        }

        tx.commit().await.unwrap();
        workflow
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryWorkflowStore::new();
        let created = seed(&store, "dtc001", 3).await;

        let found = store.find_workflow_by_name("dtc001").await.unwrap();
        assert_eq!(found, created);

        let steps = store.load_steps(created.id).await.unwrap();
        let positions: Vec<i32> = steps.iter().map(|s| s.step.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert!(steps.iter().all(|s| s.implementations.len() == 1));
    }

    #[tokio::test]
    async fn test_find_missing_is_not_found() {
        let store = InMemoryWorkflowStore::new();

        let err = store.find_workflow_by_name("nope").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = InMemoryWorkflowStore::new();
        seed(&store, "dtc001", 1).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.create_workflow("dtc001", "x", "bob").await.unwrap_err();

        assert!(matches!(err, DomainError::DuplicateName { .. }));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = InMemoryWorkflowStore::new();
        let keep = seed(&store, "keep", 2).await;
        let gone = seed(&store, "gone", 3).await;

        let mut tx = store.begin().await.unwrap();
        tx.delete_workflow("gone").await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.load_steps(gone.id).await.unwrap().is_empty());
        assert_eq!(store.load_steps(keep.id).await.unwrap().len(), 2);
        assert_eq!(
            store.row_counts().await,
            RowCounts {
                workflows: 1,
                steps: 2,
                inputs: 2,
                outputs: 2,
                implementations: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryWorkflowStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = tx.delete_workflow("nope").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_step_requires_workflow() {
        let store = InMemoryWorkflowStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = tx
            .create_step(WorkflowId::new(99), "s", "d", StepType::Load, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DanglingReference { .. }));
    }

    #[tokio::test]
    async fn test_artifacts_require_step() {
        let store = InMemoryWorkflowStore::new();
        let mut tx = store.begin().await.unwrap();
        let missing = StepId::new(42);

        assert!(matches!(
            tx.create_input(missing, "d").await.unwrap_err(),
            DomainError::DanglingReference { .. }
        ));
        assert!(matches!(
            tx.create_output(missing, "d", "csv").await.unwrap_err(),
            DomainError::DanglingReference { .. }
        ));
        assert!(matches!(
            tx.create_implementation(missing, "f.py", PYTHON)
                .await
                .unwrap_err(),
            DomainError::DanglingReference { .. }
        ));
    }

    #[tokio::test]
    async fn test_position_conflict_and_bounds() {
        let store = InMemoryWorkflowStore::new();
        let mut tx = store.begin().await.unwrap();
        let workflow = tx.create_workflow("w", "a", "u").await.unwrap();

        tx.create_step(workflow.id, "s1", "d", StepType::Load, 1)
            .await
            .unwrap();

        let conflict = tx
            .create_step(workflow.id, "s1b", "d", StepType::Load, 1)
            .await
            .unwrap_err();
        assert!(matches!(conflict, DomainError::PositionConflict { .. }));

        let zero = tx
            .create_step(workflow.id, "s0", "d", StepType::Load, 0)
            .await
            .unwrap_err();
        assert!(matches!(zero, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_mark_complete_requires_contiguous_positions() {
        let store = InMemoryWorkflowStore::new();
        let mut tx = store.begin().await.unwrap();
        let workflow = tx.create_workflow("w", "a", "u").await.unwrap();

        tx.create_step(workflow.id, "s1", "d", StepType::Load, 1)
            .await
            .unwrap();
        tx.create_step(workflow.id, "s3", "d", StepType::Output, 3)
            .await
            .unwrap();

        let err = tx.mark_workflow_complete(workflow.id).await.unwrap_err();
        assert!(matches!(err, DomainError::PartialConstruction { .. }));

        tx.create_step(workflow.id, "s2", "d", StepType::Logic, 2)
            .await
            .unwrap();
        tx.mark_workflow_complete(workflow.id).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.find_workflow_by_name("w").await.unwrap().complete);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryWorkflowStore::new();
        seed(&store, "existing", 1).await;

        let mut tx = store.begin().await.unwrap();
        tx.delete_workflow("existing").await.unwrap();
        tx.create_workflow("new", "a", "u").await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.find_workflow_by_name("existing").await.is_ok());
        assert!(store.find_workflow_by_name("new").await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = InMemoryWorkflowStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.create_workflow("temp", "a", "u").await.unwrap();
        }

        assert_eq!(store.row_counts().await, RowCounts::default());
    }

    #[tokio::test]
    async fn test_transactions_are_serialized() {
        let store = InMemoryWorkflowStore::new();
        let first = store.begin().await.unwrap();

        let contender = store.clone();
        let handle = tokio::spawn(async move {
            let mut tx = contender.begin().await.unwrap();
            let result = tx.create_workflow("same", "a", "u").await;
            if result.is_ok() {
                tx.commit().await.unwrap();
            }
            result.is_ok()
        });

        let mut first = first;
        first.create_workflow("same", "a", "u").await.unwrap();
        first.commit().await.unwrap();

        assert!(!handle.await.unwrap());
        assert_eq!(store.row_counts().await.workflows, 1);
    }
}
