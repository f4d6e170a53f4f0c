//! Workflow store traits

use std::fmt::Debug;

use async_trait::async_trait;

use super::entity::{
    Implementation, Input, Output, Step, StepDetail, StepId, StepType, Workflow, WorkflowId,
};
use crate::domain::DomainError;

/// Durable bookkeeping for workflows and their step artifacts
///
/// Every write goes through a [`WorkflowTransaction`]; reads that do not
/// participate in a construction can go straight to the store.
#[async_trait]
pub trait WorkflowStore: Send + Sync + Debug {
    /// Open a transaction; nothing it writes is visible until `commit`
    async fn begin(&self) -> Result<Box<dyn WorkflowTransaction>, DomainError>;

    /// Resolve a workflow by its external name
    async fn find_workflow_by_name(&self, name: &str) -> Result<Workflow, DomainError>;

    /// Steps of a workflow ordered by position, each with its artifacts
    async fn load_steps(&self, workflow_id: WorkflowId) -> Result<Vec<StepDetail>, DomainError>;

    /// Cheap connectivity check for readiness
    async fn ping(&self) -> Result<(), DomainError>;
}

/// A unit of work against the workflow store
///
/// Dropping a transaction without committing discards every write.
#[async_trait]
pub trait WorkflowTransaction: Send {
    async fn find_workflow_by_name(&mut self, name: &str) -> Result<Workflow, DomainError>;

    /// Fails with `DuplicateName` when the name is already taken
    async fn create_workflow(
        &mut self,
        name: &str,
        about: &str,
        user_name: &str,
    ) -> Result<Workflow, DomainError>;

    /// Removes the workflow and, by cascade, all of its descendants
    async fn delete_workflow(&mut self, name: &str) -> Result<(), DomainError>;

    async fn create_step(
        &mut self,
        workflow_id: WorkflowId,
        name: &str,
        doc: &str,
        step_type: StepType,
        position: i32,
    ) -> Result<Step, DomainError>;

    async fn create_input(&mut self, step_id: StepId, doc: &str) -> Result<Input, DomainError>;

    async fn create_output(
        &mut self,
        step_id: StepId,
        doc: &str,
        extension: &str,
    ) -> Result<Output, DomainError>;

    async fn create_implementation(
        &mut self,
        step_id: StepId,
        file_name: &str,
        language: &str,
    ) -> Result<Implementation, DomainError>;

    /// Flags the workflow as structurally complete once positions form 1..N
    async fn mark_workflow_complete(&mut self, workflow_id: WorkflowId) -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
