// form-workflow - finite-state controller for a form's lifecycle
// This exposes the workflow core plus the runtime that hosts it

pub mod config;
pub mod demo;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use crate::config::{config, init_config, FormWorkflowConfig};
pub use crate::telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use crate::workflow::{
    spawn_workflow, DispatchOutcome, EditingState, FieldErrors, FormContext, FormEvent,
    FormWorkflow, RuntimeOptions, SubmissionService, WorkflowError, WorkflowHandle,
    WorkflowRuntime, WorkflowSnapshot, WorkflowState,
};
