use thiserror::Error;

/// Failures of the hosting runtime. Problems with the form itself never show
/// up here; they travel through `FormContext::errors`.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow runtime has shut down")]
    Closed,

    #[error("{0} is reported by the runtime and cannot be dispatched")]
    InternalEvent(&'static str),

    #[error("Workflow runtime task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
