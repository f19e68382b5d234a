// Form workflow - hierarchical state machine for a form's edit/submit cycle
//
// The state graph itself is synchronous and free of I/O (machine.rs). The
// runtime hosts it behind a single-consumer queue and performs the
// submission side effects it asks for.

pub mod actions;
pub mod errors;
pub mod machine;
pub mod runtime;
pub mod service;
pub mod types;

pub use errors::WorkflowError;
pub use machine::{FormWorkflow, DEFAULT_HISTORY_LIMIT};
pub use runtime::{
    spawn_workflow, RuntimeOptions, WorkflowHandle, WorkflowRuntime, DEFAULT_EVENT_QUEUE_CAPACITY,
};
pub use service::{service_fn, FnSubmissionService, SubmissionService, FORM_ERROR_KEY};
pub use types::{
    DispatchOutcome, EditingState, Effect, FieldErrors, FormContext, FormEvent, FormValues,
    SubmissionTicket, TransitionRecord, WorkflowSnapshot, WorkflowState,
};

#[cfg(any(test, feature = "testing"))]
pub use service::MockSubmissionService;
