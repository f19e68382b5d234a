// Single-consumer host for a FormWorkflow.
//
// The actor task owns the workflow outright. Presentation code and finished
// submissions both feed the same bounded queue, so every event is processed
// to completion before the next one is looked at.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, warn, Instrument};

use crate::telemetry::{create_workflow_span, generate_correlation_id};
use crate::workflow::errors::WorkflowError;
use crate::workflow::machine::FormWorkflow;
use crate::workflow::service::{SubmissionService, FORM_ERROR_KEY};
use crate::workflow::types::*;

pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub event_queue_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug)]
enum Command {
    Dispatch(FormEvent),
    // Only the runtime's own submission tasks send this
    Complete(FormEvent),
    Shutdown,
}

/// Cloneable command/query surface for the presentation layer
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<WorkflowSnapshot>,
    correlation_id: Arc<str>,
}

impl WorkflowHandle {
    /// Enqueue an event. Returns once the event is queued, not processed.
    ///
    /// Submission results are reported by the runtime itself, so completion
    /// events are refused here.
    pub async fn dispatch(&self, event: FormEvent) -> Result<(), WorkflowError> {
        if event.is_internal() {
            warn!(event = event.name(), "Refusing externally dispatched completion event");
            return Err(WorkflowError::InternalEvent(event.name()));
        }
        self.commands
            .send(Command::Dispatch(event))
            .await
            .map_err(|_| WorkflowError::Closed)
    }

    pub async fn change(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        self.dispatch(FormEvent::change(key, value)).await
    }

    pub async fn submit(&self) -> Result<(), WorkflowError> {
        self.dispatch(FormEvent::Submit).await
    }

    pub async fn again(&self) -> Result<(), WorkflowError> {
        self.dispatch(FormEvent::Again).await
    }

    /// Latest published state and context
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn current_state(&self) -> WorkflowState {
        self.snapshots.borrow().state
    }

    pub fn current_context(&self) -> FormContext {
        self.snapshots.borrow().context.clone()
    }

    /// Receiver notified after every event that changed state or context
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`. The current
    /// snapshot is checked first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<WorkflowSnapshot, WorkflowError>
    where
        F: FnMut(&WorkflowSnapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| WorkflowError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Wait until the state matches a dotted prefix such as `"editing"`
    pub async fn wait_for_state(&self, prefix: &str) -> Result<WorkflowSnapshot, WorkflowError> {
        self.wait_until(|snapshot| snapshot.state.matches(prefix))
            .await
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// A running workflow actor
pub struct WorkflowRuntime {
    handle: WorkflowHandle,
    task: JoinHandle<FormWorkflow>,
}

impl WorkflowRuntime {
    pub fn spawn<S>(workflow: FormWorkflow, service: S, options: RuntimeOptions) -> Self
    where
        S: SubmissionService + 'static,
    {
        let correlation_id: Arc<str> = generate_correlation_id().into();
        let (commands, receiver) = mpsc::channel(options.event_queue_capacity.max(1));
        let (publisher, snapshots) = watch::channel(workflow.snapshot());

        let actor = WorkflowActor {
            workflow,
            service: Arc::new(service),
            receiver,
            completions: commands.downgrade(),
            publisher,
            pending: None,
        };
        let span = create_workflow_span("form_workflow", &correlation_id);
        let task = tokio::spawn(actor.run().instrument(span));

        info!(correlation_id = %correlation_id, "Form workflow runtime started");

        Self {
            handle: WorkflowHandle {
                commands,
                snapshots,
                correlation_id,
            },
            task,
        }
    }

    pub fn handle(&self) -> WorkflowHandle {
        self.handle.clone()
    }

    /// Stop the actor and hand back the workflow it owned.
    ///
    /// Events queued before the call are still processed. A submission that
    /// is in flight is aborted and its result discarded.
    pub async fn shutdown(self) -> Result<FormWorkflow, WorkflowError> {
        // The actor may already be gone if every sender was dropped
        let _ = self.handle.commands.send(Command::Shutdown).await;
        Ok(self.task.await?)
    }
}

pub fn spawn_workflow<S>(
    workflow: FormWorkflow,
    service: S,
    options: RuntimeOptions,
) -> WorkflowRuntime
where
    S: SubmissionService + 'static,
{
    WorkflowRuntime::spawn(workflow, service, options)
}

struct WorkflowActor {
    workflow: FormWorkflow,
    service: Arc<dyn SubmissionService>,
    receiver: mpsc::Receiver<Command>,
    // Weak so that dropping every handle closes the queue
    completions: mpsc::WeakSender<Command>,
    publisher: watch::Sender<WorkflowSnapshot>,
    pending: Option<AbortHandle>,
}

impl WorkflowActor {
    async fn run(mut self) -> FormWorkflow {
        while let Some(command) = self.receiver.recv().await {
            match command {
                Command::Dispatch(event) | Command::Complete(event) => self.process(event),
                Command::Shutdown => break,
            }
        }

        if let Some(pending) = self.pending.take() {
            warn!("Abandoning in-flight submission on shutdown");
            pending.abort();
        }
        info!(state = %self.workflow.current_state(), "Form workflow runtime stopped");
        self.workflow
    }

    fn process(&mut self, event: FormEvent) {
        let settles = event.is_internal();
        let outcome = self.workflow.dispatch(event);

        if settles && self.workflow.in_flight().is_none() {
            self.pending = None;
        }
        for effect in self.workflow.take_effects() {
            self.execute(effect);
        }
        if !outcome.is_ignored() {
            self.publisher.send_replace(self.workflow.snapshot());
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Submit { ticket, context } => {
                let service = Arc::clone(&self.service);
                let submission = tokio::spawn(async move { service.submit(context).await });
                self.pending = Some(submission.abort_handle());

                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let event = completion_event(ticket, submission.await);
                    // No sender left means the runtime is gone; nothing to report to
                    if let Some(sender) = completions.upgrade() {
                        let _ = sender.send(Command::Complete(event)).await;
                    }
                });
            }
        }
    }
}

fn completion_event(
    ticket: SubmissionTicket,
    result: Result<Result<(), FieldErrors>, tokio::task::JoinError>,
) -> FormEvent {
    match result {
        Ok(Ok(())) => FormEvent::SubmitSucceeded { ticket },
        Ok(Err(errors)) => FormEvent::SubmitFailed { ticket, errors },
        Err(join_error) => {
            let description = if join_error.is_panic() {
                "Submission failed unexpectedly"
            } else {
                "Submission was cancelled"
            };
            warn!(ticket = %ticket, error = %join_error, "Submission task did not complete");
            FormEvent::SubmitFailed {
                ticket,
                errors: FieldErrors::new().with(FORM_ERROR_KEY, description),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::service::{service_fn, MockSubmissionService};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn start(service: impl SubmissionService + 'static) -> WorkflowRuntime {
        spawn_workflow(FormWorkflow::new(), service, RuntimeOptions::default())
    }

    #[tokio::test]
    async fn test_runtime_publishes_initial_snapshot() {
        let runtime = start(MockSubmissionService::new());
        let handle = runtime.handle();

        assert_eq!(handle.current_state(), WorkflowState::INITIAL);
        assert!(handle.current_context().is_empty());
        assert!(!handle.correlation_id().is_empty());

        tokio_test::assert_ok!(runtime.shutdown().await);
    }

    #[tokio::test]
    async fn test_successful_submission_round_trip() {
        let mut service = MockSubmissionService::new();
        service
            .expect_submit()
            .withf(|context| context.value("company") == Some("Acme"))
            .times(1)
            .returning(|_| Ok(()));

        let runtime = start(service);
        let handle = runtime.handle();
        handle.change("name", "Dwight").await.unwrap();
        handle.change("reams", "200").await.unwrap();
        handle.change("company", "Acme").await.unwrap();
        handle.submit().await.unwrap();

        let snapshot = handle.wait_for_state("success").await.unwrap();
        assert_eq!(snapshot.context.value("name"), Some("Dwight"));

        let workflow = runtime.shutdown().await.unwrap();
        assert_eq!(workflow.current_state(), WorkflowState::Success);
    }

    #[tokio::test]
    async fn test_rejection_is_folded_into_errors() {
        let mut service = MockSubmissionService::new();
        service
            .expect_submit()
            .times(1)
            .returning(|_| Err(FieldErrors::new().with("reams", "Not enough reams!")));

        let runtime = start(service);
        let handle = runtime.handle();
        handle.change("reams", "20").await.unwrap();
        handle.submit().await.unwrap();

        let snapshot = handle.wait_for_state("editing.error").await.unwrap();
        assert_eq!(snapshot.context.errors.get("reams"), Some("Not enough reams!"));
        assert_eq!(snapshot.context.value("reams"), Some("20"));

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_during_submission_are_ignored() {
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let service = service_fn(move |_context: FormContext| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok::<(), FieldErrors>(())
            }
        });

        let runtime = start(service);
        let handle = runtime.handle();
        handle.change("name", "Jim").await.unwrap();
        handle.submit().await.unwrap();
        handle.wait_for_state("submitting").await.unwrap();

        handle.change("name", "Dwight").await.unwrap();
        handle.submit().await.unwrap();
        release.notify_one();

        let snapshot = handle.wait_for_state("success").await.unwrap();
        assert_eq!(snapshot.context.value("name"), Some("Jim"));

        let workflow = runtime.shutdown().await.unwrap();
        let submissions = workflow
            .history()
            .filter(|record| record.to == WorkflowState::Submitting)
            .count();
        assert_eq!(submissions, 1);
    }

    #[tokio::test]
    async fn test_panicking_service_is_coerced_into_form_error() {
        let mut service = MockSubmissionService::new();
        service
            .expect_submit()
            .returning(|_| panic!("backend exploded"));

        let runtime = start(service);
        let handle = runtime.handle();
        handle.submit().await.unwrap();

        let snapshot = handle.wait_for_state("editing.error").await.unwrap();
        assert_eq!(
            snapshot.context.errors.get(FORM_ERROR_KEY),
            Some("Submission failed unexpectedly")
        );

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_refuses_completion_events() {
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let service = service_fn(move |_context: FormContext| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Err(FieldErrors::new().with("reams", "Not enough reams!"))
            }
        });

        let runtime = start(service);
        let handle = runtime.handle();
        handle.change("reams", "20").await.unwrap();
        handle.submit().await.unwrap();
        handle.wait_for_state("submitting").await.unwrap();

        let refused = handle
            .dispatch(FormEvent::SubmitSucceeded {
                ticket: SubmissionTicket(1),
            })
            .await;
        assert!(matches!(
            refused,
            Err(WorkflowError::InternalEvent("SUBMIT_SUCCEEDED"))
        ));
        assert_eq!(handle.current_state(), WorkflowState::Submitting);

        release.notify_one();
        let snapshot = handle.wait_for_state("editing.error").await.unwrap();
        assert_eq!(snapshot.context.errors.get("reams"), Some("Not enough reams!"));

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_abandons_in_flight_submission() {
        let service = service_fn(|_context: FormContext| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), FieldErrors>(())
        });

        let runtime = start(service);
        let handle = runtime.handle();
        handle.submit().await.unwrap();
        handle.wait_for_state("submitting").await.unwrap();

        let workflow = runtime.shutdown().await.unwrap();
        assert_eq!(workflow.current_state(), WorkflowState::Submitting);
        assert!(matches!(
            handle.submit().await,
            Err(WorkflowError::Closed)
        ));
    }
}
