use statig::prelude::*;
use std::collections::VecDeque;
use std::mem;

use crate::workflow::actions;
use crate::workflow::types::*;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Shared storage for the form state graph.
///
/// Only the state handlers and entry actions below mutate it, so every
/// change to the context happens inside a transition.
#[derive(Debug, Default)]
pub struct FormMachine {
    context: FormContext,
    started: bool,
    // Bumped on every context update
    revision: u64,
    tickets_issued: u64,
    in_flight: Option<SubmissionTicket>,
}

impl FormMachine {
    pub fn new(context: FormContext) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }

    pub fn context(&self) -> &FormContext {
        &self.context
    }

    pub fn in_flight(&self) -> Option<SubmissionTicket> {
        self.in_flight
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_ticket(&self) -> Option<SubmissionTicket> {
        (self.tickets_issued > 0).then_some(SubmissionTicket(self.tickets_issued))
    }

    fn update(&mut self, reducer: impl FnOnce(FormContext) -> FormContext) {
        self.context = reducer(mem::take(&mut self.context));
        self.revision += 1;
    }

    fn is_current(&self, ticket: SubmissionTicket) -> bool {
        self.in_flight == Some(ticket)
    }

    fn ignore_completion(&self, event: &FormEvent) -> Outcome<State> {
        tracing::warn!(
            event = event.name(),
            in_flight = ?self.in_flight,
            "Dropping submission result that does not belong to a pending submission"
        );
        Handled
    }
}

#[state_machine(
    initial = "State::pristine()",
    state(derive(Debug, Clone, Copy, PartialEq, Eq))
)]
impl FormMachine {
    /// User edits and submission requests are handled the same way in every
    /// editing substate.
    #[superstate]
    fn editing(&mut self, event: &FormEvent) -> Outcome<State> {
        match event {
            FormEvent::Change { key, value } => {
                self.update(|context| actions::on_change(context, key, value));
                tracing::debug!(field = %key, "Form field changed");
                Handled
            }
            FormEvent::Submit => Transition(State::submitting()),
            _ => Handled,
        }
    }

    #[state(superstate = "editing", entry_action = "enter_pristine")]
    fn pristine(&mut self, event: &FormEvent) -> Outcome<State> {
        match event {
            FormEvent::SubmitSucceeded { .. } | FormEvent::SubmitFailed { .. } => {
                self.ignore_completion(event)
            }
            _ => Super,
        }
    }

    #[state(superstate = "editing")]
    fn error(&mut self, event: &FormEvent) -> Outcome<State> {
        match event {
            FormEvent::SubmitSucceeded { .. } | FormEvent::SubmitFailed { .. } => {
                self.ignore_completion(event)
            }
            _ => Super,
        }
    }

    /// Edits and resubmits are swallowed until the pending submission settles.
    #[state(entry_action = "invoke_submission", exit_action = "settle_submission")]
    fn submitting(&mut self, event: &FormEvent) -> Outcome<State> {
        match event {
            FormEvent::SubmitSucceeded { ticket } if self.is_current(*ticket) => {
                tracing::info!(ticket = %ticket, "Submission accepted");
                Transition(State::success())
            }
            FormEvent::SubmitFailed { ticket, errors } if self.is_current(*ticket) => {
                tracing::info!(ticket = %ticket, errors = %errors, "Submission rejected");
                self.update(|context| actions::on_error(context, errors));
                Transition(State::error())
            }
            FormEvent::SubmitSucceeded { .. } | FormEvent::SubmitFailed { .. } => {
                self.ignore_completion(event)
            }
            _ => Handled,
        }
    }

    #[state]
    fn success(&mut self, event: &FormEvent) -> Outcome<State> {
        match event {
            FormEvent::Again => Transition(State::pristine()),
            FormEvent::SubmitSucceeded { .. } | FormEvent::SubmitFailed { .. } => {
                self.ignore_completion(event)
            }
            _ => Handled,
        }
    }

    /// The first entry happens at startup and keeps whatever context the
    /// workflow was seeded with; every later entry clears the form.
    #[action]
    fn enter_pristine(&mut self) {
        if !self.started {
            self.started = true;
            return;
        }
        self.update(actions::clear_form);
    }

    #[action]
    fn invoke_submission(&mut self) {
        self.tickets_issued += 1;
        let ticket = SubmissionTicket(self.tickets_issued);
        self.in_flight = Some(ticket);
        tracing::info!(ticket = %ticket, fields = self.context.values.len(), "Submission requested");
    }

    #[action]
    fn settle_submission(&mut self) {
        self.in_flight = None;
    }
}

fn workflow_state(state: &State) -> WorkflowState {
    match state {
        State::Pristine { .. } => WorkflowState::Editing(EditingState::Pristine),
        State::Error { .. } => WorkflowState::Editing(EditingState::Error),
        State::Submitting { .. } => WorkflowState::Submitting,
        State::Success { .. } => WorkflowState::Success,
    }
}

/// A form workflow instance: the state graph plus the bookkeeping a host
/// needs around it (pending effects, transition history).
///
/// `dispatch` processes exactly one event to completion. The workflow never
/// performs I/O; entering `Submitting` queues an [`Effect::Submit`] that the
/// host drains with [`FormWorkflow::take_effects`] and answers with a
/// `SubmitSucceeded`/`SubmitFailed` event carrying the same ticket.
pub struct FormWorkflow {
    machine: StateMachine<FormMachine>,
    effects: Vec<Effect>,
    emitted_ticket: Option<SubmissionTicket>,
    history: VecDeque<TransitionRecord>,
    history_limit: usize,
}

impl std::fmt::Debug for FormWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormWorkflow")
            .field("state", &self.current_state())
            .field("context", self.current_context())
            .field("effects", &self.effects)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl Default for FormWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl FormWorkflow {
    pub fn new() -> Self {
        Self::with_context(FormContext::default())
    }

    /// Start from a pre-filled context instead of an empty form
    pub fn with_context(context: FormContext) -> Self {
        Self {
            machine: FormMachine::new(context).state_machine(),
            effects: Vec::new(),
            emitted_ticket: None,
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        while self.history.len() > limit {
            self.history.pop_front();
        }
        self
    }

    /// Process one event to completion
    pub fn dispatch(&mut self, event: FormEvent) -> DispatchOutcome {
        let from = self.current_state();
        let revision = self.machine.inner().revision();

        self.machine.handle(&event);

        let to = self.current_state();
        self.collect_effects();

        if from != to {
            tracing::info!(
                event = event.name(),
                from = %from,
                to = %to,
                "Form workflow state transition"
            );
            self.record_transition(from, to, &event);
            DispatchOutcome::Transitioned { from, to }
        } else if self.machine.inner().revision() != revision {
            DispatchOutcome::Updated
        } else {
            tracing::debug!(event = event.name(), state = %from, "Event ignored");
            DispatchOutcome::Ignored
        }
    }

    pub fn current_state(&self) -> WorkflowState {
        workflow_state(self.machine.state())
    }

    pub fn current_context(&self) -> &FormContext {
        self.machine.inner().context()
    }

    /// Prefix match on the dotted state path, e.g. `is_in("editing")`
    pub fn is_in(&self, prefix: &str) -> bool {
        self.current_state().matches(prefix)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            state: self.current_state(),
            context: self.current_context().clone(),
        }
    }

    /// Ticket of the submission currently awaiting a result
    pub fn in_flight(&self) -> Option<SubmissionTicket> {
        self.machine.inner().in_flight()
    }

    /// Hand pending side effects to the host, oldest first
    pub fn take_effects(&mut self) -> Vec<Effect> {
        mem::take(&mut self.effects)
    }

    pub fn history(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.history.iter()
    }

    fn collect_effects(&mut self) {
        let inner = self.machine.inner();
        let Some(ticket) = inner.last_ticket() else {
            return;
        };
        if self.emitted_ticket == Some(ticket) {
            return;
        }
        self.effects.push(Effect::Submit {
            ticket,
            context: inner.context().clone(),
        });
        self.emitted_ticket = Some(ticket);
    }

    fn record_transition(&mut self, from: WorkflowState, to: WorkflowState, event: &FormEvent) {
        if self.history_limit == 0 {
            return;
        }
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(TransitionRecord {
            from,
            to,
            event: event.name().to_string(),
            at: chrono::Utc::now(),
        });
    }
}
