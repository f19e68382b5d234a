use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Current field values, keyed by field name
pub type FormValues = HashMap<String, String>;

/// Field-keyed error descriptions produced by a submission service.
///
/// The workflow never inspects the descriptions; it stores whatever the
/// service rejected with and hands it back to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(HashMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for services assembling a rejection
    pub fn with(mut self, key: impl Into<String>, description: impl Into<String>) -> Self {
        self.insert(key, description);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, description: impl Into<String>) {
        self.0.insert(key.into(), description.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<HashMap<String, String>> for FieldErrors {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort();
        let rendered: Vec<String> = entries
            .into_iter()
            .map(|(key, description)| format!("{key}: {description}"))
            .collect();
        write!(f, "{}", rendered.join(", "))
    }
}

/// Data owned by a single workflow instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormContext {
    pub values: FormValues,
    pub errors: FieldErrors,
}

impl FormContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            errors: FieldErrors::default(),
        }
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditingState {
    Pristine,
    Error,
}

/// Where the workflow currently is.
///
/// `Editing` is composite: its sub-tag only exists while editing, so the
/// type makes "submitting with a pristine substate" unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "substate", rename_all = "snake_case")]
pub enum WorkflowState {
    Editing(EditingState),
    Submitting,
    Success,
}

impl WorkflowState {
    pub const INITIAL: WorkflowState = WorkflowState::Editing(EditingState::Pristine);

    /// Dotted path segments, outermost first
    pub fn path(&self) -> &'static [&'static str] {
        match self {
            WorkflowState::Editing(EditingState::Pristine) => &["editing", "pristine"],
            WorkflowState::Editing(EditingState::Error) => &["editing", "error"],
            WorkflowState::Submitting => &["submitting"],
            WorkflowState::Success => &["success"],
        }
    }

    /// Segment-wise prefix match against a dotted path.
    ///
    /// `"editing"` matches both editing substates, `"editing.error"` only
    /// the error substate, `"edit"` matches nothing.
    pub fn matches(&self, prefix: &str) -> bool {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return false;
        }
        let wanted: Vec<&str> = prefix.split('.').collect();
        let path = self.path();
        wanted.len() <= path.len()
            && wanted
                .iter()
                .zip(path.iter())
                .all(|(want, have)| want.eq_ignore_ascii_case(have))
    }

    pub fn is_editing(&self) -> bool {
        matches!(self, WorkflowState::Editing(_))
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().join("."))
    }
}

/// Identifies one entry into `Submitting`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionTicket(pub u64);

impl fmt::Display for SubmissionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the workflow reacts to.
///
/// `Change`, `Submit` and `Again` come from the presentation layer. The two
/// completion events are synthesized by the runtime once a submission
/// settles and are routed through the same queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormEvent {
    Change { key: String, value: String },
    Submit,
    Again,
    SubmitSucceeded { ticket: SubmissionTicket },
    SubmitFailed { ticket: SubmissionTicket, errors: FieldErrors },
}

impl FormEvent {
    pub fn change(key: impl Into<String>, value: impl Into<String>) -> Self {
        FormEvent::Change {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            FormEvent::SubmitSucceeded { .. } | FormEvent::SubmitFailed { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormEvent::Change { .. } => "CHANGE",
            FormEvent::Submit => "SUBMIT",
            FormEvent::Again => "AGAIN",
            FormEvent::SubmitSucceeded { .. } => "SUBMIT_SUCCEEDED",
            FormEvent::SubmitFailed { .. } => "SUBMIT_FAILED",
        }
    }
}

/// Side effects the machine asks its host to perform.
///
/// The machine itself never calls out; it records what should happen and the
/// runtime executes it after the event has been fully processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Submit {
        ticket: SubmissionTicket,
        context: FormContext,
    },
}

/// What a single `dispatch` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Transitioned {
        from: WorkflowState,
        to: WorkflowState,
    },
    /// Context changed, state did not
    Updated,
    Ignored,
}

impl DispatchOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, DispatchOutcome::Ignored)
    }
}

/// Read-only view handed to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub context: FormContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub event: String,
    pub at: DateTime<Utc>,
}
