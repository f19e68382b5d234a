// Test doubles for the submission service - no I/O, fully scripted
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use form_workflow::{FieldErrors, FormContext, SubmissionService};

/// Records every submission and answers from a script.
///
/// Once the script runs out every further submission succeeds. With a gate
/// installed each submission parks until the test releases it.
#[derive(Clone, Default)]
pub struct RecordingSubmissionService {
    submissions: Arc<Mutex<Vec<FormContext>>>,
    script: Arc<Mutex<VecDeque<Result<(), FieldErrors>>>>,
    gate: Option<Arc<Notify>>,
}

impl RecordingSubmissionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(self, response: Result<(), FieldErrors>) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    pub fn reject_with(self, key: &str, description: &str) -> Self {
        self.respond_with(Err(FieldErrors::new().with(key, description)))
    }

    /// Park submissions until `release` is called once per submission
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn submissions(&self) -> Vec<FormContext> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl SubmissionService for RecordingSubmissionService {
    async fn submit(&self, context: FormContext) -> Result<(), FieldErrors> {
        self.submissions.lock().unwrap().push(context);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))
    }
}

pub fn sales_order(name: &str, reams: &str, company: &str) -> Vec<(String, String)> {
    vec![
        ("name".to_string(), name.to_string()),
        ("reams".to_string(), reams.to_string()),
        ("company".to_string(), company.to_string()),
    ]
}
