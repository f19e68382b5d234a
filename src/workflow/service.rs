// Submission service seam - the one external collaborator of the workflow

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::workflow::types::{FieldErrors, FormContext};

/// Key the runtime uses for a form-level error when a submission never
/// produced a result of its own (the service task panicked or was aborted).
pub const FORM_ERROR_KEY: &str = "form";

/// Validates and/or persists a submitted form.
///
/// Implementations must fold every failure, transport problems included,
/// into a [`FieldErrors`] map before returning it. The workflow makes no
/// distinction between kinds of failure and never retries.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SubmissionService: Send + Sync {
    async fn submit(&self, context: FormContext) -> Result<(), FieldErrors>;
}

#[async_trait]
impl<S: SubmissionService + ?Sized> SubmissionService for Arc<S> {
    async fn submit(&self, context: FormContext) -> Result<(), FieldErrors> {
        (**self).submit(context).await
    }
}

/// Adapter turning an async closure into a [`SubmissionService`]
pub struct FnSubmissionService<F> {
    func: F,
}

impl<F> FnSubmissionService<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> SubmissionService for FnSubmissionService<F>
where
    F: Fn(FormContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), FieldErrors>> + Send,
{
    async fn submit(&self, context: FormContext) -> Result<(), FieldErrors> {
        (self.func)(context).await
    }
}

/// Build a service from an async closure
pub fn service_fn<F, Fut>(func: F) -> FnSubmissionService<F>
where
    F: Fn(FormContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), FieldErrors>> + Send,
{
    FnSubmissionService::new(func)
}
