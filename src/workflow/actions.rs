// Context transformations run during transitions and state entry.
// Each takes the context by value and returns the replacement; none of them
// touch anything but the context.

use crate::workflow::types::{FieldErrors, FormContext};

/// Store a single field value, leaving errors alone
pub fn on_change(mut context: FormContext, key: &str, value: &str) -> FormContext {
    context.values.insert(key.to_string(), value.to_string());
    context
}

/// Drop every value and error
pub fn clear_form(_context: FormContext) -> FormContext {
    FormContext::default()
}

/// Replace the stored errors wholesale with a rejection payload
pub fn on_error(mut context: FormContext, errors: &FieldErrors) -> FormContext {
    context.errors = errors.clone();
    context
}
