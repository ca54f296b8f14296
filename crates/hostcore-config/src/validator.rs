//! Configuration validation.

use crate::schema::{AllocatorKind, HostConfig};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &HostConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.async_context.initial_stack_capacity == 0 {
            result.add_error(ValidationError::new(
                "async_context.initial_stack_capacity",
                "must be at least 1",
            ));
        }
        if !config.async_context.check {
            result.add_warning(ValidationWarning::new(
                "async_context.check",
                "context stack corruption will go undetected",
            ));
        }

        if config.workers.max_workers == 0 {
            result.add_error(ValidationError::new("workers.max_workers", "must be at least 1"));
        }
        if config.workers.queue_capacity == 0 {
            result.add_error(ValidationError::new("workers.queue_capacity", "must be at least 1"));
        }

        if config.allocator.limit_bytes.is_some() && config.allocator.kind != AllocatorKind::Tracking {
            result.add_warning(ValidationWarning::new(
                "allocator.limit_bytes",
                "ignored unless allocator.kind = \"tracking\"",
            ));
        }

        if config.teardown.max_drain_iterations == 0 {
            result.add_error(ValidationError::new(
                "teardown.max_drain_iterations",
                "must be at least 1",
            ));
        }

        result
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
