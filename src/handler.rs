//! Error handlers decide what happens to failures reported through
//! [`Checked`](crate::Checked), the non-`Result` convenience layer of a store.
//!
//! The `Result` returning API never consults the handlers.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::error::ConfigError;

pub trait ErrorHandler: Send + Sync {
    fn handle(&self, err: &ConfigError);
}

/// Aborts by panicking with the error message. The default chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicErrorHandler;

impl ErrorHandler for PanicErrorHandler {
    fn handle(&self, err: &ConfigError) {
        panic!("config error: {err}");
    }
}

/// Logs the error and lets the caller continue with a zero value.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, err: &ConfigError) {
        error!(category = ?err.category(), "config error: {err}");
    }
}

/// Keeps the rendered errors around for later inspection.
#[derive(Debug, Default, Clone)]
pub struct CollectingErrorHandler {
    errors: Arc<Mutex<Vec<String>>>,
}

impl CollectingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}

impl ErrorHandler for CollectingErrorHandler {
    fn handle(&self, err: &ConfigError) {
        self.errors.lock().push(err.to_string());
    }
}

/// Forwards to a closure, e.g. an error tracking sink.
pub struct FnErrorHandler<F>(pub F);

impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: Fn(&ConfigError) + Send + Sync,
{
    fn handle(&self, err: &ConfigError) {
        (self.0)(err)
    }
}

/// Pass `err` to every handler in order.
pub fn dispatch(handlers: &[Arc<dyn ErrorHandler>], err: &ConfigError) {
    for handler in handlers {
        handler.handle(err);
    }
}
