//! Post-processors adjust a store after it has been constructed and before
//! anything reads records from it, e.g. deriving settings from others.
//!
//! They are kept in an explicit [`PostProcessors`] list and run in
//! descending priority. Equal priorities keep their insertion order.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::store::ConfigStore;

pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    /// Returns whether the store was changed.
    fn process(&self, store: &ConfigStore) -> Result<bool, ConfigError>;
}

/// A post-processor backed by a closure.
pub struct FnPostProcessor<F> {
    name: String,
    priority: i32,
    process: F,
}

impl<F> FnPostProcessor<F>
where
    F: Fn(&ConfigStore) -> Result<bool, ConfigError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, priority: i32, process: F) -> Self {
        Self {
            name: name.into(),
            priority,
            process,
        }
    }
}

impl<F> PostProcessor for FnPostProcessor<F>
where
    F: Fn(&ConfigStore) -> Result<bool, ConfigError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn process(&self, store: &ConfigStore) -> Result<bool, ConfigError> {
        (self.process)(store)
    }
}

#[derive(Clone, Default)]
pub struct PostProcessors {
    processors: Vec<Arc<dyn PostProcessor>>,
}

impl PostProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, processor: impl PostProcessor + 'static) -> Self {
        self.push(processor);
        self
    }

    pub fn push(&mut self, processor: impl PostProcessor + 'static) {
        self.processors.push(Arc::new(processor));
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run every processor against `store`, highest priority first. Returns
    /// the names of the processors that changed something. Stops at the
    /// first error.
    pub fn run(&self, store: &ConfigStore) -> Result<Vec<String>, ConfigError> {
        let mut ordered = self.processors.clone();
        ordered.sort_by_key(|p| Reverse(p.priority()));

        let mut applied = Vec::new();
        for processor in ordered {
            let changed = processor.process(store)?;
            if changed {
                debug!(
                    name = processor.name(),
                    priority = processor.priority(),
                    "post-processor changed the config"
                );
                applied.push(processor.name().to_string());
            } else {
                trace!(name = processor.name(), "post-processor left the config unchanged");
            }
        }

        Ok(applied)
    }
}

impl std::fmt::Debug for PostProcessors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|p| (p.name(), p.priority())))
            .finish()
    }
}
