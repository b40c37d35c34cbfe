// ABOUTME: Built-in task behaviors and the registry that maps type keys to them
// ABOUTME: Flow documents name behaviors by key; callers may register their own

pub mod command;
pub mod passthrough;

use std::collections::HashMap;
use std::sync::Arc;

use crate::task::{BaseTask, TaskBehavior};

pub use command::{CommandConfig, CommandTask};
pub use passthrough::PassthroughTask;

pub type BehaviorFactory = Arc<dyn Fn() -> Arc<dyn TaskBehavior> + Send + Sync>;

pub struct BehaviorRegistry {
    factories: HashMap<String, BehaviorFactory>,
}

impl BehaviorRegistry {
    /// Registry with the built-in behaviors
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register("noop", || Arc::new(BaseTask));
        registry.register("passthrough", || Arc::new(PassthroughTask));
        registry.register("command", || Arc::new(CommandTask));

        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register or replace the behavior created for `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn TaskBehavior> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn create(&self, kind: &str) -> Option<Arc<dyn TaskBehavior>> {
        self.factories.get(kind).map(|factory| factory())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn list_supported_tasks(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
