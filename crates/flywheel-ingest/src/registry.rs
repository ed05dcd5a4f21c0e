//! Source adapter registry keyed by source-type tag: a name-keyed
//! `Arc<dyn SourceAdapter>` map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::SourceAdapter;

#[derive(Default, Clone)]
pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: impl SourceAdapter + 'static) {
        self.adapters.insert(adapter.source_type().to_string(), Arc::new(adapter));
    }

    pub fn get(&self, source_type: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(source_type).cloned()
    }
}
