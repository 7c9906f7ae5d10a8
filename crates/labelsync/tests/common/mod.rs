#![allow(dead_code)]

use std::sync::Arc;

use labelsync::processors::TaskContext;
use labelsync::store::{LabelStore, MemoryStore, StoreFactory};
use labelsync::{Installation, MemoryQueue, RepoRef, TaskQueue};

pub const ORG: &str = "acme";

pub fn installation() -> Installation {
    Installation {
        id: 42,
        org: ORG.to_string(),
        is_paid_plan: false,
    }
}

pub fn repo(name: &str) -> RepoRef {
    RepoRef::new(ORG, name)
}

pub fn config_repo() -> RepoRef {
    repo("acme-labelsync")
}

/// A store whose configuration repository holds `yaml` on its default branch.
pub fn store_with_config(yaml: &str) -> MemoryStore {
    MemoryStore::new()
        .with_repo(config_repo(), vec![])
        .with_file(&config_repo(), "labelsync.yml", None, yaml)
}

pub fn context(store: &Arc<MemoryStore>, queue: &Arc<MemoryQueue>) -> TaskContext {
    TaskContext {
        installation: installation(),
        store: Arc::clone(store) as Arc<dyn LabelStore>,
        queue: Arc::clone(queue) as Arc<dyn TaskQueue>,
    }
}

/// Hands every token the same in-memory store.
pub struct SharedStore(pub Arc<MemoryStore>);

impl StoreFactory for SharedStore {
    fn for_token(&self, _token: &str) -> Arc<dyn LabelStore> {
        Arc::clone(&self.0) as Arc<dyn LabelStore>
    }
}
