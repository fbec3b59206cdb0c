//! Project catalog: which token and staking contract a project settles into.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::ProjectConfig;

#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    async fn project(&self, id: u64) -> Option<ProjectConfig>;
}

/// Catalog loaded from the `[[projects]]` config entries.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    projects: HashMap<u64, ProjectConfig>,
}

impl StaticCatalog {
    pub fn new(projects: impl IntoIterator<Item = ProjectConfig>) -> Self {
        Self {
            projects: projects.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[async_trait]
impl ProjectCatalog for StaticCatalog {
    async fn project(&self, id: u64) -> Option<ProjectConfig> {
        self.projects.get(&id).cloned()
    }
}
