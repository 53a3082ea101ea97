//! Problem catalog collaborator seam
//!
//! The core never stores problem content. It needs exactly two things from
//! the catalog: one valid problem id for a random-mode start, and display
//! fields for an id it already holds. The selection policy lives behind the
//! trait and is swappable.

use crate::error::{ArenaError, Result};
use crate::types::ProblemId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Display fields for one problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemInfo {
    pub id: ProblemId,
    pub title: String,
    pub difficulty: Difficulty,
}

#[async_trait]
pub trait ProblemCatalog: Send + Sync {
    /// Pick one valid problem id for a random-mode start.
    async fn pick_random(&self) -> Result<ProblemId>;

    /// Resolve an id to its display fields.
    async fn resolve(&self, id: ProblemId) -> Result<ProblemInfo>;
}

/// Fixed in-memory catalog with uniform random selection.
pub struct StaticCatalog {
    problems: Vec<ProblemInfo>,
}

impl StaticCatalog {
    pub fn new(problems: Vec<ProblemInfo>) -> Self {
        Self { problems }
    }
}

#[async_trait]
impl ProblemCatalog for StaticCatalog {
    async fn pick_random(&self) -> Result<ProblemId> {
        use rand::Rng;
        if self.problems.is_empty() {
            return Err(ArenaError::Storage("no problems available".to_string()));
        }
        let index = rand::thread_rng().gen_range(0..self.problems.len());
        Ok(self.problems[index].id)
    }

    async fn resolve(&self, id: ProblemId) -> Result<ProblemInfo> {
        self.problems
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| ArenaError::Storage(format!("unknown problem: {id}")))
    }
}
