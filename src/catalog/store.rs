//! In-memory task catalog with lookup and seeded sampling.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use super::task::Task;
use crate::error::CatalogError;

/// An immutable collection of tasks keyed by task id.
///
/// The catalog preserves load order for iteration and offers seeded random
/// sampling so a batch over a subset is reproducible run to run.
#[derive(Debug, Clone)]
pub struct TaskCatalog {
    tasks: Vec<Task>,
    by_id: HashMap<String, usize>,
}

impl TaskCatalog {
    /// Build a catalog from loaded tasks.
    ///
    /// Duplicate task ids keep the first occurrence; later duplicates are
    /// dropped with a warning.
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut deduped = Vec::with_capacity(tasks.len());
        let mut by_id = HashMap::with_capacity(tasks.len());

        for task in tasks {
            if by_id.contains_key(&task.task_id) {
                warn!(task_id = %task.task_id, "duplicate task id in catalog, keeping first");
                continue;
            }
            by_id.insert(task.task_id.clone(), deduped.len());
            deduped.push(task);
        }

        Self {
            tasks: deduped,
            by_id,
        }
    }

    /// Number of tasks in the catalog.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the catalog holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All tasks in load order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Look up a task by id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::TaskNotFound` when the id is unknown.
    pub fn get(&self, task_id: &str) -> Result<&Task, CatalogError> {
        self.by_id
            .get(task_id)
            .map(|&idx| &self.tasks[idx])
            .ok_or_else(|| CatalogError::TaskNotFound(task_id.to_string()))
    }

    /// Resolve a list of task ids, failing on the first unknown id.
    pub fn get_many(&self, task_ids: &[String]) -> Result<Vec<Task>, CatalogError> {
        task_ids
            .iter()
            .map(|id| self.get(id).cloned())
            .collect()
    }

    /// Draw `n` distinct tasks at random.
    ///
    /// With a seed the draw is fully deterministic: the same catalog and
    /// seed always yield the same tasks in the same order. Without a seed
    /// the generator is seeded from OS entropy.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidRequest` when `n` is zero or exceeds
    /// the catalog size.
    pub fn sample(&self, n: usize, seed: Option<u64>) -> Result<Vec<Task>, CatalogError> {
        if n == 0 {
            return Err(CatalogError::InvalidRequest(
                "sample size must be greater than 0".to_string(),
            ));
        }
        if n > self.tasks.len() {
            return Err(CatalogError::InvalidRequest(format!(
                "sample size {} exceeds catalog size {}",
                n,
                self.tasks.len()
            )));
        }

        let mut rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };

        let mut indices: Vec<usize> = (0..self.tasks.len()).collect();
        indices.shuffle(&mut rng);
        indices.truncate(n);

        Ok(indices.into_iter().map(|i| self.tasks[i].clone()).collect())
    }
}
