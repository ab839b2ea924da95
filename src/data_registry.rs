use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::dataset::Dataset;

#[derive(Default)]
struct RegistryInner {
    datasets: HashMap<String, Arc<Dataset>>,
    // registration order, oldest first
    order: Vec<String>,
}

/// In-memory store of completed datasets keyed by id.
///
/// Datasets are immutable once inserted; readers get an `Arc` and drop the
/// lock before doing any work on the rows.
#[derive(Clone, Default)]
pub struct DatasetRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl DatasetRegistry {
    pub async fn insert(&self, dataset: Dataset) -> Arc<Dataset> {
        let dataset = Arc::new(dataset);
        let mut guard = self.inner.write().await;
        guard.order.push(dataset.id.clone());
        guard.datasets.insert(dataset.id.clone(), dataset.clone());
        dataset
    }

    pub async fn get(&self, dataset_id: &str) -> Option<Arc<Dataset>> {
        let guard = self.inner.read().await;
        guard.datasets.get(dataset_id).cloned()
    }

    /// Most recently registered first.
    pub async fn list_recent(&self, limit: usize) -> Vec<Arc<Dataset>> {
        let guard = self.inner.read().await;
        guard
            .order
            .iter()
            .rev()
            .filter_map(|id| guard.datasets.get(id).cloned())
            .take(limit)
            .collect()
    }

    pub async fn active_id(&self) -> Option<String> {
        let guard = self.inner.read().await;
        guard.order.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.datasets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.datasets.clear();
        guard.order.clear();
    }
}
