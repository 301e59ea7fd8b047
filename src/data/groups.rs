//! Cluster membership for grouped observations.

use crate::error::{SimError, Result};
use std::collections::BTreeMap;

/// Cluster membership information.
///
/// `indices[g]` lists the row indices of cluster `g` in ascending order.
/// Clusters are ordered by their label, so the flattened indices form a
/// permutation of `0..n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Groups {
    labels: Vec<usize>,
    indices: Vec<Vec<usize>>,
}

impl Groups {
    /// Build groups from arbitrary integer labels.
    pub fn from_labels(labels: Vec<usize>) -> Result<Self> {
        if labels.is_empty() {
            return Err(SimError::EmptyData("group labels are empty".to_string()));
        }

        let mut by_label: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (row, &label) in labels.iter().enumerate() {
            by_label.entry(label).or_default().push(row);
        }

        Ok(Self {
            labels,
            indices: by_label.into_values().collect(),
        })
    }

    /// `n_obs / cluster_size` clusters of `cluster_size` consecutive rows.
    pub fn consecutive(n_obs: usize, cluster_size: usize) -> Result<Self> {
        if cluster_size == 0 || n_obs == 0 {
            return Err(SimError::InvalidParameter(format!(
                "cluster size and sample size must be positive (n={}, m={})",
                n_obs, cluster_size
            )));
        }
        if n_obs % cluster_size != 0 {
            return Err(SimError::InvalidParameter(format!(
                "sample size {} is not divisible by cluster size {}",
                n_obs, cluster_size
            )));
        }
        Self::from_labels((0..n_obs).map(|i| i / cluster_size).collect())
    }

    /// Row indices for every cluster.
    pub fn indices(&self) -> &[Vec<usize>] {
        &self.indices
    }

    /// Number of clusters.
    pub fn n_groups(&self) -> usize {
        self.indices.len()
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.labels.len()
    }
}
