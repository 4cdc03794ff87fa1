//! Folder cluster: one destination folder's semantic identity

use crate::error::Result;
use crate::vector::{self, Vector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A destination folder represented as a cluster of the files routed to it.
///
/// `centroid` is the running mean of every content embedding absorbed so
/// far and is defined only once `sample_count >= 1`. The two fields are only
/// ever changed together, by [`FolderCluster::absorb`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderCluster {
    pub folder_id: String,
    centroid: Option<Vector>,
    sample_count: u64,
    /// Embedding of the folder's display name, the identity fallback
    pub name_embedding: Option<Vector>,
    /// Last category completed into this folder
    pub category: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FolderCluster {
    /// A cluster with no samples yet.
    pub fn new(folder_id: impl Into<String>, name_embedding: Option<Vector>, now: DateTime<Utc>) -> Self {
        Self {
            folder_id: folder_id.into(),
            centroid: None,
            sample_count: 0,
            name_embedding,
            category: None,
            updated_at: now,
        }
    }

    pub fn centroid(&self) -> Option<&[f32]> {
        self.centroid.as_deref()
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Fold one content embedding into the centroid.
    ///
    /// The new centroid is computed before anything is written, so a
    /// dimension mismatch leaves the cluster untouched.
    pub fn absorb(&mut self, embedding: &[f32], now: DateTime<Utc>) -> Result<()> {
        let next = match (&self.centroid, self.sample_count) {
            (Some(centroid), n) if n > 0 => vector::incremental_mean(centroid, embedding, n)?,
            _ => embedding.to_vec(),
        };
        self.centroid = Some(next);
        self.sample_count += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Human-readable folder name: last path component with `_`/`-` as spaces.
    pub fn display_name(&self) -> String {
        display_name(&self.folder_id)
    }
}

/// Last path component of `folder_id`, with `_` and `-` replaced by spaces.
pub fn display_name(folder_id: &str) -> String {
    let trimmed = folder_id.trim_end_matches(['/', '\\']);
    let last = trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed);
    last.replace(['_', '-'], " ")
}
