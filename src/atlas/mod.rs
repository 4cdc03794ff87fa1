//! Atlas: online folder clustering
//!
//! Maps a content embedding to the best existing destination folder. Each
//! folder is a [`FolderCluster`] whose centroid is maintained incrementally
//! as files are routed to it.
//!
//! ```text
//! best_match(embedding)
//!   1. centroid tier   clusters with sample_count >= min_samples
//!   2. name tier       clusters with sample_count <  min_samples
//!   3. static rules    category map matched against the caller's hint
//!   -> None           caller routes to review, never guesses
//! ```
//!
//! Every cluster sits behind its own lock, so an `update` to one folder is
//! exclusive with readers of that folder only.

pub mod cluster;
pub mod rules;

pub use cluster::{display_name, FolderCluster};
pub use rules::CategoryMap;

use crate::config::AtlasConfig;
use crate::error::{Error, Result};
use crate::external::Embedder;
use crate::vector::{self, Vector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Which tier of `best_match` produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Centroid,
    Name,
    StaticRule,
}

/// Result of [`Atlas::best_match`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderMatch {
    pub folder_id: String,
    /// Last category completed into the folder, else its display name
    pub category: String,
    /// Cosine similarity; 0 for static-rule matches
    pub similarity: f64,
    pub tier: MatchTier,
}

type ClusterTable = BTreeMap<String, Arc<RwLock<FolderCluster>>>;

/// Folder clustering index
pub struct Atlas {
    /// Ordered by folder id, which makes similarity ties deterministic
    clusters: Arc<RwLock<ClusterTable>>,
    embedder: Arc<dyn Embedder>,
    rules: CategoryMap,
    min_samples: u64,
    dimension: usize,
}

impl Atlas {
    /// Create an empty atlas. Fails if a category map pattern is invalid.
    pub fn new(config: &AtlasConfig, dimension: usize, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self {
            clusters: Arc::new(RwLock::new(BTreeMap::new())),
            embedder,
            rules: CategoryMap::new(&config.category_map)?,
            min_samples: config.min_samples_for_centroid,
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Seed a folder with a name embedding and no samples.
    ///
    /// Replaces the name embedding of an already known folder.
    pub async fn register(&self, folder_id: &str, name_embedding: Vector) -> Result<()> {
        vector::validate(&name_embedding, self.dimension)?;

        let mut clusters = self.clusters.write().await;
        match clusters.get(folder_id) {
            Some(existing) => {
                existing.write().await.name_embedding = Some(name_embedding);
            }
            None => {
                clusters.insert(
                    folder_id.to_string(),
                    Arc::new(RwLock::new(FolderCluster::new(
                        folder_id,
                        Some(name_embedding),
                        Utc::now(),
                    ))),
                );
            }
        }
        tracing::debug!(folder = %folder_id, "Registered folder");
        Ok(())
    }

    /// Fold a completed file's embedding into its folder's centroid.
    ///
    /// Creates the cluster on first sight, embedding the folder's display
    /// name for the name tier. `category` becomes the folder's label.
    pub async fn update(
        &self,
        folder_id: &str,
        embedding: &[f32],
        category: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        vector::validate(embedding, self.dimension)?;

        let existing = self.clusters.read().await.get(folder_id).cloned();
        let cluster = match existing {
            Some(cluster) => cluster,
            None => {
                // Embed outside the table lock; a racing insert wins
                let name_embedding = self.embed_folder_name(folder_id).await;
                let mut clusters = self.clusters.write().await;
                clusters
                    .entry(folder_id.to_string())
                    .or_insert_with(|| {
                        Arc::new(RwLock::new(FolderCluster::new(folder_id, name_embedding, now)))
                    })
                    .clone()
            }
        };

        let mut guard = cluster.write().await;
        guard.absorb(embedding, now)?;
        if let Some(category) = category {
            guard.category = Some(category.to_string());
        }
        tracing::debug!(
            folder = %folder_id,
            samples = guard.sample_count(),
            "Updated folder centroid"
        );
        Ok(())
    }

    async fn embed_folder_name(&self, folder_id: &str) -> Option<Vector> {
        let name = display_name(folder_id);
        match self.embedder.embed(&name).await {
            Ok(v) if v.len() == self.dimension => Some(v),
            Ok(v) => {
                tracing::warn!(
                    folder = %folder_id,
                    expected = self.dimension,
                    actual = v.len(),
                    "Folder name embedding has wrong dimension"
                );
                None
            }
            Err(e) => {
                tracing::warn!(folder = %folder_id, error = %e, "Failed to embed folder name");
                None
            }
        }
    }

    /// Best folder for `embedding`, or `None` when nothing clears `threshold`
    /// and no static rule matches `hint`.
    ///
    /// A similarity exactly equal to `threshold` matches. Equal similarities
    /// resolve to the lexicographically first folder id.
    pub async fn best_match(
        &self,
        embedding: &[f32],
        threshold: f64,
        hint: Option<&str>,
    ) -> Result<Option<FolderMatch>> {
        vector::validate(embedding, self.dimension)?;

        let clusters: Vec<Arc<RwLock<FolderCluster>>> =
            self.clusters.read().await.values().cloned().collect();

        let mut best_centroid: Option<FolderMatch> = None;
        let mut best_name: Option<FolderMatch> = None;

        for cluster in clusters {
            let c = cluster.read().await;
            let (slot, reference, tier) = match (c.centroid(), c.sample_count()) {
                (Some(centroid), n) if n >= self.min_samples => {
                    (&mut best_centroid, centroid, MatchTier::Centroid)
                }
                _ => match c.name_embedding.as_deref() {
                    Some(name) => (&mut best_name, name, MatchTier::Name),
                    None => continue,
                },
            };

            let similarity = vector::cosine_similarity(embedding, reference)?;
            if slot.as_ref().map_or(true, |b| similarity > b.similarity) {
                *slot = Some(FolderMatch {
                    folder_id: c.folder_id.clone(),
                    category: label(&c),
                    similarity,
                    tier,
                });
            }
        }

        for candidate in [best_centroid, best_name].into_iter().flatten() {
            if candidate.similarity >= threshold {
                return Ok(Some(candidate));
            }
        }

        let folder = match hint.and_then(|h| self.rules.resolve(h)) {
            Some(folder) => folder.to_string(),
            None => return Ok(None),
        };
        let category = match self.get(&folder).await {
            Some(cluster) => label(&cluster),
            None => display_name(&folder),
        };
        Ok(Some(FolderMatch {
            folder_id: folder,
            category,
            similarity: 0.0,
            tier: MatchTier::StaticRule,
        }))
    }

    /// Copy of one cluster.
    pub async fn get(&self, folder_id: &str) -> Option<FolderCluster> {
        let cluster = self.clusters.read().await.get(folder_id).cloned()?;
        let guard = cluster.read().await;
        Some(guard.clone())
    }

    pub async fn len(&self) -> usize {
        self.clusters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clusters.read().await.is_empty()
    }

    /// Copy of every cluster, ordered by folder id.
    pub async fn snapshot(&self) -> Vec<FolderCluster> {
        let clusters: Vec<Arc<RwLock<FolderCluster>>> =
            self.clusters.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            out.push(cluster.read().await.clone());
        }
        out
    }

    /// Replace the cluster table. Clusters with malformed vectors are
    /// skipped; returns the number restored.
    pub async fn restore(&self, snapshot: Vec<FolderCluster>) -> usize {
        let mut table = ClusterTable::new();
        for cluster in snapshot {
            if let Err(e) = self.check_cluster(&cluster) {
                tracing::warn!(folder = %cluster.folder_id, error = %e, "Skipping cluster on restore");
                continue;
            }
            table.insert(cluster.folder_id.clone(), Arc::new(RwLock::new(cluster)));
        }
        let restored = table.len();
        *self.clusters.write().await = table;
        restored
    }

    fn check_cluster(&self, cluster: &FolderCluster) -> Result<()> {
        match (cluster.centroid(), cluster.sample_count()) {
            (Some(c), n) if n > 0 => vector::validate(c, self.dimension)?,
            (None, 0) => {}
            _ => {
                return Err(Error::InvalidInput(
                    "centroid and sample_count disagree".to_string(),
                ))
            }
        }
        if let Some(name) = &cluster.name_embedding {
            vector::validate(name, self.dimension)?;
        }
        Ok(())
    }
}

fn label(cluster: &FolderCluster) -> String {
    cluster
        .category
        .clone()
        .unwrap_or_else(|| cluster.display_name())
}
