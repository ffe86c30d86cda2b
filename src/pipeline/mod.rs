//! Merge-then-render pipeline
//!
//! Two independent cache instances: the merge stage keyed by merged store
//! path and the render stage keyed by image path. A request for a merged
//! render runs the merge on demand, then the render on demand; each result
//! is cached and expired on its own.

pub mod merge;
pub mod render;

pub use merge::MergeStage;
pub use render::RenderStage;

use crate::cache::{remaining_lifetime, ArtifactCache, SweepReport};
use crate::config::Config;
use crate::engine::{MergeEngine, MinetestMapper, RenderEngine, RenderOptions, SqliteMergeEngine};
use crate::error::{MapmergeError, MapmergeResult};
use crate::store::{ArtifactLayout, CompositeKey, ContentKey, ContentStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

/// Size and remaining lifetime of a merged store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    /// Bytes on disk
    pub size: u64,
    /// Milliseconds until the artifact expires
    pub lifetime: u64,
}

/// Uploads in, merged stores and renders out
pub struct Pipeline {
    store: ContentStore,
    layout: ArtifactLayout,
    merge: MergeStage,
    render: RenderStage,
}

impl Pipeline {
    pub fn new(
        store: ContentStore,
        layout: ArtifactLayout,
        merge_engine: Arc<dyn MergeEngine>,
        render_engine: Arc<dyn RenderEngine>,
        lifetime: Duration,
    ) -> Self {
        Self {
            store,
            layout,
            merge: MergeStage::new(
                ArtifactCache::new("temporary merge result", lifetime),
                merge_engine,
            ),
            render: RenderStage::new(
                ArtifactCache::new("temporary render", lifetime),
                render_engine,
            ),
        }
    }

    /// Build the pipeline with the SQLite merger and `minetestmapper`
    pub fn from_config(config: &Config) -> MapmergeResult<Self> {
        Ok(Self::new(
            ContentStore::new(&config.storage.uploads_dir),
            ArtifactLayout::new(&config.storage.artifacts_dir),
            Arc::new(SqliteMergeEngine::new(&config.merge.table)?),
            Arc::new(MinetestMapper::new(&config.render)),
            config.artifacts.lifetime(),
        ))
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn merge_stage(&self) -> &MergeStage {
        &self.merge
    }

    pub fn render_stage(&self) -> &RenderStage {
        &self.render
    }

    /// Lifetime of every derived artifact
    pub fn lifetime(&self) -> Duration {
        self.merge.cache().lifetime()
    }

    /// Merged store for `keys`, producing it if needed
    ///
    /// Every input must exist before any merge work starts.
    pub async fn merged_store(&self, keys: &CompositeKey) -> MapmergeResult<PathBuf> {
        let inputs = self.store.require_all(keys.keys()).await?;
        let output = self.layout.merged_store(keys);
        self.merge.merge_if_absent(&inputs, &output).await?;
        Ok(output)
    }

    /// Render of the merged store for `keys`
    pub async fn merged_render(
        &self,
        keys: &CompositeKey,
        options: &RenderOptions,
    ) -> MapmergeResult<PathBuf> {
        let merged = self.merged_store(keys).await?;
        let image = self.layout.merged_render(keys);
        self.render.render_if_absent(&merged, &image, options).await?;
        Ok(image)
    }

    /// Render of a single upload
    pub async fn single_render(
        &self,
        key: &ContentKey,
        options: &RenderOptions,
    ) -> MapmergeResult<PathBuf> {
        let input = self.store.require(key).await?;
        let image = self.layout.single_render(key);
        self.render.render_if_absent(&input, &image, options).await?;
        Ok(image)
    }

    /// Size and remaining lifetime of the merged store for `keys`
    pub async fn merged_info(&self, keys: &CompositeKey) -> MapmergeResult<ArtifactInfo> {
        let merged = self.merged_store(keys).await?;
        let metadata = fs::metadata(&merged)
            .await
            .map_err(|e| MapmergeError::io(format!("reading metadata of {}", merged.display()), e))?;

        let created = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let remaining = remaining_lifetime(created, self.lifetime());

        Ok(ArtifactInfo {
            size: metadata.len(),
            lifetime: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Re-arm expiry for artifacts left by a previous process
    pub async fn sweep(&self) -> MapmergeResult<SweepReport> {
        self.merge
            .cache()
            .reaper()
            .sweep(self.layout.dir(), self.lifetime(), ArtifactLayout::is_artifact_name)
            .await
    }
}
