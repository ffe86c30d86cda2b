//! Merge stage: N uploads → one merged store

use crate::cache::ArtifactCache;
use crate::engine::MergeEngine;
use crate::error::{MapmergeError, MapmergeResult};
use crate::store::layout::{MERGE_STAGING_PREFIX, STAGING_SUFFIX};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cached merge of ordered inputs
pub struct MergeStage {
    cache: ArtifactCache,
    engine: Arc<dyn MergeEngine>,
}

impl MergeStage {
    pub fn new(cache: ArtifactCache, engine: Arc<dyn MergeEngine>) -> Self {
        Self { cache, engine }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Make sure `output` holds the merge of `inputs`, in order
    ///
    /// The first input is the base; every later input overrides records
    /// with the same primary key. The output only appears once every pass
    /// has committed.
    pub async fn merge_if_absent(&self, inputs: &[PathBuf], output: &Path) -> MapmergeResult<()> {
        if inputs.is_empty() {
            return Err(MapmergeError::Internal(
                "merge requires at least one input".to_string(),
            ));
        }

        let engine = Arc::clone(&self.engine);
        let inputs = inputs.to_vec();
        let target = output.to_path_buf();

        self.cache
            .get_or_produce(output, move || merge_into(engine, inputs, target))
            .await
    }
}

async fn merge_into(
    engine: Arc<dyn MergeEngine>,
    inputs: Vec<PathBuf>,
    output: PathBuf,
) -> MapmergeResult<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| MapmergeError::io(format!("creating {}", parent.display()), e))?;
    }

    let staging = staging_path(&output);
    let result = merge_staged(engine.as_ref(), &inputs, &staging, &output).await;

    if result.is_err() {
        if let Err(e) = fs::remove_file(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staging file '{}': {}", staging.display(), e);
            }
        }
    }
    result
}

async fn merge_staged(
    engine: &dyn MergeEngine,
    inputs: &[PathBuf],
    staging: &Path,
    output: &Path,
) -> MapmergeResult<()> {
    let (base, tops) = inputs
        .split_first()
        .ok_or_else(|| MapmergeError::Internal("merge requires at least one input".to_string()))?;

    fs::copy(base, staging).await.map_err(|e| {
        MapmergeError::io(
            format!("copying '{}' to '{}'", base.display(), staging.display()),
            e,
        )
    })?;

    for top in tops {
        engine.upsert(staging, top).await?;
    }

    fs::rename(staging, output)
        .await
        .map_err(|e| MapmergeError::io(format!("publishing {}", output.display()), e))?;

    debug!("Merged {} inputs to '{}'", inputs.len(), output.display());
    Ok(())
}

/// Hidden, unique sibling of `output`
///
/// The name does not embed the output's own, which may already be close to
/// the filesystem's name length limit.
fn staging_path(output: &Path) -> PathBuf {
    output.with_file_name(format!("{}{}{}", MERGE_STAGING_PREFIX, Uuid::new_v4(), STAGING_SUFFIX))
}
