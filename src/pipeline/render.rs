//! Render stage: map store → image

use crate::cache::ArtifactCache;
use crate::engine::{RenderEngine, RenderOptions};
use crate::error::{MapmergeError, MapmergeResult};
use crate::store::layout::WORLD_DIR_PREFIX;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

/// Cached rendering of map stores
pub struct RenderStage {
    cache: ArtifactCache,
    engine: Arc<dyn RenderEngine>,
}

impl RenderStage {
    pub fn new(cache: ArtifactCache, engine: Arc<dyn RenderEngine>) -> Self {
        Self { cache, engine }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Make sure `output` holds a render of `input`
    ///
    /// The cache key is the output path alone; `options` only matter for
    /// the render that produces it.
    pub async fn render_if_absent(
        &self,
        input: &Path,
        output: &Path,
        options: &RenderOptions,
    ) -> MapmergeResult<()> {
        let engine = Arc::clone(&self.engine);
        let input = input.to_path_buf();
        let target = output.to_path_buf();
        let options = options.clone();

        self.cache
            .get_or_produce(output, move || render_into(engine, input, target, options))
            .await
    }
}

async fn render_into(
    engine: Arc<dyn RenderEngine>,
    input: PathBuf,
    output: PathBuf,
    options: RenderOptions,
) -> MapmergeResult<()> {
    let parent = output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent)
        .await
        .map_err(|e| MapmergeError::io(format!("creating {}", parent.display()), e))?;

    // The renderer wants a world directory; build one that is removed on
    // every exit path, including unwinding and cancellation.
    let world = tempfile::Builder::new()
        .prefix(WORLD_DIR_PREFIX)
        .tempdir_in(&parent)
        .map_err(|e| MapmergeError::io(format!("creating world directory in {}", parent.display()), e))?;

    let result = render_in_world(engine.as_ref(), world.path(), &input, &output, &options).await;

    let world_path = world.path().to_path_buf();
    if let Err(e) = world.close() {
        warn!("Failed to remove world directory '{}': {}", world_path.display(), e);
    }
    result
}

async fn render_in_world(
    engine: &dyn RenderEngine,
    world: &Path,
    input: &Path,
    output: &Path,
    options: &RenderOptions,
) -> MapmergeResult<()> {
    link_or_copy(input, &world.join(engine.world_file())).await?;

    // Render inside the world directory and publish by rename, so a
    // renderer dying mid-write never leaves a truncated image behind.
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    let staging = world.join(format!("render.{}", extension));

    engine.render(world, &staging, options).await?;

    fs::rename(&staging, output)
        .await
        .map_err(|e| MapmergeError::io(format!("publishing {}", output.display()), e))
}

/// Hard link `src` to `dst`, copying when linking is not possible
async fn link_or_copy(src: &Path, dst: &Path) -> MapmergeResult<()> {
    match fs::hard_link(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("Hard link of '{}' failed ({}), copying", src.display(), e);
            fs::copy(src, dst).await.map(|_| ()).map_err(|e| {
                MapmergeError::io(
                    format!("copying '{}' to '{}'", src.display(), dst.display()),
                    e,
                )
            })
        }
    }
}
