//! Naming of derived artifacts
//!
//! The path of a derived artifact is its cache key: two requests that
//! resolve to the same path share one computation and one file.

use crate::store::keys::{CompositeKey, ContentKey};
use std::path::{Path, PathBuf};

/// Name prefix of scoped renderer world directories
pub const WORLD_DIR_PREFIX: &str = ".world-";

/// Name prefix and suffix of in-progress merges
pub const MERGE_STAGING_PREFIX: &str = ".merge-";
pub const STAGING_SUFFIX: &str = ".partial";

/// Directory holding merged stores and rendered images
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Render of a single upload: `<dir>/<hash>.png`
    pub fn single_render(&self, key: &ContentKey) -> PathBuf {
        self.dir.join(format!("{}.png", key))
    }

    /// Merged store: `<dir>/merge_<h1>_<h2>….sqlite`
    pub fn merged_store(&self, keys: &CompositeKey) -> PathBuf {
        self.dir.join(format!("{}.sqlite", keys.artifact_stem()))
    }

    /// Render of a merged store: `<dir>/merge_<h1>_<h2>….png`
    pub fn merged_render(&self, keys: &CompositeKey) -> PathBuf {
        self.dir.join(format!("{}.png", keys.artifact_stem()))
    }

    /// Whether `name` is something this layout produces
    ///
    /// Renders, merged stores, world directories and merge staging files
    /// qualify; anything else in the directory belongs to someone else.
    pub fn is_artifact_name(name: &str) -> bool {
        if name.starts_with(WORLD_DIR_PREFIX) {
            return true;
        }
        if name.starts_with(MERGE_STAGING_PREFIX) && name.ends_with(STAGING_SUFFIX) {
            return true;
        }

        if let Some(stem) = name.strip_suffix(".png") {
            return ContentKey::parse(stem).is_ok() || Self::is_merge_stem(stem);
        }
        name.strip_suffix(".sqlite")
            .is_some_and(Self::is_merge_stem)
    }

    fn is_merge_stem(stem: &str) -> bool {
        stem.strip_prefix("merge_")
            .is_some_and(|joined| CompositeKey::parse(joined).is_ok())
    }
}
