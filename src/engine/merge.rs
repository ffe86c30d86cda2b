//! Merge engine: transactional upsert of one map store into another

use crate::config::schema::MergeConfig;
use crate::error::{MapmergeError, MapmergeResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Applies the records of `top` onto `base`
///
/// Each call is one all-or-nothing pass: every record of `top` is
/// inserted into `base` or replaces the record with the same primary key.
#[async_trait]
pub trait MergeEngine: Send + Sync {
    async fn upsert(&self, base: &Path, top: &Path) -> MapmergeResult<()>;
}

/// SQLite implementation: `ATTACH` + `INSERT OR REPLACE` in a transaction
pub struct SqliteMergeEngine {
    table: String,
}

impl SqliteMergeEngine {
    /// Create an engine merging `table`
    ///
    /// The name is interpolated into SQL, so only `[A-Za-z0-9_]` is
    /// accepted.
    pub fn new(table: impl Into<String>) -> MapmergeResult<Self> {
        let table = table.into();
        if !MergeConfig::is_valid_table(&table) {
            return Err(MapmergeError::Internal(format!(
                "invalid merge table name '{}'",
                table
            )));
        }
        Ok(Self { table })
    }
}

#[async_trait]
impl MergeEngine for SqliteMergeEngine {
    async fn upsert(&self, base: &Path, top: &Path) -> MapmergeResult<()> {
        let base = base.to_path_buf();
        let top = top.to_path_buf();
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || upsert_blocking(&base, &top, &table))
            .await
            .map_err(|e| MapmergeError::Internal(format!("merge task failed: {}", e)))?
    }
}

fn upsert_blocking(base: &Path, top: &Path, table: &str) -> MapmergeResult<()> {
    let merge_err = |source: rusqlite::Error| MapmergeError::Merge {
        base: PathBuf::from(base),
        top: PathBuf::from(top),
        source,
    };

    debug!("Upserting {} from '{}' into '{}'", table, top.display(), base.display());

    // base must already exist; top is attached read-only so a missing top
    // fails instead of being created empty
    let mut conn = Connection::open_with_flags(
        base,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(merge_err)?;
    conn.execute("ATTACH DATABASE ?1 AS top", params![read_only_uri(top)])
        .map_err(merge_err)?;

    let tx = conn.transaction().map_err(merge_err)?;
    tx.execute(
        &format!(
            "INSERT OR REPLACE INTO main.\"{table}\" SELECT * FROM top.\"{table}\""
        ),
        [],
    )
    .map_err(merge_err)?;
    tx.commit().map_err(merge_err)?;

    conn.execute("DETACH DATABASE top", []).map_err(merge_err)?;
    Ok(())
}

/// `file:` URI opening `path` with `mode=ro`
fn read_only_uri(path: &Path) -> String {
    let mut uri = String::from("file:");
    for c in path.to_string_lossy().chars() {
        match c {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            _ => uri.push(c),
        }
    }
    uri.push_str("?mode=ro");
    uri
}
