//! Integration tests for mapmerge

use rusqlite::Connection;
use std::path::Path;

/// Create a map store with a `blocks` table
fn make_map(path: &Path, rows: &[(i64, &str)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch("CREATE TABLE blocks (pos INTEGER PRIMARY KEY, data BLOB NOT NULL);")
        .unwrap();
    for (pos, data) in rows {
        conn.execute(
            "INSERT INTO blocks (pos, data) VALUES (?1, ?2)",
            rusqlite::params![pos, data.as_bytes()],
        )
        .unwrap();
    }
}

fn read_map(path: &Path) -> Vec<(i64, String)> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT pos, data FROM blocks ORDER BY pos")
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            let data: Vec<u8> = row.get(1)?;
            Ok((row.get(0)?, String::from_utf8_lossy(&data).into_owned()))
        })
        .unwrap();
    rows.collect::<Result<Vec<_>, _>>().unwrap()
}

mod cli_tests {
    use super::{make_map, read_map};
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use mapmerge::config::Config;
    use mapmerge::store::{ContentKey, ContentStore};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn mapmerge() -> Command {
        let mut cmd = cargo_bin_cmd!("mapmerge");
        cmd.env_remove("MAPMERGE_CONFIG").env_remove("PORT");
        cmd
    }

    /// Config file pointing every directory into `dir`
    fn write_config(dir: &Path, renderer: Option<&Path>) -> PathBuf {
        let mut config = Config::default();
        config.storage.uploads_dir = dir.join("uploads");
        config.storage.artifacts_dir = dir.join("tmp");
        if let Some(program) = renderer {
            config.render.program = program.display().to_string();
        }

        let path = dir.join("config.toml");
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        path
    }

    async fn upload(dir: &Path, pos: i64, data: &str) -> ContentKey {
        let scratch = dir.join(format!("scratch-{pos}.sqlite"));
        make_map(&scratch, &[(pos, data), (100, data)]);
        let bytes = std::fs::read(&scratch).unwrap();
        ContentStore::new(dir.join("uploads"))
            .store(&bytes)
            .await
            .unwrap()
    }

    #[test]
    fn help_displays() {
        mapmerge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("merge and render uploaded map databases"));
    }

    #[test]
    fn serve_help_names_key_hash() {
        mapmerge()
            .args(["serve", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("SHA-256, not MD5"));
    }

    #[test]
    fn version_displays() {
        mapmerge()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("mapmerge"));
    }

    #[test]
    fn config_path() {
        mapmerge()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        mapmerge()
            .args(["--config"])
            .arg(dir.path().join("missing.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[render]"))
            .stdout(predicate::str::contains("lifetime_secs = 600"));
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("config.toml");
        mapmerge()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(path.exists());
    }

    #[test]
    fn invalid_config_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[artifacts]\nlifetime_secs = \"soon\"\n").unwrap();
        mapmerge()
            .arg("--config")
            .arg(&path)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn merge_rejects_bad_hash() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), None);
        mapmerge()
            .arg("--config")
            .arg(&config)
            .args(["merge", &"a".repeat(32), "XYZ"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Illegal map hash 'XYZ'."));
        assert!(!dir.path().join("tmp").exists());
    }

    #[test]
    fn merge_rejects_unknown_map() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), None);
        mapmerge()
            .arg("--config")
            .arg(&config)
            .args(["merge", &"a".repeat(32), &"b".repeat(32)])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown map."))
            .stderr(predicate::str::contains("Hint:"));
        assert!(!dir.path().join("tmp").exists());
    }

    #[tokio::test]
    async fn merge_later_map_wins() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), None);
        let a = upload(dir.path(), 1, "from-a").await;
        let b = upload(dir.path(), 2, "from-b").await;

        mapmerge()
            .arg("--config")
            .arg(&config)
            .args(["merge", a.as_str(), b.as_str()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Merged"));

        let merged = dir.path().join("tmp").join(format!("merge_{a}_{b}.sqlite"));
        assert_eq!(
            read_map(&merged),
            vec![
                (1, "from-a".to_string()),
                (2, "from-b".to_string()),
                (100, "from-b".to_string()),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn render_runs_configured_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-mapper.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             while [ $# -gt 0 ]; do\n\
               case \"$1\" in\n\
                 -i) world=\"$2\"; shift ;;\n\
                 -o) out=\"$2\"; shift ;;\n\
               esac\n\
               shift\n\
             done\n\
             cp \"$world/map.sqlite\" \"$out\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = write_config(dir.path(), Some(&script));
        let a = upload(dir.path(), 1, "a").await;

        mapmerge()
            .arg("--config")
            .arg(&config)
            .args(["render", a.as_str(), "--draw-scale"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Rendered"));

        let image = dir.path().join("tmp").join(format!("{a}.png"));
        assert!(image.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("tmp"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "{leftovers:?}");
    }
}

mod pipeline_tests {
    use super::{make_map, read_map};
    use async_trait::async_trait;
    use mapmerge::engine::{MergeEngine, RenderEngine, RenderOptions, SqliteMergeEngine};
    use mapmerge::pipeline::Pipeline;
    use mapmerge::store::{ArtifactLayout, CompositeKey, ContentKey, ContentStore};
    use mapmerge::{MapmergeError, MapmergeResult};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Counts upserts, slowed down so concurrent callers overlap
    struct CountingMerge {
        inner: SqliteMergeEngine,
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl MergeEngine for CountingMerge {
        async fn upsert(&self, base: &Path, top: &Path) -> MapmergeResult<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.inner.upsert(base, top).await
        }
    }

    #[derive(Default)]
    struct CountingRender {
        renders: AtomicUsize,
    }

    #[async_trait]
    impl RenderEngine for CountingRender {
        async fn render(
            &self,
            world_dir: &Path,
            output: &Path,
            _options: &RenderOptions,
        ) -> MapmergeResult<()> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            tokio::fs::copy(world_dir.join(self.world_file()), output)
                .await
                .map(|_| ())
                .map_err(|e| MapmergeError::io("copying world", e))
        }

        fn world_file(&self) -> &str {
            "map.sqlite"
        }
    }

    struct Fixture {
        dir: TempDir,
        pipeline: Arc<Pipeline>,
        merge: Arc<CountingMerge>,
        render: Arc<CountingRender>,
    }

    impl Fixture {
        fn new(lifetime: Duration) -> Self {
            let dir = TempDir::new().unwrap();
            let merge = Arc::new(CountingMerge {
                inner: SqliteMergeEngine::new("blocks").unwrap(),
                upserts: AtomicUsize::new(0),
            });
            let render = Arc::new(CountingRender::default());
            let pipeline = Pipeline::new(
                ContentStore::new(dir.path().join("uploads")),
                ArtifactLayout::new(dir.path().join("tmp")),
                merge.clone(),
                render.clone(),
                lifetime,
            );
            Self {
                dir,
                pipeline: Arc::new(pipeline),
                merge,
                render,
            }
        }

        async fn upload(&self, rows: &[(i64, &str)]) -> ContentKey {
            let scratch = self
                .dir
                .path()
                .join(format!("scratch-{}.sqlite", uuid::Uuid::new_v4()));
            make_map(&scratch, rows);
            let bytes = std::fs::read(&scratch).unwrap();
            self.pipeline.store().store(&bytes).await.unwrap()
        }

        fn artifacts(&self) -> PathBuf {
            self.dir.path().join("tmp")
        }
    }

    fn composite(keys: &[&ContentKey]) -> CompositeKey {
        CompositeKey::new(keys.iter().map(|k| (*k).clone()).collect()).unwrap()
    }

    #[tokio::test]
    async fn order_decides_precedence() {
        let fixture = Fixture::new(Duration::from_secs(60));
        let a = fixture.upload(&[(1, "a1"), (2, "a2")]).await;
        let b = fixture.upload(&[(2, "b2"), (3, "b3")]).await;

        let ab = fixture.pipeline.merged_store(&composite(&[&a, &b])).await.unwrap();
        let ba = fixture.pipeline.merged_store(&composite(&[&b, &a])).await.unwrap();

        assert_ne!(ab, ba);
        assert_eq!(
            read_map(&ab),
            vec![(1, "a1".into()), (2, "b2".into()), (3, "b3".into())]
        );
        assert_eq!(
            read_map(&ba),
            vec![(1, "a1".into()), (2, "a2".into()), (3, "b3".into())]
        );
    }

    #[tokio::test]
    async fn concurrent_identical_requests_merge_once() {
        let fixture = Fixture::new(Duration::from_secs(60));
        let a = fixture.upload(&[(1, "a")]).await;
        let b = fixture.upload(&[(2, "b")]).await;
        let keys = composite(&[&a, &b]);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pipeline = Arc::clone(&fixture.pipeline);
            let keys = keys.clone();
            tasks.push(tokio::spawn(async move {
                pipeline.merged_render(&keys, &RenderOptions::default()).await
            }));
        }

        let mut outputs = Vec::new();
        for task in tasks {
            outputs.push(task.await.unwrap().unwrap());
        }

        assert!(outputs.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(fixture.merge.upserts.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.render.renders.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.pipeline.merge_stage().cache().in_flight(), 0);
        assert_eq!(fixture.pipeline.render_stage().cache().in_flight(), 0);
    }

    #[tokio::test]
    async fn three_way_merge_applies_in_sequence() {
        let fixture = Fixture::new(Duration::from_secs(60));
        let a = fixture.upload(&[(1, "a")]).await;
        let b = fixture.upload(&[(1, "b"), (2, "b")]).await;
        let c = fixture.upload(&[(2, "c")]).await;

        let merged = fixture
            .pipeline
            .merged_store(&composite(&[&a, &b, &c]))
            .await
            .unwrap();

        assert_eq!(read_map(&merged), vec![(1, "b".into()), (2, "c".into())]);
        assert_eq!(fixture.merge.upserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_input_creates_nothing() {
        let fixture = Fixture::new(Duration::from_secs(60));
        let a = fixture.upload(&[(1, "a")]).await;
        let missing = ContentKey::parse(&"f".repeat(32)).unwrap();

        let err = fixture
            .pipeline
            .merged_render(&composite(&[&a, &missing]), &RenderOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(!fixture.artifacts().exists());
        assert_eq!(fixture.merge.upserts.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.render.renders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn artifacts_expire_and_are_produced_again() {
        let fixture = Fixture::new(Duration::from_millis(300));
        let a = fixture.upload(&[(1, "a")]).await;
        let b = fixture.upload(&[(2, "b")]).await;
        let keys = composite(&[&a, &b]);

        let merged = fixture.pipeline.merged_store(&keys).await.unwrap();
        assert!(merged.exists());

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(!merged.exists());

        fixture.pipeline.merged_store(&keys).await.unwrap();
        assert!(merged.exists());
        assert_eq!(fixture.merge.upserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cached_store_serves_without_recomputing() {
        let fixture = Fixture::new(Duration::from_secs(60));
        let a = fixture.upload(&[(1, "a")]).await;
        let b = fixture.upload(&[(2, "b")]).await;
        let keys = composite(&[&a, &b]);

        fixture.pipeline.merged_store(&keys).await.unwrap();
        let info = fixture.pipeline.merged_info(&keys).await.unwrap();

        assert_eq!(fixture.merge.upserts.load(Ordering::SeqCst), 1);
        assert!(info.size > 0);
        assert!(info.lifetime <= 60_000);
    }

    #[tokio::test]
    async fn startup_sweep_spares_uploads_inside_artifact_dir() {
        let dir = TempDir::new().unwrap();
        let artifacts = dir.path().join("shared");
        let pipeline = Pipeline::new(
            ContentStore::new(artifacts.join("map_uploads")),
            ArtifactLayout::new(&artifacts),
            Arc::new(SqliteMergeEngine::new("blocks").unwrap()),
            Arc::new(CountingRender::default()),
            Duration::from_millis(100),
        );

        let scratch = dir.path().join("scratch.sqlite");
        make_map(&scratch, &[(1, "a")]);
        let key = pipeline
            .store()
            .store(&std::fs::read(&scratch).unwrap())
            .await
            .unwrap();

        let leftover = pipeline.layout().single_render(&key);
        let notes = artifacts.join("notes.txt");
        std::fs::write(&leftover, b"png from an earlier run").unwrap();
        std::fs::write(&notes, b"operator notes").unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let report = pipeline.sweep().await.unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped, 2);
        assert!(!leftover.exists());
        assert!(notes.exists());
        assert!(pipeline.store().exists(&key).await);
    }
}
