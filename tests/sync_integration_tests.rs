//! End-to-end sync runs: scan both trees, diff, generate and execute batches.
//!
//! Generated scripts are POSIX shell here, so these run on unix only.
#![cfg(unix)]

use filetime::{set_file_mtime, FileTime};
use journsync::batch::ScriptFlavor;
use journsync::config::{Config, Operation, SyncArgs};
use journsync::engine::{SyncEngine, TaskResult};
use journsync::provider::ProviderSet;
use journsync::store::{FileStore, MemoryStore, SqliteStore, StorageKind};
use journsync::types::FileSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn args_for(source: &Path, target: &Path, batch: &Path) -> SyncArgs {
    SyncArgs {
        source: Some(source.to_string_lossy().into_owned()),
        target: Some(target.to_string_lossy().into_owned()),
        batch: Some(batch.to_path_buf()),
        operation: None,
        threads: 2,
        database: None,
        auto_teardown: false,
        journal: false,
        profile: None,
        rule: "standard".to_string(),
        patterns: Vec::new(),
        limits: Vec::new(),
        config: None,
    }
}

fn engine_for(mut config: Config, store: Box<dyn FileStore>) -> SyncEngine {
    config.settings.operation_delay_ms = 0;
    let providers = ProviderSet::standard(&config.settings);
    SyncEngine::with_parts(config, store, providers, Vec::new(), ScriptFlavor::Shell)
}

fn write_with_mtime(path: &Path, content: &[u8], unix_secs: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
    set_file_mtime(path, FileTime::from_unix_time(unix_secs, 0)).expect("set mtime");
}

fn run_dirs(batch: &Path) -> Vec<PathBuf> {
    match fs::read_dir(batch) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => Vec::new(),
    }
}

const JAN_2024: i64 = 1_704_067_200;
const FEB_2024: i64 = 1_706_745_600;

#[test]
fn test_missing_file_is_copied() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("a.txt"), b"0123456789", JAN_2024);

    let config = Config::try_from(args_for(&src, &dst, &batch)).expect("valid config");
    let summary = engine_for(config, Box::new(MemoryStore::new())).run().expect("run");

    assert_eq!(summary.total.pending_files, 1);
    assert_eq!(summary.total.pending_bytes, 10);
    assert_eq!(summary.total.jobs_succeeded, 1);
    assert_eq!(summary.total.jobs_failed, 0);
    assert_eq!(fs::read(dst.join("a.txt")).expect("read copy"), b"0123456789");
    assert!(run_dirs(&batch).is_empty(), "run folder is removed after execution");
}

#[test]
fn test_identical_trees_generate_nothing() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("b.txt"), b"same", JAN_2024);
    write_with_mtime(&dst.join("b.txt"), b"same", JAN_2024);

    let config = Config::try_from(args_for(&src, &dst, &batch)).expect("valid config");
    let summary = engine_for(config, Box::new(MemoryStore::new())).run().expect("run");

    assert_eq!(summary.total.pending_files, 0);
    assert_eq!(summary.total.jobs_succeeded + summary.total.jobs_failed, 0);
    assert!(!batch.exists() || run_dirs(&batch).is_empty());
}

#[test]
fn test_newer_rule_copies_only_newer_sources() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("c.txt"), b"new", FEB_2024);
    write_with_mtime(&dst.join("c.txt"), b"old", JAN_2024);
    write_with_mtime(&src.join("d.txt"), b"stale", JAN_2024);
    write_with_mtime(&dst.join("d.txt"), b"fresh", FEB_2024);

    let mut args = args_for(&src, &dst, &batch);
    args.rule = "newer".to_string();
    let config = Config::try_from(args).expect("valid config");
    let summary = engine_for(config, Box::new(MemoryStore::new())).run().expect("run");

    assert_eq!(summary.total.pending_files, 1);
    assert_eq!(fs::read(dst.join("c.txt")).expect("read c"), b"new");
    assert_eq!(fs::read(dst.join("d.txt")).expect("read d"), b"fresh");
}

#[test]
fn test_nested_folders_are_created() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("deep/er/inner.txt"), b"inner", JAN_2024);
    write_with_mtime(&src.join("it's here.txt"), b"quoted", JAN_2024);

    let config = Config::try_from(args_for(&src, &dst, &batch)).expect("valid config");
    engine_for(config, Box::new(MemoryStore::new())).run().expect("run");

    assert_eq!(fs::read(dst.join("deep/er/inner.txt")).expect("read nested"), b"inner");
    assert_eq!(fs::read(dst.join("it's here.txt")).expect("read quoted"), b"quoted");
}

#[test]
fn test_second_run_finds_nothing_pending() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("a.txt"), b"payload", JAN_2024);

    let config = Config::try_from(args_for(&src, &dst, &batch)).expect("valid config");
    let mut engine = engine_for(config, Box::new(MemoryStore::new()));
    engine.run().expect("first run");
    // cp does not preserve mtimes, so size alone decides under the larger rule
    let mut args = args_for(&src, &dst, &batch);
    args.rule = "larger".to_string();
    let config = Config::try_from(args).expect("valid config");
    let summary = engine_for(config, Box::new(MemoryStore::new())).run().expect("second run");

    assert_eq!(summary.total.target_files, 1);
    assert_eq!(summary.total.pending_files, 0);
}

#[test]
fn test_patterns_and_limits_narrow_the_scan() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("keep.log"), &[b'x'; 2048], JAN_2024);
    write_with_mtime(&src.join("small.log"), b"x", JAN_2024);
    write_with_mtime(&src.join("skip.txt"), &[b'x'; 2048], JAN_2024);

    let mut args = args_for(&src, &dst, &batch);
    args.patterns = vec!["*.LOG".to_string()];
    args.limits = vec!["sizemin=1K".to_string()];
    let config = Config::try_from(args).expect("valid config");
    let summary = engine_for(config, Box::new(MemoryStore::new())).run().expect("run");

    assert_eq!(summary.total.source_files, 1);
    assert!(dst.join("keep.log").exists());
    assert!(!dst.join("small.log").exists());
    assert!(!dst.join("skip.txt").exists());
}

#[test]
fn test_star_dot_star_in_pattern_list_copies_everything() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("photo.jpg"), b"jpg", JAN_2024);
    write_with_mtime(&src.join("notes.txt"), b"txt", JAN_2024);
    write_with_mtime(&src.join("Makefile"), b"all:", JAN_2024);

    let mut args = args_for(&src, &dst, &batch);
    args.patterns = vec!["*.*".to_string(), " ".to_string(), "*.jpg".to_string()];
    let config = Config::try_from(args).expect("valid config");
    let summary = engine_for(config, Box::new(MemoryStore::new())).run().expect("run");

    assert_eq!(summary.total.source_files, 3);
    assert!(dst.join("photo.jpg").exists());
    assert!(dst.join("notes.txt").exists());
    assert!(dst.join("Makefile").exists());
}

#[test]
fn test_sqlite_backend_end_to_end() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    for i in 0..25 {
        write_with_mtime(&src.join(format!("f{:02}.txt", i)), b"data", JAN_2024);
    }

    let mut args = args_for(&src, &dst, &batch);
    args.database = Some(temp.path().join("state/journsync.db"));
    let mut config = Config::try_from(args).expect("valid config");
    assert_eq!(config.storage, StorageKind::Sqlite);
    config.settings.file_batch_size = 10;

    let store = SqliteStore::open(&config.database).expect("open sqlite");
    let mut engine = engine_for(config, Box::new(store));
    let summary = engine.run().expect("run");

    assert_eq!(summary.total.pending_files, 25);
    assert_eq!(summary.total.jobs_succeeded, 3);
    assert_eq!(fs::read_dir(&dst).expect("read dst").count(), 25);
    assert_eq!(engine.store().record_count(FileSet::Source).expect("count"), 25);
}

#[test]
fn test_operations_run_stage_by_stage() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("a.txt"), b"abc", JAN_2024);

    let config = Config::try_from(args_for(&src, &dst, &batch)).expect("valid config");
    let mut engine = engine_for(config, Box::new(MemoryStore::new()));

    for (operation, copied) in [
        (Operation::Scan, false),
        (Operation::Process, false),
        (Operation::Run, true),
    ] {
        engine.set_operation(Some(operation));
        let summary = engine.run().expect("stage run");
        assert!(matches!(summary.tasks[0], TaskResult::Completed(_)));
        assert_eq!(dst.join("a.txt").exists(), copied, "after {:?}", operation);
    }
    assert_eq!(engine.store().pending_count().expect("count"), 1);
}

#[test]
fn test_profile_runs_every_enabled_task() {
    let temp = TempDir::new().expect("create temp dir");
    let root = temp.path();
    write_with_mtime(&root.join("one/a.txt"), b"1", JAN_2024);
    write_with_mtime(&root.join("two/b.txt"), b"2", JAN_2024);

    let profile = root.join("profile.json");
    let json = serde_json::json!({
        "tasks": [
            { "source_folder": root.join("one"), "target_folder": root.join("out1") },
            { "source_folder": root.join("two"), "target_folder": root.join("out2"), "rule": "Larger" },
            { "source_folder": root.join("missing"), "target_folder": root.join("out3"), "enabled": false }
        ]
    });
    fs::write(&profile, json.to_string()).expect("write profile");

    let mut args = args_for(root, root, &root.join("batch"));
    args.source = None;
    args.target = None;
    args.profile = Some(profile);
    let config = Config::try_from(args).expect("valid profile");
    assert_eq!(config.tasks.len(), 2);

    let mut engine = engine_for(config, Box::new(MemoryStore::new()));
    let summary = engine.run().expect("run");

    assert_eq!(summary.completed(), 2);
    assert!(root.join("out1/a.txt").exists());
    assert!(root.join("out2/b.txt").exists());
    // Profile runs release the store after every task
    assert_eq!(engine.store().record_count(FileSet::Source).expect("count"), 0);
}

#[test]
fn test_full_engine_writes_report_file() {
    let temp = TempDir::new().expect("create temp dir");
    let (src, dst, batch) = (temp.path().join("src"), temp.path().join("dst"), temp.path().join("batch"));
    write_with_mtime(&src.join("a.txt"), b"abc", JAN_2024);

    let mut config = Config::try_from(args_for(&src, &dst, &batch)).expect("valid config");
    config.settings.operation_delay_ms = 0;
    SyncEngine::new(config).expect("engine").run().expect("run");

    let reports: Vec<PathBuf> = fs::read_dir(&batch)
        .expect("read batch folder")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    assert_eq!(reports.len(), 1);
    let content = fs::read_to_string(&reports[0]).expect("read report");
    assert!(content.contains("[Task report]"));
    assert!(content.contains("[Sync report]"));
    assert!(content.contains("Processed files: 1"));
}
