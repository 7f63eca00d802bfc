//! Store and diff integration tests
//!
//! Both backends must agree on the pending set for every rule, and pending
//! pagination must return every record exactly once.

use chrono::{DateTime, Duration, TimeZone, Utc};
use journsync::store::{FileStore, MemoryStore, SqliteStore};
use journsync::types::{FileRecord, FileSet, Rule};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ═══════════════════════════════════════════════════════════
// Test Helpers
// ═══════════════════════════════════════════════════════════

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("valid date")
}

fn backends() -> Vec<(&'static str, Box<dyn FileStore>)> {
    let mut memory: Box<dyn FileStore> = Box::new(MemoryStore::new());
    let mut sqlite: Box<dyn FileStore> = Box::new(SqliteStore::open_in_memory().expect("open sqlite"));
    memory.initialize().expect("init memory");
    sqlite.initialize().expect("init sqlite");
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn pending_paths(store: &dyn FileStore) -> Vec<String> {
    let mut paths = Vec::new();
    let mut cursor = 0;
    loop {
        let page = store.pending_page(cursor, 2).expect("pending page");
        let Some(last) = page.last() else {
            break;
        };
        cursor = last.id;
        paths.extend(page.into_iter().map(|p| p.path));
    }
    paths
}

fn diff(store: &mut dyn FileStore, source: &[FileRecord], target: &[FileRecord], rule: Rule) -> Vec<String> {
    store.prepare_set(FileSet::Source).expect("prepare source");
    store.prepare_set(FileSet::Target).expect("prepare target");
    store.save(FileSet::Source, source).expect("save source");
    store.save(FileSet::Target, target).expect("save target");
    store.compute_diff(rule).expect("diff");
    pending_paths(store)
}

// ═══════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════

#[test]
fn test_missing_target_file_is_pending() {
    for (name, mut store) in backends() {
        let source = vec![FileRecord::new("a.txt", 10, at(2024, 3, 1))];
        let pending = diff(store.as_mut(), &source, &[], Rule::Standard);
        assert_eq!(pending, vec!["a.txt".to_string()], "backend {}", name);

        let stats = store.pending_count().expect("count");
        assert_eq!(stats, 1, "backend {}", name);
    }
}

#[test]
fn test_identical_file_is_not_pending() {
    for (name, mut store) in backends() {
        let file = FileRecord::new("b.txt", 42, at(2024, 3, 1));
        let pending = diff(store.as_mut(), &[file.clone()], &[file], Rule::Standard);
        assert!(pending.is_empty(), "backend {}", name);
    }
}

#[test]
fn test_newer_rule_respects_direction() {
    for (name, mut store) in backends() {
        let newer = FileRecord::new("c.txt", 5, at(2024, 2, 1));
        let older = FileRecord::new("c.txt", 5, at(2024, 1, 1));

        let pending = diff(store.as_mut(), &[newer.clone()], &[older.clone()], Rule::Newer);
        assert_eq!(pending, vec!["c.txt".to_string()], "backend {}", name);

        let pending = diff(store.as_mut(), &[older], &[newer], Rule::Newer);
        assert!(pending.is_empty(), "backend {}", name);
    }
}

#[test]
fn test_larger_rule_ignores_time() {
    for (name, mut store) in backends() {
        let source = vec![
            FileRecord::new("grew.bin", 200, at(2020, 1, 1)),
            FileRecord::new("shrank.bin", 10, at(2030, 1, 1)),
        ];
        let target = vec![
            FileRecord::new("grew.bin", 100, at(2030, 1, 1)),
            FileRecord::new("shrank.bin", 20, at(2020, 1, 1)),
        ];
        let pending = diff(store.as_mut(), &source, &target, Rule::Larger);
        assert_eq!(pending, vec!["grew.bin".to_string()], "backend {}", name);
    }
}

#[test]
fn test_keys_compare_without_case() {
    for (name, mut store) in backends() {
        let source = vec![FileRecord::new("Docs/Report.PDF", 7, at(2024, 1, 1))];
        let target = vec![FileRecord::new("docs/report.pdf", 7, at(2024, 1, 1))];
        let pending = diff(store.as_mut(), &source, &target, Rule::Standard);
        assert!(pending.is_empty(), "backend {}", name);
    }
}

#[test]
fn test_pending_preserves_source_spelling_and_order() {
    for (name, mut store) in backends() {
        let source: Vec<FileRecord> = ["Zeta.txt", "alpha.txt", "Mid/File.txt"]
            .iter()
            .map(|p| FileRecord::new(*p, 1, at(2024, 1, 1)))
            .collect();
        let pending = diff(store.as_mut(), &source, &[], Rule::Standard);
        assert_eq!(
            pending,
            vec!["Zeta.txt".to_string(), "alpha.txt".to_string(), "Mid/File.txt".to_string()],
            "backend {}",
            name
        );
    }
}

#[test]
fn test_pagination_is_exhaustive_and_non_overlapping() {
    for (name, mut store) in backends() {
        let source: Vec<FileRecord> = (0..2503)
            .map(|i| FileRecord::new(format!("dir{}/f{}.dat", i % 13, i), i as u64, at(2024, 1, 1)))
            .collect();
        store.save(FileSet::Source, &source).expect("save");
        let stats = store.compute_diff(Rule::Standard).expect("diff");
        assert_eq!(stats.pending_files, 2503, "backend {}", name);

        let mut ids = BTreeSet::new();
        let mut cursor = 0;
        loop {
            let page = store.pending_page(cursor, 250).expect("page");
            let Some(last) = page.last() else {
                break;
            };
            assert!(page.len() <= 250);
            for record in &page {
                assert!(record.id > cursor, "ids must advance past the cursor");
                assert!(ids.insert(record.id), "id {} returned twice", record.id);
            }
            cursor = last.id;
        }
        assert_eq!(ids.len(), 2503, "backend {}", name);
    }
}

#[test]
fn test_pending_bytes_sum_sizes() {
    for (name, mut store) in backends() {
        let source = vec![
            FileRecord::new("a", 100, at(2024, 1, 1)),
            FileRecord::new("b", 250, at(2024, 1, 1)),
        ];
        store.save(FileSet::Source, &source).expect("save");
        let stats = store.compute_diff(Rule::Standard).expect("diff");
        assert_eq!(stats.pending_bytes, 350, "backend {}", name);
    }
}

// ═══════════════════════════════════════════════════════════
// Backend parity
// ═══════════════════════════════════════════════════════════

fn arb_records() -> impl Strategy<Value = Vec<FileRecord>> {
    prop::collection::vec(("[a-e]{1,2}", 0u64..4, 0i64..4), 0..12).prop_map(|items| {
        items
            .into_iter()
            .map(|(name, size, days)| FileRecord::new(name, size, at(2024, 1, 1) + Duration::days(days)))
            .collect()
    })
}

fn arb_rule() -> impl Strategy<Value = Rule> {
    prop_oneof![Just(Rule::Standard), Just(Rule::Newer), Just(Rule::Larger)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_backends_agree_on_pending(source in arb_records(), target in arb_records(), rule in arb_rule()) {
        let mut memory = MemoryStore::new();
        let mut sqlite = SqliteStore::open_in_memory().expect("open sqlite");
        sqlite.initialize().expect("init");

        let from_memory = diff(&mut memory, &source, &target, rule);
        let from_sqlite = diff(&mut sqlite, &source, &target, rule);
        prop_assert_eq!(from_memory, from_sqlite);
    }

    #[test]
    fn prop_identical_sets_have_nothing_pending(records in arb_records()) {
        let mut store = MemoryStore::new();
        let pending = diff(&mut store, &records, &records, Rule::Standard);
        prop_assert!(pending.is_empty());
    }
}
