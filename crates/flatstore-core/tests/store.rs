//! Integration tests: FlatStore against the fixture tables on disk.
//!
//! Each test copies the fixture into a fresh temp directory, so mutations
//! never touch the checked-in files.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use flatstore_core::{
    Durability, EngagementKind, FlatStore, NewEngagement, StoreConfig, StoreError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn fixture_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in ["users.csv", "posts.csv", "engagements.csv"] {
        fs::copy(Path::new(FIXTURES).join(name), dir.path().join(name)).unwrap();
    }
    dir
}

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig::in_dir(dir.path())
}

fn test_store() -> (FlatStore, TempDir) {
    let dir = fixture_dir();
    let store = FlatStore::open(config(&dir)).unwrap();
    (store, dir)
}

fn read(dir: &TempDir, name: &str) -> String {
    fs::read_to_string(dir.path().join(name)).unwrap()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn test_single_threaded_load() {
    let (store, _dir) = test_store();

    assert_eq!(store.user_count(), 5);
    assert_eq!(store.post_count(), 5);
    assert_eq!(store.engagement_count(), 8);
    assert!(store.has_user(1));
    assert!(store.has_user(5));
    assert!(!store.has_user(6));
    assert!(store.has_post(3));
    assert_eq!(store.username(1).as_deref(), Some("alice"));
    assert_eq!(store.post_views(1), Some(100));

    let comment = store.engagement(3).unwrap();
    assert_eq!(comment.post_id, 4);
    assert_eq!(comment.username, "bob");
    assert_eq!(comment.kind, EngagementKind::Comment);
    assert_eq!(comment.comment, "I love Atlanta too");
    assert_eq!(comment.timestamp, 1706400200);
}

#[test]
fn test_parallel_load_matches_sequential() {
    let dir = fixture_dir();

    let sequential = FlatStore::new(config(&dir)).unwrap();
    sequential.load_all().unwrap();

    let parallel = FlatStore::new(config(&dir)).unwrap();
    parallel.load_all_parallel().unwrap();

    assert_eq!(parallel.snapshot(), sequential.snapshot());
    assert_eq!(parallel.user_id_by_username("eve"), Some(5));
    assert_eq!(parallel.get_user_comments(2), sequential.get_user_comments(2));
}

#[test]
fn test_reload_replaces_tables() {
    let (store, dir) = test_store();
    fs::write(
        dir.path().join("engagements.csv"),
        "id,postId,username,type,comment,timestamp\n1,1,bob,like,,1706400000\n",
    )
    .unwrap();

    store.load_all_parallel().unwrap();
    assert_eq!(store.engagement_count(), 1);
    assert_eq!(store.user_count(), 5);
    assert!(store.get_user_comments(2).is_empty());
}

#[test]
fn test_malformed_rows_are_dropped() {
    let dir = fixture_dir();
    let mut users = read(&dir, "users.csv");
    users.push_str("x7,mallory,Nowhere\n");
    users.push_str("8,trent\n");
    users.push_str("\n");
    users.push_str("9,peggy,Paris,extra\n");
    fs::write(dir.path().join("users.csv"), users).unwrap();

    let mut engagements = read(&dir, "engagements.csv");
    engagements.push_str("9,1,alice,like,,12abc\n");
    fs::write(dir.path().join("engagements.csv"), engagements).unwrap();

    let store = FlatStore::open(config(&dir)).unwrap();
    assert_eq!(store.user_count(), 5);
    assert_eq!(store.engagement_count(), 8);
    assert!(!store.has_user(8));
    assert!(store.engagement(9).is_none());

    let parallel = FlatStore::new(config(&dir)).unwrap();
    parallel.load_all_parallel().unwrap();
    assert_eq!(parallel.snapshot(), store.snapshot());
}

#[test]
fn test_dangling_reference_rejects_load() {
    let dir = fixture_dir();
    let mut engagements = read(&dir, "engagements.csv");
    engagements.push_str("9,42,alice,like,,1706400800\n");
    fs::write(dir.path().join("engagements.csv"), engagements).unwrap();

    let store = FlatStore::new(config(&dir)).unwrap();
    assert!(matches!(store.load_all_parallel(), Err(StoreError::IntegrityViolation { violations: 1, .. })));
    assert!(matches!(store.load_all(), Err(StoreError::IntegrityViolation { .. })));
    assert_eq!(store.user_count(), 0);
    assert_eq!(store.engagement_count(), 0);
}

#[test]
fn test_missing_file_leaves_store_empty() {
    let dir = fixture_dir();
    fs::remove_file(dir.path().join("engagements.csv")).unwrap();

    let store = FlatStore::new(config(&dir)).unwrap();
    assert!(matches!(store.load_all_parallel(), Err(StoreError::Io { .. })));
    assert_eq!(store.user_count(), 0);
    assert_eq!(store.post_count(), 0);
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[test]
fn test_user_comments() {
    let (store, _dir) = test_store();

    assert_eq!(store.get_user_comments(2), vec![(4, "I love Atlanta too".to_string())]);
    assert_eq!(store.get_user_comments(4).len(), 1);
    assert!(store.get_user_comments(1).is_empty());
    assert!(store.get_user_comments(999).is_empty());
}

#[test]
fn test_user_comments_ordered_by_post() {
    let (store, _dir) = test_store();
    store.add_engagement(NewEngagement::comment(4, "diana", "Gorgeous colors", 1706500000)).unwrap();
    store.add_engagement(NewEngagement::comment(2, "diana", "Bundle up", 1706500100)).unwrap();

    let posts: Vec<i64> = store.get_user_comments(4).iter().map(|(post, _)| *post).collect();
    assert_eq!(posts, vec![2, 3, 4]);
}

#[test]
fn test_engagements_by_location() {
    let (store, _dir) = test_store();

    assert_eq!(store.get_engagement_counts_by_location("Atlanta"), (2, 0));
    assert_eq!(store.get_engagement_counts_by_location("Boston"), (1, 1));
    assert_eq!(store.get_engagement_counts_by_location("Chicago"), (2, 1));
    assert_eq!(store.get_engagement_counts_by_location("Nowhere"), (0, 0));
    assert_eq!(store.get_engagement_counts_by_location("atlanta"), (0, 0));
}

// ---------------------------------------------------------------------------
// View updates
// ---------------------------------------------------------------------------

#[test]
fn test_update_views_is_durable() {
    let (store, dir) = test_store();
    let initial = store.post_views(1).unwrap();

    assert!(store.update_post_views(1, 50).unwrap());
    assert_eq!(store.post_views(1), Some(initial + 50));

    let reloaded = FlatStore::open(config(&dir)).unwrap();
    assert_eq!(reloaded.post_views(1), Some(initial + 50));
    assert_eq!(reloaded.post_views(2), store.post_views(2));
    assert!(!dir.path().join("posts.csv.tmp").exists());
}

#[test]
fn test_update_views_unknown_post() {
    let (store, dir) = test_store();
    let before_file = read(&dir, "posts.csv");
    let before = store.snapshot();

    assert!(!store.update_post_views(999, 10).unwrap());
    assert_eq!(store.snapshot(), before);
    assert_eq!(read(&dir, "posts.csv"), before_file);
}

#[test]
fn test_concurrent_view_updates() {
    let dir = fixture_dir();
    let store = Arc::new(
        FlatStore::open(config(&dir).with_durability(Durability::Buffered)).unwrap(),
    );
    let initial = store.post_views(1).unwrap();

    let mut handles = vec![];
    for _ in 0..10 {
        let s = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for _ in 0..10 {
                assert!(s.update_post_views(1, 1).unwrap());
            }
        }));
    }
    for h in handles { h.join().unwrap(); }

    assert_eq!(store.post_views(1), Some(initial + 100));

    let reloaded = FlatStore::open(config(&dir)).unwrap();
    assert_eq!(reloaded.post_views(1), Some(initial + 100));
}

#[test]
fn test_concurrent_mixed_operations() {
    let dir = fixture_dir();
    let store = Arc::new(
        FlatStore::open(config(&dir).with_durability(Durability::Buffered)).unwrap(),
    );

    let mut handles = vec![];
    for t in 0..4 {
        let s = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..5 {
                s.update_post_views(2, 1).unwrap();
                s.add_engagement(NewEngagement::like(3, "carol", 1706600000 + t * 10 + i)).unwrap();
                let _ = s.get_engagement_counts_by_location("Atlanta");
                let _ = s.get_user_comments(3);
            }
        }));
    }
    let renamer = {
        let s = Arc::clone(&store);
        thread::spawn(move || {
            assert!(s.rename_user(5, "eve_renamed").unwrap());
        })
    };
    for h in handles { h.join().unwrap(); }
    renamer.join().unwrap();

    assert_eq!(store.post_views(2), Some(250 + 20));
    assert_eq!(store.engagement_count(), 8 + 20);
    assert_eq!(store.get_engagement_counts_by_location("Chicago"), (2 + 20, 1));
    assert_eq!(store.get_engagement_counts_by_location("Atlanta"), (2, 0));
    assert_eq!(store.user_id_by_username("eve_renamed"), Some(5));

    let reloaded = FlatStore::open(config(&dir)).unwrap();
    assert_eq!(reloaded.snapshot(), store.snapshot());
}

// ---------------------------------------------------------------------------
// Engagements
// ---------------------------------------------------------------------------

#[test]
fn test_add_engagement() {
    let (store, dir) = test_store();

    let id = store.add_engagement(NewEngagement::like(1, "eve", 1706500000)).unwrap();
    assert_eq!(id, 9);
    assert_eq!(store.engagement_count(), 9);
    assert_eq!(store.get_engagement_counts_by_location("Atlanta"), (3, 0));

    let on_post: Vec<i64> = store.engagements_for_post(1).iter().map(|e| e.id).collect();
    assert_eq!(on_post, vec![1, 6, 9]);

    assert!(read(&dir, "engagements.csv").ends_with("9,1,eve,like,,1706500000\n"));
    let reloaded = FlatStore::open(config(&dir)).unwrap();
    assert_eq!(reloaded.engagement(9), store.engagement(9));
}

#[test]
fn test_add_engagement_missing_post() {
    let (store, dir) = test_store();
    let before_file = read(&dir, "engagements.csv");

    let result = store.add_engagement(NewEngagement::like(42, "eve", 1706500000));
    assert!(matches!(result, Err(StoreError::ForeignKey { .. })));
    assert_eq!(store.engagement_count(), 8);
    assert_eq!(read(&dir, "engagements.csv"), before_file);
}

#[test]
fn test_concurrent_engagement_ids_are_unique() {
    let dir = fixture_dir();
    let store = Arc::new(
        FlatStore::open(config(&dir).with_durability(Durability::Buffered)).unwrap(),
    );

    let mut handles = vec![];
    for _ in 0..5 {
        let s = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            (0..4)
                .map(|_| s.add_engagement(NewEngagement::like(5, "bob", 1706500000)).unwrap())
                .collect::<Vec<_>>()
        }));
    }
    let mut ids: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (9..29).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------------
// Rename
// ---------------------------------------------------------------------------

#[test]
fn test_rename_cascades_to_all_files() {
    let (store, dir) = test_store();

    assert!(store.rename_user(1, "alice_new").unwrap());
    assert_eq!(store.username(1).as_deref(), Some("alice_new"));
    assert_eq!(store.user_count(), 5);
    assert_eq!(store.post_count(), 5);
    assert_eq!(store.engagement_count(), 8);
    assert_eq!(store.post(1).unwrap().author, "alice_new");
    assert_eq!(store.post(4).unwrap().author, "alice_new");
    assert_eq!(store.engagement(2).unwrap().username, "alice_new");

    for name in ["users.csv", "posts.csv", "engagements.csv"] {
        let text = read(&dir, name);
        assert!(text.contains("alice_new"), "{} not rewritten", name);
        assert!(!text.contains(",alice,"), "{} still holds the old name", name);
    }

    let reloaded = FlatStore::open(config(&dir)).unwrap();
    assert_eq!(reloaded.snapshot(), store.snapshot());
    assert_eq!(reloaded.user_id_by_username("alice_new"), Some(1));
    assert_eq!(reloaded.get_engagement_counts_by_location("Atlanta"), (2, 0));
}

#[test]
fn test_rename_unknown_user() {
    let (store, dir) = test_store();
    let before = read(&dir, "users.csv");

    assert!(!store.rename_user(999, "ghost").unwrap());
    assert_eq!(read(&dir, "users.csv"), before);
}

#[test]
fn test_new_engagement_after_rename_uses_new_name() {
    let (store, _dir) = test_store();
    assert!(store.rename_user(2, "bobby").unwrap());

    let stale = store.add_engagement(NewEngagement::like(1, "bob", 1706500000));
    assert!(matches!(stale, Err(StoreError::ForeignKey { .. })));

    store.add_engagement(NewEngagement::comment(5, "bobby", "Great trail", 1706500000)).unwrap();
    assert_eq!(
        store.get_user_comments(2),
        vec![(4, "I love Atlanta too".to_string()), (5, "Great trail".to_string())]
    );
}
