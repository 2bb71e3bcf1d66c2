//! Cross-process coordination tests: the lock tables and the scheduler
//! are what keeps parallel workers from stepping on each other.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Duration, Utc};

use pricewatch::models::{PriceEntry, Product, UrlStatus};
use pricewatch::repository::{
    ItemLockRepository, PriceHistoryRepository, ProcessLockRepository, ProductRepository,
    RunRepository,
};

fn temp_db() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("coordination.db");
    (dir, db)
}

#[test]
fn item_lock_mutual_exclusion_across_repositories() {
    let (_dir, db) = temp_db();
    // Two repository handles simulate two worker processes sharing a db
    let worker_a = ItemLockRepository::new(&db).unwrap();
    let worker_b = ItemLockRepository::new(&db).unwrap();

    assert!(worker_a.try_acquire("p1", 1, 100, 180).unwrap());
    assert!(!worker_b.try_acquire("p1", 2, 200, 180).unwrap());

    // Another item is not affected
    assert!(worker_b.try_acquire("p2", 2, 200, 180).unwrap());

    worker_a.release("p1").unwrap();
    assert!(worker_b.try_acquire("p1", 2, 200, 180).unwrap());
}

#[test]
fn item_lock_single_winner_under_contention() {
    let (_dir, db) = temp_db();
    let winners = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let db = db.clone();
            let winners = Arc::clone(&winners);
            std::thread::spawn(move || {
                let repo = ItemLockRepository::new(&db).unwrap();
                if repo.try_acquire("contested", 1, 1000 + i, 180).unwrap() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
}

#[test]
fn stale_item_locks_are_reclaimable() {
    let (_dir, db) = temp_db();
    let locks = ItemLockRepository::new(&db).unwrap();

    assert!(locks.try_acquire("p1", 1, 100, 180).unwrap());

    // With a zero timeout every held lock is already stale
    assert!(locks.try_acquire("p1", 2, 200, 0).unwrap());
    let held = locks.all().unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].run_id, 2);
}

#[test]
fn release_all_only_touches_own_run() {
    let (_dir, db) = temp_db();
    let locks = ItemLockRepository::new(&db).unwrap();

    assert!(locks.try_acquire("a", 1, 100, 180).unwrap());
    assert!(locks.try_acquire("b", 1, 100, 180).unwrap());
    assert!(locks.try_acquire("c", 2, 200, 180).unwrap());

    assert_eq!(locks.release_all(1).unwrap(), 2);
    let remaining = locks.all().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].product_id, "c");
}

#[test]
fn process_lock_capacity_counting() {
    let (_dir, db) = temp_db();
    let locks = ProcessLockRepository::new(&db).unwrap();

    assert_eq!(locks.count_active().unwrap(), 0);
    locks.acquire().unwrap();
    assert_eq!(locks.count_active().unwrap(), 1);
    locks.release().unwrap();
    assert_eq!(locks.count_active().unwrap(), 0);
}

#[test]
fn scheduler_selects_only_due_products() {
    let (_dir, db) = temp_db();
    let products = ProductRepository::new(&db).unwrap();
    let history = PriceHistoryRepository::new(&db).unwrap();

    for id in ["fresh", "stale", "new"] {
        products
            .save(&Product::new(
                id.into(),
                format!("https://shop.example.com/p/{id}"),
            ))
            .unwrap();
    }

    let mut entry = PriceEntry::new("fresh".into(), 9.99, "EUR".into());
    entry.fetched_at = Utc::now() - Duration::seconds(60);
    history.append(&entry).unwrap();

    let mut entry = PriceEntry::new("stale".into(), 9.99, "EUR".into());
    entry.fetched_at = Utc::now() - Duration::seconds(7200);
    history.append(&entry).unwrap();

    let due = products.find_due(3600, None, None, None).unwrap();
    let ids: Vec<_> = due.iter().map(|p| p.product_id.as_str()).collect();
    // Deterministic order, never-scraped and stale items only
    assert_eq!(ids, vec!["new", "stale"]);
}

#[test]
fn scheduler_skips_dead_urls() {
    let (_dir, db) = temp_db();
    let products = ProductRepository::new(&db).unwrap();

    products
        .save(&Product::new(
            "gone".into(),
            "https://shop.example.com/p/gone".into(),
        ))
        .unwrap();
    products
        .set_url_status("gone", UrlStatus::Invalid, 0)
        .unwrap();

    assert!(products.find_due(3600, None, None, None).unwrap().is_empty());
}

#[test]
fn run_lifecycle_terminates_once() {
    let (_dir, db) = temp_db();
    let runs = RunRepository::new(&db).unwrap();

    let run_id = runs.start(Some(20)).unwrap();
    runs.complete(run_id, 18, 2, 20, 1, 1).unwrap();

    let run = runs.get(run_id).unwrap().unwrap();
    assert_eq!(run.items_total, 20);
    assert!(run.ended_at.is_some());

    let stats = runs.statistics().unwrap();
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.total_items_processed, 18);
}
