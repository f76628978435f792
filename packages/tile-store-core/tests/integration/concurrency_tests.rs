//! Concurrent slot allocation, tile group growth and unique key races.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use rand::seq::SliceRandom;
use rand::thread_rng;
use rayon::prelude::*;

use tile_store_core::database::Database;
use tile_store_core::dml;
use tile_store_core::error::StoreError;
use tile_store_core::storage::ItemPointer;
use tile_store_core::transaction::ResultType;

use super::helpers::{account, create_accounts, database, insert_committed, visible_rows};

/// Races `threads` transactions inserting account `id`.
///
/// # Returns
/// Number of committed inserts and number of index conflicts.
fn race_same_key(db: &Arc<Database>, threads: usize, id: i64) -> (usize, usize) {
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = db.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let table = db.table("accounts").unwrap();
                let ctx = db.context();
                let mut handle = db.begin_transaction().unwrap();
                barrier.wait();
                let inserted = dml::insert(&ctx, &table, &account(id, &format!("t{}", t), 0), handle.transaction_mut());
                match inserted {
                    Ok(_) => (handle.commit().unwrap() == ResultType::Success, false),
                    Err(StoreError::IndexConflict { .. }) => (false, true),
                    Err(e) => panic!("unexpected error: {}", e),
                }
            })
        })
        .collect();

    handles.into_iter().fold((0, 0), |(ok, conflicts), h| {
        let (committed, conflict) = h.join().unwrap();
        (ok + committed as usize, conflicts + conflict as usize)
    })
}

#[test]
fn test_concurrent_inserts_get_distinct_slots() {
    let db = Arc::new(database(5));
    let table = create_accounts(&db);
    let threads: i64 = 6;
    let per_thread: i64 = 40;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = db.clone();
            thread::spawn(move || {
                let table = db.table("accounts").unwrap();
                let mut ids: Vec<i64> = (0..per_thread).map(|i| t * per_thread + i).collect();
                ids.shuffle(&mut thread_rng());
                ids.into_iter()
                    .map(|id| insert_committed(&db, &table, &account(id, "x", id)))
                    .collect::<Vec<ItemPointer>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for location in handle.join().unwrap() {
            assert!(location.offset < 5);
            assert!(seen.insert(location));
        }
    }
    let total = (threads * per_thread) as usize;
    assert_eq!(seen.len(), total);
    assert_eq!(table.tuple_count(), total);
    assert_eq!(table.tile_group_count(), total / 5 + 1);
}

#[test]
fn test_parallel_inserts_grow_one_group_per_exhaustion() {
    let db = database(3);
    let table = create_accounts(&db);

    let mut observed = Vec::new();
    for batch in 0..4i64 {
        (0..9i64).into_par_iter().for_each(|i| {
            insert_committed(&db, &table, &account(batch * 100 + i, "p", 0));
        });
        observed.push(table.tile_group_count());
    }

    // 9 inserts per batch exhaust exactly three groups of three
    assert_eq!(observed, vec![4, 7, 10, 13]);
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_same_primary_key_race_admits_one() {
    let db = Arc::new(database(64));
    create_accounts(&db);

    let (committed, conflicts) = race_same_key(&db, 8, 42);
    assert_eq!(committed, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(db.table("accounts").unwrap().tuple_count(), 1);
}

#[test]
fn test_race_on_fresh_key_one_winner() {
    let db = Arc::new(database(64));
    let table = create_accounts(&db);
    insert_committed(&db, &table, &account(1, "seed", 0));
    let before = table.tuple_count();

    let (committed, conflicts) = race_same_key(&db, 2, 5);
    assert_eq!((committed, conflicts), (1, 1));
    assert_eq!(table.tuple_count(), before + 1);
}

#[test]
fn test_race_on_existing_key_no_winner() {
    let db = Arc::new(database(64));
    let table = create_accounts(&db);
    insert_committed(&db, &table, &account(5, "existing", 0));
    let before = table.tuple_count();

    let (committed, conflicts) = race_same_key(&db, 2, 5);
    assert_eq!((committed, conflicts), (0, 2));
    assert_eq!(table.tuple_count(), before);
}

#[test]
fn test_concurrent_updates_single_owner() {
    let db = Arc::new(database(64));
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(1, "alice", 0));

    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = db.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let table = db.table("accounts").unwrap();
                let ctx = db.context();
                let mut handle = db.begin_transaction().unwrap();
                let project = tile_store_core::expression::ProjectInfo::assign(
                    3,
                    vec![(2, tile_store_core::types::Value::Integer(t as i64))],
                );
                barrier.wait();
                let updated = dml::update(&ctx, &table, location, &project, handle.transaction_mut());
                let won = updated.is_ok();
                // hold ownership until everyone has tried
                barrier.wait();
                if won {
                    assert_eq!(handle.commit().unwrap(), ResultType::Success);
                } else {
                    assert!(matches!(updated, Err(StoreError::OwnershipConflict { .. })));
                }
                won
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn test_pending_delete_keeps_primary_key_taken() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(5, "old", 1));
    let ctx = db.context();

    let mut deleter = db.begin_transaction().unwrap();
    dml::delete(&ctx, &table, location, deleter.transaction_mut()).unwrap();

    let mut inserter = db.begin_transaction().unwrap();
    let inserted = dml::insert(&ctx, &table, &account(5, "new", 2), inserter.transaction_mut());
    assert!(matches!(inserted, Err(StoreError::IndexConflict { .. })));
    assert_eq!(inserter.commit().unwrap(), ResultType::Aborted);

    // the delete rolls back, so the old row is the only one with key 5
    assert_eq!(deleter.abort().unwrap(), ResultType::Aborted);
    assert_eq!(visible_rows(&db, &table), vec![account(5, "old", 1)]);
}

#[test]
fn test_committed_delete_frees_primary_key() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(5, "old", 1));
    let ctx = db.context();

    let mut deleter = db.begin_transaction().unwrap();
    dml::delete(&ctx, &table, location, deleter.transaction_mut()).unwrap();
    assert_eq!(deleter.commit().unwrap(), ResultType::Success);

    insert_committed(&db, &table, &account(5, "new", 2));
    assert_eq!(visible_rows(&db, &table), vec![account(5, "new", 2)]);
}
