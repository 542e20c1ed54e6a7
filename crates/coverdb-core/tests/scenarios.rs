//! End-to-end scenarios against the public API.

use std::collections::HashSet;

use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use coverdb_core::{Error, EuclideanSquared, FileStore, MemStore, VecDb};

type Db = VecDb<String, EuclideanSquared, MemStore, 5>;

fn open_db() -> Db {
    VecDb::open(MemStore::new()).unwrap()
}

fn knn_values(db: &Db, point: &[f32], k: usize) -> HashSet<String> {
    db.knn(point, k)
        .unwrap()
        .map(|e| e.value().unwrap())
        .collect()
}

fn set(values: &[&str]) -> HashSet<String> {
    values.iter().map(ToString::to_string).collect()
}

#[test]
fn test_three_points_on_a_line() {
    let mut db = open_db();
    db.insert(&[0.0, 0.0, 0.0, 0.0, 0.0], &"0".to_string()).unwrap();
    db.insert(&[1.0, 0.0, 0.0, 0.0, 0.0], &"1".to_string()).unwrap();
    db.insert(&[2.0, 0.0, 0.0, 0.0, 0.0], &"2".to_string()).unwrap();

    let origin = [0.0, 0.0, 0.0, 0.0, 0.0];
    assert_eq!(knn_values(&db, &origin, 1), set(&["0"]));
    assert_eq!(knn_values(&db, &origin, 2), set(&["0", "1"]));
    // Asking for more than stored returns everything.
    assert_eq!(knn_values(&db, &origin, 8), set(&["0", "1", "2"]));
}

#[test]
fn test_remove_reinsert_reuses_freed_ids() {
    const N: usize = 24;
    let mut db = open_db();

    let mut keys = Vec::new();
    let mut first_ids = Vec::new();
    for i in 0..N {
        let key = [i as f32, (i * 3) as f32, 0.0, 0.0, 1.0];
        first_ids.push(db.insert(&key, &format!("v{i}")).unwrap());
        keys.push(key);
    }

    let mut freed = HashSet::new();
    for &id in &first_ids {
        db.get_by_id_mut(id).unwrap().remove().unwrap();
        freed.insert(id);
    }
    assert_eq!(db.len().unwrap(), 0);

    for (i, key) in keys.iter().enumerate() {
        let id = db.insert(key, &format!("again{i}")).unwrap();
        assert!(freed.contains(&id), "id {id} was not recycled");
    }
    assert_eq!(db.len().unwrap(), N);
}

#[test]
fn test_wrong_dimension_is_rejected() {
    let mut db = open_db();
    db.insert(&[0.0; 5], &"ok".to_string()).unwrap();

    let err = db.insert(&[1.0], &"bad".to_string()).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch { expected: 5, got: 1 }
    ));
    assert_eq!(db.len().unwrap(), 1);
}

#[test]
fn test_reused_id_has_no_residual_state() {
    let mut db = open_db();
    let id = db.insert(&[1.0, 2.0, 3.0, 4.0, 5.0], &"old".to_string()).unwrap();
    db.remove(id).unwrap();

    let reused = db.insert(&[9.0, 8.0, 7.0, 6.0, 5.0], &"new".to_string()).unwrap();
    assert_eq!(reused, id);

    let element = db.get_by_id(reused).unwrap();
    assert_eq!(element.key().unwrap(), [9.0, 8.0, 7.0, 6.0, 5.0]);
    assert_eq!(element.value().unwrap(), "new");
}

#[test]
fn test_len_tracks_inserts_and_removes() {
    let mut db = open_db();
    let mut ids = Vec::new();
    for i in 0..10 {
        ids.push(db.insert(&[i as f32, 0.0, 0.0, 0.0, 0.0], &i.to_string()).unwrap());
        assert_eq!(db.len().unwrap(), i + 1);
    }
    for (removed, id) in ids.into_iter().enumerate() {
        db.remove(id).unwrap();
        assert_eq!(db.len().unwrap(), 10 - removed - 1);
    }
    assert!(db.is_empty().unwrap());
}

#[test]
fn test_iteration_yields_live_elements_in_id_order() {
    let mut db = open_db();
    for i in 0..6 {
        db.insert(&[i as f32, 0.0, 0.0, 0.0, 0.0], &i.to_string()).unwrap();
    }
    db.remove(2).unwrap();
    db.remove(4).unwrap();

    let ids: Vec<u32> = db.iter().unwrap().map(|e| e.id()).collect();
    assert_eq!(ids, vec![0, 1, 3, 5]);
    for element in db.iter().unwrap() {
        assert_eq!(element.distance(), None);
        assert_eq!(element.value().unwrap(), element.id().to_string());
    }
}

#[test]
fn test_knn_edge_cases() {
    let mut db = open_db();
    assert_eq!(db.knn(&[0.0; 5], 3).unwrap().count(), 0);

    db.insert(&[0.0; 5], &"only".to_string()).unwrap();
    assert_eq!(db.knn(&[0.0; 5], 0).unwrap().count(), 0);

    // Non-finite query distances are dropped, not surfaced as errors.
    let nan_query = [f32::NAN; 5];
    assert_eq!(db.knn(&nan_query, 3).unwrap().count(), 0);
}

#[test]
fn test_set_value_through_handle() {
    let mut db = open_db();
    let id = db.insert(&[0.0; 5], &"one".to_string()).unwrap();

    let mut handle = db.get_by_id_mut(id).unwrap();
    handle.set_value(&"two".to_string()).unwrap();
    assert_eq!(db.get_by_id(id).unwrap().value().unwrap(), "two");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    label: String,
    weight: u64,
    tags: Vec<String>,
}

#[test]
fn test_structured_values_round_trip() {
    let mut db: VecDb<Payload, EuclideanSquared, MemStore, 2> =
        VecDb::open(MemStore::new()).unwrap();
    let payload = Payload {
        label: "doc-17".to_string(),
        weight: 42,
        tags: vec!["draft".to_string(), "embedding".to_string()],
    };

    let id = db.insert(&[0.5, -0.5], &payload).unwrap();
    assert_eq!(db.get_by_id(id).unwrap().value().unwrap(), payload);
}

#[test]
fn test_file_backed_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.bin");

    let (a, b) = {
        let mut db: VecDb<String, EuclideanSquared, FileStore, 3> =
            VecDb::open(FileStore::open(&path).unwrap()).unwrap();
        let a = db.insert(&[0.0, 0.0, 0.0], &"origin".to_string()).unwrap();
        let b = db.insert(&[4.0, 0.0, 0.0], &"far".to_string()).unwrap();
        db.store_mut().flush().unwrap();
        (a, b)
    };

    let mut db: VecDb<String, EuclideanSquared, FileStore, 3> =
        VecDb::open(FileStore::open(&path).unwrap()).unwrap();
    assert_eq!(db.len().unwrap(), 2);
    assert_eq!(db.get_by_id(a).unwrap().value().unwrap(), "origin");

    let nearest: Vec<u32> = db.knn(&[3.0, 0.0, 0.0], 1).unwrap().map(|e| e.id()).collect();
    assert_eq!(nearest, vec![b]);

    // Mutations keep working after reattach, including id reuse.
    db.remove(a).unwrap();
    let c = db.insert(&[1.0, 1.0, 0.0], &"new".to_string()).unwrap();
    assert_eq!(c, a);
    assert_eq!(db.len().unwrap(), 2);
}

proptest! {
    #[test]
    fn prop_round_trip(
        key in proptest::array::uniform5(-100.0f32..100.0),
        value in ".{0,40}",
    ) {
        let mut db = open_db();
        let id = db.insert(&key, &value).unwrap();

        let element = db.get_by_id(id).unwrap();
        prop_assert_eq!(element.key().unwrap(), key);
        prop_assert_eq!(element.value().unwrap(), value);
    }

    #[test]
    fn prop_len_matches_history(ops in proptest::collection::vec(any::<bool>(), 1..60)) {
        let mut db = open_db();
        let mut live: Vec<u32> = Vec::new();
        let mut counter = 0u32;

        for insert in ops {
            if insert || live.is_empty() {
                counter += 1;
                let id = db
                    .insert(&[counter as f32, 0.0, 0.0, 0.0, 0.0], &counter.to_string())
                    .unwrap();
                live.push(id);
            } else {
                let id = live.swap_remove(live.len() / 2);
                db.remove(id).unwrap();
            }
            prop_assert_eq!(db.len().unwrap(), live.len());
        }
    }
}
