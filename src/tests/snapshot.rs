use std::sync::Arc;
use std::thread;

use super::letter_counts;
use crate::retrieval::{chunk_text, SharedIndex, SnapshotStorage, VectorIndex};

const GUIDANCE: &str = "Marketing authorisation holders shall report adverse reactions \
    within fifteen days. Periodic safety update reports are submitted every six months \
    during the first two years. Labelling changes require prior approval unless they \
    are editorial. Stability studies cover long term and accelerated conditions.";

fn guidance_index() -> VectorIndex {
    let chunks = chunk_text(GUIDANCE, 8, 3).unwrap();
    let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| letter_counts(c)).collect();

    let mut index = VectorIndex::new(26).unwrap();
    index.add(&vectors, &chunks).unwrap();
    index
}

#[test]
fn test_round_trip_reproduces_rankings() {
    let tmp = tempfile::tempdir().unwrap();
    let index = guidance_index();
    index.save(tmp.path()).unwrap();

    let mut restored = VectorIndex::new(26).unwrap();
    restored.restore(tmp.path()).unwrap();
    assert_eq!(restored, index);

    for query in [
        "adverse reactions",
        "safety update every six months",
        "labelling approval",
        "stability",
        "zzz",
        "",
    ] {
        let q = letter_counts(query);
        assert_eq!(
            restored.search(&q, index.len()).unwrap(),
            index.search(&q, index.len()).unwrap(),
            "query {query:?}"
        );
    }
}

#[test]
fn test_search_orders_by_distance() {
    let index = guidance_index();
    let hits = index
        .search_with_scores(&letter_counts("accelerated conditions"), index.len())
        .unwrap();

    assert_eq!(hits.len(), index.len());
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn test_readers_see_whole_batches_during_save() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = SnapshotStorage::new(tmp.path().join("index"));
    let shared = Arc::new(SharedIndex::new(2).unwrap());

    let writer = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            for i in 0..20 {
                let v = i as f32;
                shared
                    .add(
                        &[vec![v, 0.0], vec![0.0, v]],
                        &[format!("x{i}"), format!("y{i}")],
                    )
                    .unwrap();
                shared.save(&storage).unwrap();
            }
        })
    };

    for _ in 0..200 {
        let len = shared.len().unwrap();
        assert_eq!(len % 2, 0, "saw a half-applied batch");
    }
    writer.join().unwrap();

    let reloaded = VectorIndex::load(&tmp.path().join("index")).unwrap();
    assert_eq!(reloaded.len(), 40);
    assert_eq!(reloaded, shared.snapshot().unwrap());
}
