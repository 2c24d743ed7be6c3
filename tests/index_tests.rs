//! End-to-end tests of the public index façade: exact scenarios, error
//! paths, persistence round-trips, and concurrent traffic.

use proxima::{BitHasher, Index, IndexError, IndexOptions, MetricKind, ScalarKind, VectorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn l2_index(dimensions: usize, capacity: usize) -> Index {
    Index::new(IndexOptions {
        dimensions,
        capacity,
        metric: MetricKind::L2sq,
        ..IndexOptions::default()
    })
    .expect("valid options")
}

#[test]
fn single_point_exact_match() {
    let index = l2_index(3, 4);
    index.add(7, VectorData::F32(&[1.0, 0.0, 0.0]), 0).unwrap();
    let hits = index.search(VectorData::F32(&[1.0, 0.0, 0.0]), 1, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].label, 7);
    assert_eq!(hits[0].distance, 0.0);
}

#[test]
fn duplicate_labels_both_returned() {
    let index = l2_index(2, 4);
    index.add(5, VectorData::F32(&[0.0, 0.0]), 0).unwrap();
    index.add(5, VectorData::F32(&[1.0, 1.0]), 0).unwrap();
    let hits = index.search(VectorData::F32(&[0.0, 0.0]), 2, 0).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].label, 5);
    assert_eq!(hits[1].label, 5);
    assert_eq!(hits[0].distance, 0.0);
    assert_eq!(hits[1].distance, 2.0);
}

#[test]
fn inner_product_ties_break_by_insertion_order() {
    let index = Index::new(IndexOptions {
        dimensions: 2,
        capacity: 4,
        metric: MetricKind::Ip,
        ..IndexOptions::default()
    })
    .unwrap();
    index.add(1, VectorData::F32(&[1.0, 0.0]), 0).unwrap();
    index.add(2, VectorData::F32(&[1.0, 0.0]), 0).unwrap();
    let hits = index.search(VectorData::F32(&[1.0, 0.0]), 2, 0).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].distance, 0.0);
    assert_eq!(hits[1].distance, 0.0);
    assert_eq!(hits[0].label, 1, "lower internal id wins the tie");
    assert_eq!(hits[1].label, 2);
}

#[test]
fn third_add_past_capacity_fails() {
    let index = l2_index(2, 2);
    index.add(1, VectorData::F32(&[0.0, 0.0]), 0).unwrap();
    index.add(2, VectorData::F32(&[1.0, 0.0]), 0).unwrap();
    let err = index.add(3, VectorData::F32(&[2.0, 0.0]), 0).unwrap_err();
    assert!(matches!(err, IndexError::OutOfCapacity { .. }));
    assert_eq!(index.size(), 2);
}

#[test]
fn empty_index_returns_nothing() {
    let index = l2_index(4, 0);
    let hits = index.search(VectorData::F32(&[0.0; 4]), 5, 0).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn wrong_query_dimensionality_rejected() {
    let index = l2_index(3, 2);
    let err = index.search(VectorData::F32(&[1.0, 2.0]), 1, 0).unwrap_err();
    assert!(matches!(err, IndexError::InvalidArgument(_)));
    let err = index.add(1, VectorData::F32(&[1.0, 2.0]), 0).unwrap_err();
    assert!(matches!(err, IndexError::InvalidArgument(_)));
}

#[test]
fn idempotent_reserve_keeps_contents() {
    let index = l2_index(2, 0);
    index.reserve(100).unwrap();
    assert_eq!(index.capacity(), 100);
    for i in 0..5 {
        index
            .add(i, VectorData::F32(&[i as f32, 0.0]), 0)
            .unwrap();
    }
    index.reserve(50).unwrap();
    assert_eq!(index.capacity(), 100, "shrinking reserve is a no-op");
    assert_eq!(index.size(), 5);
    let hits = index.search(VectorData::F32(&[2.0, 0.0]), 1, 0).unwrap();
    assert_eq!(hits[0].label, 2);
}

#[test]
fn clear_preserves_capacity_and_reuses_slots() {
    let index = l2_index(2, 8);
    for i in 0..8 {
        index
            .add(i, VectorData::F32(&[i as f32, 1.0]), 0)
            .unwrap();
    }
    index.clear().unwrap();
    assert_eq!(index.size(), 0);
    assert_eq!(index.capacity(), 8);
    assert!(index
        .search(VectorData::F32(&[0.0, 0.0]), 3, 0)
        .unwrap()
        .is_empty());

    index.add(100, VectorData::F32(&[5.0, 5.0]), 0).unwrap();
    let hits = index.search(VectorData::F32(&[5.0, 5.0]), 1, 0).unwrap();
    assert_eq!(hits[0].label, 100);
    assert_eq!(hits[0].distance, 0.0);
    index.validate().unwrap();
}

fn random_dataset(n: usize, dims: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    (0..n)
        .map(|_| (0..dims).map(|_| rng.gen::<f32>()).collect())
        .collect()
}

#[test]
fn persistence_round_trip_preserves_results() {
    let dims = 8;
    let mut rng = StdRng::seed_from_u64(17);
    let data = random_dataset(1000, dims, &mut rng);

    let index = l2_index(dims, 1000);
    for (i, v) in data.iter().enumerate() {
        index.add(i as i64, VectorData::F32(v), 0).unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("round_trip.usearch");
    index.save(&path).unwrap();

    // A fresh index stands in for a fresh process.
    let reloaded = l2_index(dims, 0);
    reloaded.load(&path).unwrap();
    assert_eq!(reloaded.size(), 1000);
    reloaded.validate().unwrap();

    for _ in 0..100 {
        let q: Vec<f32> = (0..dims).map(|_| rng.gen()).collect();
        let before = index.search(VectorData::F32(&q), 10, 0).unwrap();
        let after = reloaded.search(VectorData::F32(&q), 10, 0).unwrap();
        assert_eq!(before, after);
    }
}

#[test]
fn viewed_index_is_read_only_and_equivalent() {
    let dims = 8;
    let mut rng = StdRng::seed_from_u64(23);
    let data = random_dataset(300, dims, &mut rng);

    let index = l2_index(dims, 300);
    for (i, v) in data.iter().enumerate() {
        index.add(i as i64, VectorData::F32(v), 0).unwrap();
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("viewed.usearch");
    index.save(&path).unwrap();

    let loaded = l2_index(dims, 0);
    loaded.load(&path).unwrap();
    let viewed = l2_index(dims, 0);
    viewed.view(&path).unwrap();
    assert!(viewed.is_viewed());
    viewed.validate().unwrap();

    for _ in 0..50 {
        let q: Vec<f32> = (0..dims).map(|_| rng.gen()).collect();
        let a = loaded.search(VectorData::F32(&q), 5, 0).unwrap();
        let b = viewed.search(VectorData::F32(&q), 5, 0).unwrap();
        assert_eq!(a, b);
    }

    let err = viewed
        .add(1, VectorData::F32(&vec![0.0; dims]), 0)
        .unwrap_err();
    assert!(matches!(err, IndexError::Immutable));
    let err = viewed.reserve(1000).unwrap_err();
    assert!(matches!(err, IndexError::Immutable));

    // Clearing releases the mapping and returns to a writable index.
    viewed.clear().unwrap();
    assert!(!viewed.is_viewed());
    viewed.add(1, VectorData::F32(&vec![0.0; dims]), 0).unwrap();
}

#[test]
fn load_rejects_mismatched_index() {
    let index = l2_index(4, 10);
    index.add(1, VectorData::F32(&[0.0; 4]), 0).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mismatch.usearch");
    index.save(&path).unwrap();

    let wrong_dims = l2_index(8, 0);
    assert!(matches!(
        wrong_dims.load(&path).unwrap_err(),
        IndexError::IncompatibleFile(_)
    ));

    let wrong_metric = Index::new(IndexOptions {
        dimensions: 4,
        metric: MetricKind::Cos,
        ..IndexOptions::default()
    })
    .unwrap();
    assert!(matches!(
        wrong_metric.load(&path).unwrap_err(),
        IndexError::IncompatibleFile(_)
    ));
}

#[test]
fn half_precision_index_accepts_f32_input() {
    let index = Index::new(IndexOptions {
        dimensions: 4,
        capacity: 4,
        metric: MetricKind::L2sq,
        element_type: ScalarKind::F16,
        ..IndexOptions::default()
    })
    .unwrap();
    index
        .add(9, VectorData::F32(&[0.5, 1.0, -0.25, 2.0]), 0)
        .unwrap();
    let hits = index
        .search(VectorData::F32(&[0.5, 1.0, -0.25, 2.0]), 1, 0)
        .unwrap();
    assert_eq!(hits[0].label, 9);
    assert_eq!(hits[0].distance, 0.0, "these values are exact in f16");
}

#[test]
fn i8_index_round_trips() {
    let index = Index::new(IndexOptions {
        dimensions: 3,
        capacity: 4,
        metric: MetricKind::L2sq,
        element_type: ScalarKind::I8,
        ..IndexOptions::default()
    })
    .unwrap();
    index.add(1, VectorData::I8(&[1, -2, 3]), 0).unwrap();
    index.add(2, VectorData::I8(&[4, 5, -6]), 0).unwrap();
    let hits = index.search(VectorData::I8(&[1, -2, 3]), 2, 0).unwrap();
    assert_eq!(hits[0].label, 1);
    assert_eq!(hits[0].distance, 0.0);

    let err = index.add(3, VectorData::F32(&[0.0; 3]), 0).unwrap_err();
    assert!(matches!(err, IndexError::InvalidArgument(_)));
}

#[test]
fn hamming_over_bit_hashes() {
    let words = 4; // 256 bits
    let index = Index::new(IndexOptions {
        dimensions: words,
        capacity: 8,
        metric: MetricKind::Hamming,
        element_type: ScalarKind::B64,
        ..IndexOptions::default()
    })
    .unwrap();

    let mut hasher = BitHasher::new(words * 64);
    let doc_a: Vec<u64> = hasher.hash_tokens(0u64..40).to_vec();
    let doc_b: Vec<u64> = hasher.hash_tokens(20u64..60).to_vec();
    let doc_c: Vec<u64> = hasher.hash_tokens(500u64..540).to_vec();
    index.add(1, VectorData::B64(&doc_a), 0).unwrap();
    index.add(2, VectorData::B64(&doc_b), 0).unwrap();
    index.add(3, VectorData::B64(&doc_c), 0).unwrap();

    let hits = index.search(VectorData::B64(&doc_a), 3, 0).unwrap();
    assert_eq!(hits[0].label, 1);
    assert_eq!(hits[0].distance, 0.0);
    assert_eq!(hits[1].label, 2, "overlapping stream ranks above disjoint");
}

#[test]
fn jaccard_over_sorted_sets() {
    let index = Index::new(IndexOptions {
        dimensions: 4,
        capacity: 8,
        metric: MetricKind::Jaccard,
        element_type: ScalarKind::U32,
        ..IndexOptions::default()
    })
    .unwrap();
    index.add(1, VectorData::U32(&[1, 2, 3, 4]), 0).unwrap();
    index.add(2, VectorData::U32(&[3, 4, 5, 6]), 0).unwrap();
    index.add(3, VectorData::U32(&[10, 20, 30, 40]), 0).unwrap();

    let hits = index.search(VectorData::U32(&[1, 2, 3, 4]), 3, 0).unwrap();
    assert_eq!(hits[0].label, 1);
    assert_eq!(hits[0].distance, 0.0);
    assert_eq!(hits[1].label, 2);

    let err = index.add(4, VectorData::U32(&[4, 3, 2, 1]), 0).unwrap_err();
    assert!(matches!(err, IndexError::InvalidArgument(_)));
}

#[test]
fn custom_metric_end_to_end() {
    fn l1(a: &[u8], b: &[u8], _dims: usize) -> f32 {
        let decode = |bytes: &[u8]| -> Vec<f32> {
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect()
        };
        decode(a)
            .iter()
            .zip(decode(b).iter())
            .map(|(x, y)| (x - y).abs())
            .sum()
    }

    let options = IndexOptions {
        dimensions: 2,
        capacity: 4,
        ..IndexOptions::default()
    };
    let index = Index::with_custom_metric(options.clone(), l1).unwrap();
    index.add(1, VectorData::F32(&[0.0, 0.0]), 0).unwrap();
    index.add(2, VectorData::F32(&[3.0, 4.0]), 0).unwrap();
    let hits = index.search(VectorData::F32(&[0.0, 0.0]), 2, 0).unwrap();
    assert_eq!(hits[0].label, 1);
    assert_eq!(hits[1].distance, 7.0);

    // Files written under a user metric only reopen with the callback.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.usearch");
    index.save(&path).unwrap();
    let builtin = l2_index(2, 0);
    assert!(matches!(
        builtin.load(&path).unwrap_err(),
        IndexError::IncompatibleFile(_)
    ));
    let with_callback = Index::with_custom_metric(options, l1).unwrap();
    with_callback.load(&path).unwrap();
    assert_eq!(with_callback.size(), 2);
}

#[test]
fn search_batch_matches_sequential() {
    let dims = 8;
    let mut rng = StdRng::seed_from_u64(5);
    let data = random_dataset(200, dims, &mut rng);
    let index = Index::new(IndexOptions {
        dimensions: dims,
        capacity: 200,
        metric: MetricKind::L2sq,
        workers: rayon::current_num_threads().max(1),
        ..IndexOptions::default()
    })
    .unwrap();
    for (i, v) in data.iter().enumerate() {
        index.add(i as i64, VectorData::F32(v), 0).unwrap();
    }

    let queries: Vec<Vec<f32>> = random_dataset(32, dims, &mut rng);
    let views: Vec<VectorData<'_>> = queries.iter().map(|q| VectorData::F32(q)).collect();
    let batched = index.search_batch(&views, 5).unwrap();
    assert_eq!(batched.len(), 32);
    for (q, batch) in queries.iter().zip(&batched) {
        let sequential = index.search(VectorData::F32(q), 5, 0).unwrap();
        assert_eq!(*batch, sequential);
    }
}

#[test]
fn concurrent_facade_traffic() {
    const WRITERS: usize = 4;
    const SEARCHERS: usize = 4;
    const PER_THREAD: usize = 250;
    let dims = 8;
    let index = Index::new(IndexOptions {
        dimensions: dims,
        capacity: WRITERS * PER_THREAD,
        metric: MetricKind::L2sq,
        expansion_add: 64,
        workers: WRITERS + SEARCHERS,
        ..IndexOptions::default()
    })
    .unwrap();
    let index = &index;

    std::thread::scope(|scope| {
        for t in 0..WRITERS {
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                for i in 0..PER_THREAD {
                    let label = (t * PER_THREAD + i) as i64;
                    let v: Vec<f32> = (0..dims).map(|_| rng.gen()).collect();
                    index.add(label, VectorData::F32(&v), t).unwrap();
                }
            });
        }
        for t in 0..SEARCHERS {
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + t as u64);
                for _ in 0..PER_THREAD {
                    let q: Vec<f32> = (0..dims).map(|_| rng.gen()).collect();
                    let hits = index.search(VectorData::F32(&q), 5, WRITERS + t).unwrap();
                    for pair in hits.windows(2) {
                        assert!(pair[0].distance <= pair[1].distance);
                    }
                }
            });
        }
    });

    assert_eq!(index.size(), WRITERS * PER_THREAD);
    index.validate().unwrap();
}
