use super::*;
use crate::row::{Row, Value};

fn record(payload_len: usize) -> Record {
    let mut row = Row::new();
    row.insert("v".to_string(), Value::from("x".repeat(payload_len)));
    Record::encode(row)
}

// =============================================================================
// Accumulation
// =============================================================================

#[test]
fn test_empty_queues_yield_nothing() {
    let queues = BatchQueues::new(100);
    assert!(queues.next_batch().is_none());
    assert!(queues.is_empty());
}

#[test]
fn test_packs_until_ceiling() {
    // each record is 1 + 1 + 8 = 10 bytes
    let queues = BatchQueues::new(25);
    queues.push_records((0..5).map(|_| record(8)).collect());

    let first = queues.next_batch().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first.estimated_size(), 20);

    let second = queues.next_batch().unwrap();
    assert_eq!(second.len(), 2);

    let third = queues.next_batch().unwrap();
    assert_eq!(third.len(), 1);

    assert!(queues.next_batch().is_none());
}

#[test]
fn test_exact_fit_is_allowed() {
    let queues = BatchQueues::new(20);
    queues.push_records((0..3).map(|_| record(8)).collect());

    let batch = queues.next_batch().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(queues.accept_len(), 1);
}

#[test]
fn test_oversized_record_goes_alone() {
    let queues = BatchQueues::new(10);
    queues.push_records(vec![record(100), record(1)]);

    let big = queues.next_batch().unwrap();
    assert_eq!(big.len(), 1);
    assert!(big.estimated_size() > 10);

    let small = queues.next_batch().unwrap();
    assert_eq!(small.len(), 1);
}

#[test]
fn test_record_order_is_preserved() {
    let queues = BatchQueues::new(1_000);
    queues.push_records((1..=5).map(record).collect());

    let batch = queues.next_batch().unwrap();
    let sizes: Vec<usize> = batch.records().iter().map(Record::estimated_size).collect();
    let mut sorted = sizes.clone();
    sorted.sort_unstable();
    assert_eq!(sizes, sorted);
}

// =============================================================================
// Fallback
// =============================================================================

#[test]
fn test_fallback_drawn_first_and_whole() {
    let queues = BatchQueues::new(15);
    queues.push_records((0..3).map(|_| record(8)).collect());

    let failed = queues.next_batch().unwrap();
    let failed_id = failed.id();
    queues.requeue(Arc::new(failed));
    assert_eq!(queues.fallback_len(), 1);

    let retried = queues.next_batch().unwrap();
    assert_eq!(retried.id(), failed_id);
    assert_eq!(retried.len(), 1);
    assert_eq!(queues.fallback_len(), 0);
}

#[test]
fn test_batch_ids_are_unique() {
    let queues = BatchQueues::new(10);
    queues.push_records((0..3).map(|_| record(8)).collect());

    let a = queues.next_batch().unwrap().id();
    let b = queues.next_batch().unwrap().id();
    let c = queues.next_batch().unwrap().id();
    assert!(a != b && b != c && a != c);
}

#[test]
fn test_refresh_size_after_edit() {
    let queues = BatchQueues::new(1_000);
    queues.push_records(vec![record(8), record(8)]);

    let mut batch = queues.next_batch().unwrap();
    batch.records_mut().pop();
    batch.refresh_size();
    assert_eq!(batch.estimated_size(), 10);
}
