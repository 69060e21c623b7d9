use super::*;
use crate::batch::BatchQueues;
use crate::row::{Record, Row, Value};

fn batch_of(rows: usize) -> Batch {
    let queues = BatchQueues::new(usize::MAX);
    queues.push_records(
        (0..rows)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".to_string(), Value::Int(i as i64));
                row.insert("payload".to_string(), Value::from(vec![0xffu8, 0x00]));
                Record::encode(row)
            })
            .collect(),
    );
    queues.next_batch().unwrap()
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_append_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let dest = Destination::new("p", "d", "t");
    let channel = JsonLinesChannel::new(dir.path());

    channel.initialize(&dest).await.unwrap();
    let first = channel.append(&batch_of(2)).await.unwrap();
    let second = channel.append(&batch_of(3)).await.unwrap();
    channel.close().await;

    assert_eq!(first.offset, Some(0));
    assert_eq!(second.offset, Some(2));

    let lines = read_lines(&dir.path().join("p.d.t.jsonl"));
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[1]["id"], 1);
    assert_eq!(lines[1]["payload"], "/wA=");
}

#[tokio::test]
async fn test_append_before_initialize_fails_precondition() {
    let dir = tempfile::tempdir().unwrap();
    let channel = JsonLinesChannel::new(dir.path());

    let err = channel.append(&batch_of(1)).await.unwrap_err();
    assert_eq!(err.code(), Some(Code::FailedPrecondition));
}

#[tokio::test]
async fn test_reinitialize_keeps_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let dest = Destination::new("p", "d", "t");
    let channel = JsonLinesChannel::new(dir.path().join("nested"));

    channel.initialize(&dest).await.unwrap();
    channel.append(&batch_of(1)).await.unwrap();
    channel.initialize(&dest).await.unwrap();
    let resp = channel.append(&batch_of(1)).await.unwrap();
    channel.close().await;

    // offsets restart with the new session, the file is appended to
    assert_eq!(resp.offset, Some(0));
    let path = JsonLinesChannel::path_for(&dir.path().join("nested"), &dest);
    assert_eq!(read_lines(&path).len(), 2);
}

#[tokio::test]
async fn test_factory_creates_independent_channels() {
    let dir = tempfile::tempdir().unwrap();
    let factory = JsonLinesChannelFactory::new(dir.path());

    let a = factory.create(&Destination::new("p", "d", "a"));
    let b = factory.create(&Destination::new("p", "d", "b"));
    a.initialize(&Destination::new("p", "d", "a")).await.unwrap();

    // b has its own session, still closed
    assert!(b.append(&batch_of(1)).await.is_err());
    a.close().await;
}
