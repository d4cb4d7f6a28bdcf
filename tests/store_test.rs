//! Store integration tests: chunk index + chunked store + chunk backends.
//!
//! Run with: `cargo test`

use std::time::Instant;

use tempfile::TempDir;

use ledgerstore::config::Config;
use ledgerstore::error::StoreError;
use ledgerstore::storage::writer::{spawn_writer, AppendRequest};
use ledgerstore::storage::{BinaryChunkStore, ChunkIndex, ChunkedStore, TextChunkStore};

fn tmp_dir() -> TempDir {
    // Honor RUST_LOG when debugging a failing test.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    tempfile::tempdir().expect("create tempdir")
}

fn value(key: u64) -> Vec<u8> {
    format!("{key} Some data").into_bytes()
}

/// Populated store: chunk size 3, 101 records — 34 chunks, last holds 2.
fn populated(dir: &TempDir) -> ChunkedStore<TextChunkStore> {
    let mut store =
        ChunkedStore::<TextChunkStore>::open(dir.path(), 3, false).expect("open store");
    for key in 1..=101u64 {
        store.append(&value(key)).expect("append");
    }
    store
}

#[test]
fn test_key_to_chunk_arithmetic() {
    let index = ChunkIndex::new(3);
    assert_eq!(index.chunk_for(1).expect("chunk"), 1);
    assert_eq!(index.chunk_for(3).expect("chunk"), 1);
    assert_eq!(index.chunk_for(4).expect("chunk"), 2);
    assert_eq!(index.chunk_for(101).expect("chunk"), 34);
    assert_eq!(index.first_key_of(1), 1);
    assert_eq!(index.first_key_of(2), 4);
    assert_eq!(index.last_key_of(2), 6);
    assert_eq!(index.last_key_of(34), 102);
    assert!(matches!(index.chunk_for(0), Err(StoreError::InvalidKey(0))));
}

#[test]
fn test_empty_store() {
    let dir = tmp_dir();
    let store = ChunkedStore::<TextChunkStore>::open(dir.path(), 3, false).expect("open");
    assert_eq!(store.num_keys(), 0);
    assert_eq!(store.chunk_count(), 0);
    assert_eq!(store.iter().expect("iter").count(), 0);
    assert!(matches!(
        store.get(1),
        Err(StoreError::KeyNotFound { key: 1, num_keys: 0 })
    ));
    assert!(matches!(
        store.get_range(1, 1),
        Err(StoreError::InvalidRange { start: 1, end: 1 })
    ));
}

#[test]
fn test_write_rolls_to_new_chunk_once_full() {
    let dir = tmp_dir();
    let store = populated(&dir);

    assert_eq!(store.num_keys(), 101);
    assert_eq!(store.chunk_count(), 34);

    // One file per chunk, named after its first key, every chunk full
    // except the last which holds the 2 remaining records.
    let mut files: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .map(|e| e.expect("entry").path())
        .collect();
    assert_eq!(files.len(), 34);
    files.sort_by_key(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<u64>().ok())
            .expect("numeric chunk file name")
    });
    for (i, path) in files.iter().enumerate() {
        let lines = std::fs::read_to_string(path).expect("read chunk").lines().count();
        if i == 33 {
            assert_eq!(lines, 2, "last chunk holds the 2 remaining records");
        } else {
            assert_eq!(lines, 3, "chunk {i} should be full");
        }
    }
}

#[test]
fn test_point_retrieval_across_chunks() {
    let dir = tmp_dir();
    let store = populated(&dir);

    for key in [1, 6, 7, 10, 12, 99, 101] {
        assert_eq!(store.get(key).expect("get"), value(key));
    }
    assert_eq!(store.get(7).expect("get"), b"7 Some data");

    assert!(matches!(store.get(0), Err(StoreError::KeyNotFound { .. })));
    assert!(matches!(store.get(102), Err(StoreError::KeyNotFound { .. })));
}

#[test]
fn test_num_keys_is_cheaper_than_iteration() {
    let dir = tmp_dir();
    let store = populated(&dir);

    let started = Instant::now();
    let counted = store
        .iter()
        .expect("iter")
        .map(|r| r.expect("record"))
        .count() as u64;
    let iteration = started.elapsed();

    let started = Instant::now();
    let maintained = store.num_keys();
    let counter = started.elapsed();

    assert_eq!(counted, maintained);
    assert_eq!(maintained, 101);
    assert!(
        iteration > counter,
        "counting by iteration ({iteration:?}) should be slower than num_keys ({counter:?})"
    );
}

#[test]
fn test_range_spans_chunks() {
    let dir = tmp_dir();
    let store = populated(&dir);

    // Range begins and ends at chunk boundaries.
    let items: Vec<(u64, Vec<u8>)> = store
        .get_range(4, 6)
        .expect("range")
        .map(|r| r.expect("record"))
        .collect();
    assert_eq!(items, vec![(4, value(4)), (5, value(5)), (6, value(6))]);

    // Range does not begin or end at chunk boundaries; spans chunks 2-4.
    let items: Vec<(u64, Vec<u8>)> = store
        .get_range(5, 10)
        .expect("range")
        .map(|r| r.expect("record"))
        .collect();
    assert_eq!(items.len(), 6);
    for (offset, (key, val)) in items.iter().enumerate() {
        assert_eq!(*key, 5 + offset as u64);
        assert_eq!(*val, value(*key));
    }

    // Range spans multiple full chunks.
    let items: Vec<(u64, Vec<u8>)> = store
        .get_range(5, 16)
        .expect("range")
        .map(|r| r.expect("record"))
        .collect();
    assert_eq!(items.len(), 12);

    // Single-key range.
    let items: Vec<(u64, Vec<u8>)> = store
        .get_range(7, 7)
        .expect("range")
        .map(|r| r.expect("record"))
        .collect();
    assert_eq!(items, vec![(7, value(7))]);

    // A range matches the full iterator filtered to the same bounds.
    let filtered: Vec<(u64, Vec<u8>)> = store
        .iter()
        .expect("iter")
        .map(|r| r.expect("record"))
        .filter(|(key, _)| (5..=10).contains(key))
        .collect();
    let ranged: Vec<(u64, Vec<u8>)> = store
        .get_range(5, 10)
        .expect("range")
        .map(|r| r.expect("record"))
        .collect();
    assert_eq!(filtered, ranged);
}

#[test]
fn test_range_rejects_malformed_bounds() {
    let dir = tmp_dir();
    let store = populated(&dir);

    assert!(matches!(
        store.get_range(0, 5),
        Err(StoreError::InvalidRange { start: 0, end: 5 })
    ));
    assert!(matches!(
        store.get_range(5, 4),
        Err(StoreError::InvalidRange { start: 5, end: 4 })
    ));
    assert!(matches!(
        store.get_range(1, 102),
        Err(StoreError::InvalidRange { start: 1, end: 102 })
    ));
}

#[test]
fn test_iterator_yields_write_order() {
    let dir = tmp_dir();
    let store = populated(&dir);

    let items: Vec<(u64, Vec<u8>)> = store
        .iter()
        .expect("iter")
        .map(|r| r.expect("record"))
        .collect();
    assert_eq!(items.len(), 101);
    for (offset, (key, val)) in items.iter().enumerate() {
        assert_eq!(*key, offset as u64 + 1);
        assert_eq!(*val, value(*key));
    }
}

#[test]
fn test_iterators_are_independent() {
    let dir = tmp_dir();
    let store = populated(&dir);

    let mut first = store.iter().expect("iter");
    // Drain a few records from the first sequence.
    for _ in 0..10 {
        first.next().expect("item").expect("record");
    }
    // A second sequence still starts from key 1.
    let mut second = store.iter().expect("iter");
    assert_eq!(second.next().expect("item").expect("record").0, 1);
    assert_eq!(first.next().expect("item").expect("record").0, 11);
}

#[test]
fn test_explicit_keys_fill_chunks_exactly() {
    let dir = tmp_dir();
    let mut store = ChunkedStore::<TextChunkStore>::open(dir.path(), 2, false).expect("open");

    for key in 1..=100u64 {
        store.put(key, &value(key)).expect("put");
    }

    assert_eq!(store.num_keys(), 100);
    assert_eq!(store.chunk_count(), 50);
    assert_eq!(store.iter().expect("iter").count(), 100);

    for path in std::fs::read_dir(dir.path()).expect("read dir") {
        let path = path.expect("entry").path();
        let lines = std::fs::read_to_string(&path).expect("read chunk").lines().count();
        assert_eq!(lines, 2, "every chunk of {path:?} should be exactly full");
    }
}

#[test]
fn test_out_of_order_explicit_key_fails_fast() {
    let dir = tmp_dir();
    let mut store = ChunkedStore::<TextChunkStore>::open(dir.path(), 3, false).expect("open");

    store.put(1, b"one").expect("put");
    assert!(matches!(
        store.put(3, b"three"),
        Err(StoreError::OutOfOrderKey { expected: 2, got: 3 })
    ));
    assert!(matches!(
        store.put(1, b"one again"),
        Err(StoreError::OutOfOrderKey { expected: 2, got: 1 })
    ));
    assert!(matches!(store.put(0, b"zero"), Err(StoreError::InvalidKey(0))));

    // Failed puts must not advance the counter.
    assert_eq!(store.num_keys(), 1);
    store.put(2, b"two").expect("put");
    assert_eq!(store.num_keys(), 2);
}

#[test]
fn test_reset_clears_store() {
    let dir = tmp_dir();
    let mut store = populated(&dir);

    store.reset().expect("reset");
    assert_eq!(store.num_keys(), 0);
    assert_eq!(store.chunk_count(), 0);
    assert_eq!(
        std::fs::read_dir(dir.path()).expect("read dir").count(),
        0,
        "no chunk files should remain"
    );

    // Idempotent on an already-empty store.
    store.reset().expect("reset again");

    // Writes behave as on first use.
    assert_eq!(store.append(b"fresh").expect("append"), 1);
    assert_eq!(store.chunk_count(), 1);
    assert!(dir.path().join("1").exists());
    assert_eq!(store.get(1).expect("get"), b"fresh");
}

#[test]
fn test_close_is_terminal_and_idempotent() {
    let dir = tmp_dir();
    let mut store = ChunkedStore::<TextChunkStore>::open(dir.path(), 2, false).expect("open");
    for key in 1..=5u64 {
        store.append(&value(key)).expect("append");
    }

    store.close().expect("close");
    store.close().expect("close again");
    assert!(store.is_closed());

    // The counter needs no file handle and still answers.
    assert_eq!(store.num_keys(), 5);

    assert!(matches!(store.get(1), Err(StoreError::StoreClosed)));
    assert!(matches!(store.append(b"x"), Err(StoreError::StoreClosed)));
    assert!(matches!(store.put(6, b"x"), Err(StoreError::StoreClosed)));
    assert!(store.iter().is_err());
    assert!(store.get_range(1, 2).is_err());

    // Reset wipes the data and revives the store.
    store.reset().expect("reset");
    assert!(!store.is_closed());
    assert_eq!(store.num_keys(), 0);
    assert_eq!(store.append(b"again").expect("append"), 1);
}

#[test]
fn test_restart_recovery() {
    let dir = tmp_dir();

    // Phase 1: write 7 records and drop the store — simulates a restart.
    {
        let mut store =
            ChunkedStore::<TextChunkStore>::open(dir.path(), 3, true).expect("open");
        for key in 1..=7u64 {
            store.append(&value(key)).expect("append");
        }
    }

    // Phase 2: reopen; the index is rebuilt from the directory listing and
    // the counter from per-chunk counts.
    {
        let mut store =
            ChunkedStore::<TextChunkStore>::open(dir.path(), 3, true).expect("reopen");
        assert_eq!(store.num_keys(), 7);
        assert_eq!(store.chunk_count(), 3);
        assert_eq!(store.get(5).expect("get"), value(5));

        // Appends continue exactly where the previous session stopped.
        assert_eq!(store.append(&value(8)).expect("append"), 8);
        let lines = std::fs::read_to_string(dir.path().join("7"))
            .expect("read chunk")
            .lines()
            .count();
        assert_eq!(lines, 2, "keys 7 and 8 share the third chunk");
    }
}

#[test]
fn test_text_and_binary_stores_agree() {
    let dir = tmp_dir();
    let chunk_size = 3u64;
    let mut text = ChunkedStore::<TextChunkStore>::open(&dir.path().join("text"), chunk_size, false)
        .expect("open text");
    let mut binary =
        ChunkedStore::<BinaryChunkStore>::open(&dir.path().join("binary"), chunk_size, false)
            .expect("open binary");

    for key in 1..(5 * chunk_size) {
        let val = key.to_string().into_bytes();
        text.append(&val).expect("append text");
        binary.append(&val).expect("append binary");

        let from_text: Vec<(u64, Vec<u8>)> = text
            .iter()
            .expect("iter text")
            .map(|r| r.expect("record"))
            .collect();
        let from_binary: Vec<(u64, Vec<u8>)> = binary
            .iter()
            .expect("iter binary")
            .map(|r| r.expect("record"))
            .collect();
        assert_eq!(from_text, from_binary);
    }
}

#[test]
fn test_binary_store_handles_arbitrary_bytes() {
    let dir = tmp_dir();
    let mut store = ChunkedStore::<BinaryChunkStore>::open(dir.path(), 4, false).expect("open");

    let values: Vec<Vec<u8>> = vec![
        b"line\nbreak".to_vec(),
        vec![0x00, 0xFF, 0x7C, 0x0A],
        Vec::new(),
        b"plain".to_vec(),
        vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00],
    ];
    for val in &values {
        store.append(val).expect("append");
    }
    for (offset, val) in values.iter().enumerate() {
        assert_eq!(&store.get(offset as u64 + 1).expect("get"), val);
    }

    // The line-based backend refuses values that would corrupt its format.
    let mut text =
        ChunkedStore::<TextChunkStore>::open(&dir.path().join("text"), 4, false).expect("open");
    assert!(matches!(
        text.append(b"line\nbreak"),
        Err(StoreError::WriteFailure { .. })
    ));
    assert!(matches!(
        text.append(&[0xFF, 0xFE]),
        Err(StoreError::WriteFailure { .. })
    ));
    assert_eq!(text.num_keys(), 0);
}

#[test]
fn test_binary_reopen_truncates_torn_record() {
    use std::io::Write;

    let dir = tmp_dir();

    {
        let mut store =
            ChunkedStore::<BinaryChunkStore>::open(dir.path(), 10, true).expect("open");
        for key in 1..=3u64 {
            store.append(&value(key)).expect("append");
        }
    }

    // Simulate an append interrupted mid-record: a header claiming more
    // payload than the file holds.
    let chunk_path = dir.path().join("1");
    let intact_len = std::fs::metadata(&chunk_path).expect("metadata").len();
    {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&chunk_path)
            .expect("open chunk");
        file.write_all(b"CREC").expect("write magic");
        file.write_all(&1024u32.to_le_bytes()).expect("write length");
        file.write_all(b"only a fragment").expect("write fragment");
    }

    let mut store = ChunkedStore::<BinaryChunkStore>::open(dir.path(), 10, true).expect("reopen");
    assert_eq!(store.num_keys(), 3, "torn record must not be counted");
    assert_eq!(
        std::fs::metadata(&chunk_path).expect("metadata").len(),
        intact_len,
        "torn bytes should be truncated away"
    );
    assert_eq!(store.get(3).expect("get"), value(3));
    assert_eq!(store.append(&value(4)).expect("append"), 4);
    assert_eq!(store.get(4).expect("get"), value(4));
}

#[tokio::test]
async fn test_append_writer_end_to_end() {
    let dir = tmp_dir();
    let store = ChunkedStore::<TextChunkStore>::open(dir.path(), 3, false).expect("open");

    let (tx, shared, handle) = spawn_writer(store, 64);

    for key in 1..=5u64 {
        tx.send(AppendRequest { value: value(key) }).await.expect("send");
    }

    // Drop the sender so the writer loop exits, then wait for it to drain.
    drop(tx);
    handle.await.expect("writer task");

    let store = shared.read();
    assert_eq!(store.num_keys(), 5);
    assert_eq!(store.chunk_count(), 2);
    assert_eq!(store.get(3).expect("get"), value(3));
}

#[test]
fn test_config_defaults_and_validation() {
    let dir = tmp_dir();
    let base_path = dir.path().join("data");

    let config_path = dir.path().join("store.toml");
    std::fs::write(
        &config_path,
        format!("[storage]\nbase_path = {:?}\n", base_path),
    )
    .expect("write config");
    let config = Config::from_file(&config_path).expect("load config");
    assert_eq!(config.storage.chunk_size, 1000);
    assert!(config.storage.ensure_durability);
    assert_eq!(config.storage.writer_queue_size, 256);

    let invalid_path = dir.path().join("invalid.toml");
    std::fs::write(
        &invalid_path,
        format!("[storage]\nbase_path = {:?}\nchunk_size = 0\n", base_path),
    )
    .expect("write config");
    assert!(matches!(
        Config::from_file(&invalid_path),
        Err(StoreError::Config(_))
    ));

    // A validated config opens a working store.
    let full_path = dir.path().join("full.toml");
    std::fs::write(
        &full_path,
        format!(
            "[storage]\nbase_path = {:?}\nchunk_size = 4\nensure_durability = false\n",
            base_path
        ),
    )
    .expect("write config");
    let config = Config::from_file(&full_path).expect("load config");
    let mut store =
        ChunkedStore::<TextChunkStore>::from_config(&config.storage).expect("open store");
    assert_eq!(store.chunk_size(), 4);
    assert_eq!(store.append(b"configured").expect("append"), 1);
    assert_eq!(store.get(1).expect("get"), b"configured");
}
