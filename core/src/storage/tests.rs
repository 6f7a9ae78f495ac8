#[cfg(test)]
mod tests {
    use crate::storage::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sqlite_log(dir: &TempDir) -> MessageLog {
        MessageLog::open(dir.path().join("queue.db"), 1024).expect("open store")
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(message_key("/queue/a", 7), "/queue/a.7");
        assert_eq!(write_marker_key("/queue/a"), "/queue/a.write");
    }

    #[test]
    fn test_destination_bound_fits_key_budget() {
        let name = "q".repeat(MAX_DESTINATION_LEN);
        assert!(message_key(&name, u64::MAX).len() <= MAX_KEY_LEN);
        assert!(write_marker_key(&name).len() <= MAX_KEY_LEN);
    }

    #[test]
    fn test_load_missing_destination_defaults_to_zero() {
        let log = MessageLog::in_memory();
        let counters = log.load("/queue/new").expect("load");
        assert_eq!(counters, SequenceCounters::default());
    }

    #[test]
    fn test_append_numbers_from_one_without_gaps() {
        let log = MessageLog::in_memory();
        let mut counters = log.load("/queue/a").expect("load");

        let seqs: Vec<u64> = (0..5)
            .map(|i| {
                log.append("/queue/a", &mut counters, format!("m{i}").as_bytes())
                    .expect("append")
            })
            .collect();

        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(counters.write, 5);
    }

    #[test]
    fn test_append_writes_message_and_marker() {
        let store = Arc::new(MemoryStore::new());
        let log = MessageLog::new(store.clone());
        let mut counters = SequenceCounters::default();

        log.append("/queue/a", &mut counters, b"hello").expect("append");

        assert_eq!(
            store.get("/queue/a.1").expect("get"),
            Some(b"hello".to_vec())
        );
        assert_eq!(
            store.get("/queue/a.write").expect("get"),
            Some(b"1".to_vec())
        );
        assert_eq!(
            store.keys_with_prefix("/queue/a."),
            vec!["/queue/a.1".to_string(), "/queue/a.write".to_string()]
        );
    }

    #[test]
    fn test_destinations_are_numbered_independently() {
        let log = MessageLog::in_memory();
        let mut a = SequenceCounters::default();
        let mut b = SequenceCounters::default();

        assert_eq!(log.append("/queue/a", &mut a, b"1").expect("append"), 1);
        assert_eq!(log.append("/queue/a", &mut a, b"2").expect("append"), 2);
        assert_eq!(log.append("/queue/b", &mut b, b"1").expect("append"), 1);
    }

    #[test]
    fn test_message_keys_are_never_overwritten() {
        let store = Arc::new(MemoryStore::new());
        let log = MessageLog::new(store.clone());
        let mut counters = SequenceCounters::default();
        log.append("/queue/a", &mut counters, b"first").expect("append");

        // Counters rewound behind the log's back must not clobber message 1.
        let mut stale = SequenceCounters::default();
        let err = log
            .append("/queue/a", &mut stale, b"second")
            .expect_err("duplicate key");

        assert!(matches!(err, StorageError::KeyExists(ref key) if key == "/queue/a.1"));
        assert_eq!(stale.write, 0);
        assert_eq!(
            store.get("/queue/a.1").expect("get"),
            Some(b"first".to_vec())
        );
        assert_eq!(
            store.get("/queue/a.write").expect("get"),
            Some(b"1".to_vec())
        );
    }

    #[test]
    fn test_append_rejects_oversized_key() {
        let log = MessageLog::in_memory();
        let mut counters = SequenceCounters::default();
        let name = "q".repeat(MAX_KEY_LEN);

        let err = log
            .append(&name, &mut counters, b"x")
            .expect_err("oversized key");
        assert!(matches!(err, StorageError::KeyTooLong { .. }));
        assert_eq!(counters.write, 0);
    }

    #[test]
    fn test_corrupt_marker_fails_load() {
        let store = Arc::new(MemoryStore::new());
        let mut batch = WriteBatch::new();
        batch.put("/queue/a.write", "not-a-number");
        store.write(batch).expect("write");

        let log = MessageLog::new(store);
        let err = log.load("/queue/a").expect_err("corrupt marker");
        assert!(matches!(err, StorageError::CorruptMarker { .. }));
    }

    #[test]
    fn test_memory_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let mut first = WriteBatch::new();
        first.insert("k1", "v1");
        store.write(first).expect("write");

        let mut batch = WriteBatch::new();
        batch.put("k2", "v2").insert("k1", "again");
        assert!(store.write(batch).is_err());

        assert_eq!(store.get("k2").expect("get"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sqlite_append_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");

        {
            let log = sqlite_log(&dir);
            let mut counters = log.load("/queue/orders").expect("load");
            for i in 1..=3u64 {
                let seq = log
                    .append("/queue/orders", &mut counters, format!("order {i}").as_bytes())
                    .expect("append");
                assert_eq!(seq, i);
            }
        }

        let log = sqlite_log(&dir);
        let mut counters = log.load("/queue/orders").expect("reload");
        assert_eq!(counters.write, 3);

        let seq = log
            .append("/queue/orders", &mut counters, b"order 4")
            .expect("append after restart");
        assert_eq!(seq, 4);
        assert_eq!(
            log.store().get("/queue/orders.2").expect("get"),
            Some(b"order 2".to_vec())
        );
    }

    #[test]
    fn test_sqlite_batch_rolls_back_on_duplicate_insert() {
        let dir = TempDir::new().expect("tempdir");
        let store = SqliteStore::open(dir.path().join("kv.db"), 256).expect("open");

        let mut batch = WriteBatch::new();
        batch.insert("a.1", "one").put("a.write", "1");
        store.write(batch).expect("write");

        let mut batch = WriteBatch::new();
        batch.put("a.write", "2").insert("a.1", "clobber");
        let err = store.write(batch).expect_err("duplicate");

        assert!(matches!(err, StorageError::KeyExists(_)));
        assert_eq!(store.get("a.write").expect("get"), Some(b"1".to_vec()));
        assert_eq!(store.get("a.1").expect("get"), Some(b"one".to_vec()));
    }

    #[test]
    fn test_sqlite_creates_parent_directories() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("queue.db");

        let store = SqliteStore::open(&path, 256).expect("open");
        assert_eq!(store.path(), path.as_path());
        assert!(path.exists());
    }
}
