/// Protocol-level tests against file-backed stores: the engine is driven
/// exactly the way an external client would drive it, through JSON
/// requests on the `Engine` trait.
use cdas_core::engine::{Engine, EngineProvider};

use cdas_engine::NativeProvider;

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("cdas_engine_test_{}.cdas", name))
}

fn open(config: &serde_json::Value) -> Box<dyn Engine> {
    NativeProvider.open(&config.to_string()).unwrap()
}

fn store_chunk(engine: &mut dyn Engine, codec: &str, values: &[i64]) -> serde_json::Value {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let request = serde_json::json!({
        "op_type": "StoreChunk",
        "data_spec": { "dtype": "INT64", "shape": [values.len()] },
        "encoding": { "codec": codec },
    });
    let response = engine
        .execute(&request.to_string(), Some(&bytes), None)
        .unwrap();
    serde_json::from_str(&response).unwrap()
}

fn load_all(engine: &mut dyn Engine, total_values: usize) -> Vec<i64> {
    let request = serde_json::json!({
        "op_type": "LoadChunks",
        "selection": { "type": "All" },
        "check_checksums": true,
    });
    let mut out = vec![0u8; total_values * 8];
    engine
        .execute(&request.to_string(), None, Some(&mut out))
        .unwrap();
    out.chunks_exact(8)
        .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

#[test]
fn test_file_store_roundtrip_raw_and_zstd() {
    let path = temp_path("roundtrip");
    let create = serde_json::json!({
        "backend": { "type": "File", "mode": "WriteTruncate", "path": path },
    });

    let mut engine = open(&create);
    let result = store_chunk(engine.as_mut(), "RAW", &[1, 2, 3]);
    assert_eq!(result["result"]["details"]["chunk_index"], 0);
    assert_eq!(result["result"]["details"]["original_size"], 24);

    let result = store_chunk(engine.as_mut(), "ZSTD_COMPRESSED", &[4, 5, 6, 7]);
    assert_eq!(result["result"]["details"]["chunk_index"], 1);
    engine.close();

    // Reopen read-only and reconstruct everything.
    let read = serde_json::json!({
        "backend": { "type": "File", "mode": "Read", "path": path },
    });
    let mut engine = open(&read);
    assert_eq!(load_all(engine.as_mut(), 7), vec![1, 2, 3, 4, 5, 6, 7]);

    let response = engine
        .execute(r#"{"op_type":"Inspect"}"#, None, None)
        .unwrap();
    let inspected: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(inspected["result"]["total_chunks"], 2);
    assert_eq!(
        inspected["result"]["chunk_summaries"][0]["codec"],
        "RAW"
    );
    assert_eq!(
        inspected["result"]["chunk_summaries"][1]["codec"],
        "ZSTD_COMPRESSED"
    );
}

#[test]
fn test_append_mode_preserves_existing_chunks() {
    let path = temp_path("append");
    let create = serde_json::json!({
        "backend": { "type": "File", "mode": "WriteTruncate", "path": path },
        "writer_options": { "user_metadata_base64": "eyJ2IjoxfQ==" },
    });
    let mut engine = open(&create);
    store_chunk(engine.as_mut(), "RAW", &[10, 20]);
    engine.close();

    let append = serde_json::json!({
        "backend": { "type": "File", "mode": "WriteAppend", "path": path },
    });
    let mut engine = open(&append);
    store_chunk(engine.as_mut(), "ZSTD_COMPRESSED", &[30, 40]);
    engine.close();

    let read = serde_json::json!({
        "backend": { "type": "File", "mode": "Read", "path": path },
    });
    let mut engine = open(&read);
    assert_eq!(load_all(engine.as_mut(), 4), vec![10, 20, 30, 40]);

    // Metadata set at creation survives the append cycle.
    let response = engine
        .execute(r#"{"op_type":"GetUserMetadata"}"#, None, None)
        .unwrap();
    let meta: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(meta["result"]["user_metadata_base64"], "eyJ2IjoxfQ==");
}

#[test]
fn test_write_op_on_read_handle_fails() {
    let path = temp_path("read_only");
    let create = serde_json::json!({
        "backend": { "type": "File", "mode": "WriteTruncate", "path": path },
    });
    let mut engine = open(&create);
    store_chunk(engine.as_mut(), "RAW", &[1]);
    engine.close();

    let read = serde_json::json!({
        "backend": { "type": "File", "mode": "Read", "path": path },
    });
    let mut engine = open(&read);
    let request = serde_json::json!({
        "op_type": "StoreChunk",
        "data_spec": { "dtype": "INT64", "shape": [1] },
        "encoding": { "codec": "RAW" },
    });
    let failure = engine
        .execute(&request.to_string(), Some(&[0u8; 8]), None)
        .unwrap_err();
    assert_eq!(failure.code, -4);
    assert_eq!(failure.code_name, "OPERATION_FAILED");
}
