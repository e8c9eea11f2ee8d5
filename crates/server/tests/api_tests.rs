//! Integration tests for the HTTP API.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::fixtures::{sha256_hex, split_into_chunks};
use common::TestServer;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper to make JSON requests.
async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Helper to POST raw chunk bytes.
async fn post_chunk(
    router: &axum::Router,
    upload_id: u64,
    chunk_number: u64,
    data: Vec<u8>,
    gzip: bool,
) -> (StatusCode, Value) {
    let uri = format!("/api/v1/files/upload/{upload_id}/{chunk_number}");
    let mut builder = Request::builder().method("POST").uri(uri);
    if gzip {
        builder = builder.header("Content-Encoding", "gzip");
    }
    let request = builder.body(Body::from(data)).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
    (status, json)
}

fn init_body(data: &[u8], chunk_size: u64, is_reupload: bool) -> Value {
    let total_chunks = (data.len() as u64).div_ceil(chunk_size);
    json!({
        "checksum": sha256_hex(data),
        "total_size": data.len() as u64,
        "total_chunks": total_chunks,
        "chunk_size": chunk_size,
        "is_reupload": is_reupload,
    })
}

/// Upload a complete file and return its upload id.
async fn upload_file(server: &TestServer, name: &str, data: &[u8], chunk_size: u64) -> u64 {
    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("/api/v1/files/upload/init/{name}"),
        Some(init_body(data, chunk_size, false)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "init failed: {body}");
    let upload_id = body["upload_id"].as_u64().unwrap();

    for (number, chunk) in split_into_chunks(data, chunk_size as usize)
        .into_iter()
        .enumerate()
    {
        let (status, body) = post_chunk(&server.router, upload_id, number as u64, chunk, false).await;
        assert_eq!(status, StatusCode::OK, "chunk {number} failed: {body}");
        assert_eq!(body["status"], "OK");
    }

    upload_id
}

async fn gzip_compress(data: &[u8]) -> Vec<u8> {
    use async_compression::tokio::write::GzipEncoder;
    use tokio::io::AsyncWriteExt;

    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(data).await.unwrap();
    encoder.shutdown().await.unwrap();
    encoder.into_inner()
}

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;
    let (status, body) = json_request(&server.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn test_fresh_small_upload() {
    let server = TestServer::new().await;
    let data = b"hello world";

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/hello.txt",
        Some(init_body(data, 4, false)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let upload_id = body["upload_id"].as_u64().unwrap();
    assert!(body.get("missing_chunk_info").is_none());

    for (number, chunk) in split_into_chunks(data, 4).into_iter().enumerate() {
        let (status, body) = post_chunk(&server.router, upload_id, number as u64, chunk, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
    }

    // Stats report a fully uploaded file.
    let (status, stats) =
        json_request(&server.router, "GET", "/api/v1/files/hello.txt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["status"], "UPLOADED");
    assert_eq!(stats["total_chunks"], 3);
    assert_eq!(stats["uploaded_chunks"], 3);
    assert_eq!(stats["checksum"], sha256_hex(data));
    assert!(stats["checksum"].as_str().unwrap().starts_with("b94d27b9"));
    assert!(stats["upload_timeout_second"].as_u64().unwrap() > 0);

    // The listing contains the file.
    let (status, listing) = json_request(&server.router, "GET", "/api/v1/files", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["files"], json!(["hello.txt"]));

    // Bytes on disk concatenate back to the original content.
    let mut reassembled = Vec::new();
    for number in 0..3 {
        let path = server.storage_dir.join("hello.txt").join(number.to_string());
        reassembled.extend(std::fs::read(&path).unwrap());
    }
    assert_eq!(reassembled, data);
}

#[tokio::test]
async fn test_gzip_chunk_bodies() {
    let server = TestServer::new().await;
    let data = b"gzip encoded transfer";

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/zipped.bin",
        Some(init_body(data, 8, false)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let upload_id = body["upload_id"].as_u64().unwrap();

    for (number, chunk) in split_into_chunks(data, 8).into_iter().enumerate() {
        let compressed = gzip_compress(&chunk).await;
        let (status, _) =
            post_chunk(&server.router, upload_id, number as u64, compressed, true).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/zipped.bin", None).await;
    assert_eq!(stats["status"], "UPLOADED");

    // The server stored the decompressed bytes.
    let stored = std::fs::read(server.storage_dir.join("zipped.bin").join("0")).unwrap();
    assert_eq!(&stored, &data[..8]);
}

#[tokio::test]
async fn test_stats_for_missing_file_is_null() {
    let server = TestServer::new().await;
    let (status, body) = json_request(&server.router, "GET", "/api/v1/files/nope.txt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_init_rejects_bad_requests() {
    let server = TestServer::new().await;

    // Empty file.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/empty.txt",
        Some(json!({
            "checksum": sha256_hex(b""),
            "total_size": 0,
            "total_chunks": 0,
            "chunk_size": 4,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    // total_chunks inconsistent with total_size / chunk_size.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/mismatch.txt",
        Some(json!({
            "checksum": sha256_hex(b"hello world"),
            "total_size": 11,
            "total_chunks": 5,
            "chunk_size": 4,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    // Malformed body.
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/files/upload/init/garbage.txt")
        .header("Content-Type", "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Dot-dot file name never reaches the engine.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/..",
        Some(init_body(b"x", 4, false)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_chunk_number_out_of_range() {
    let server = TestServer::new().await;
    let data = b"hello world";
    let (_, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/range.txt",
        Some(init_body(data, 4, false)),
    )
    .await;
    let upload_id = body["upload_id"].as_u64().unwrap();

    // chunk_number == total_chunks is one past the end.
    let (status, body) = post_chunk(&server.router, upload_id, 3, b"x".to_vec(), false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    // Non-numeric ids are rejected at parse time.
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/files/upload/abc/0")
        .body(Body::from(&b"x"[..]))
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rewrite_of_uploaded_chunk_is_rejected() {
    let server = TestServer::new().await;
    let data = b"hello world";
    let upload_id = upload_file(&server, "done.txt", data, 4).await;

    let (status, body) = post_chunk(&server.router, upload_id, 0, b"hell".to_vec(), false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    // No state was disturbed by the rejected write.
    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/done.txt", None).await;
    assert_eq!(stats["status"], "UPLOADED");
    assert_eq!(stats["uploaded_chunks"], 3);
}

#[tokio::test]
async fn test_resume_sends_only_missing_chunks() {
    let server = TestServer::new().await;
    let data = b"hello world";
    let chunks = split_into_chunks(data, 4);

    let (_, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/resume.txt",
        Some(init_body(data, 4, false)),
    )
    .await;
    let upload_id = body["upload_id"].as_u64().unwrap();

    // First attempt delivers chunks 0 and 2 and then dies.
    post_chunk(&server.router, upload_id, 0, chunks[0].clone(), false).await;
    post_chunk(&server.router, upload_id, 2, chunks[2].clone(), false).await;

    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/resume.txt", None).await;
    assert_eq!(stats["status"], "IN_PROGRESS");
    assert_eq!(stats["uploaded_chunks"], 2);

    // Second attempt resumes; the server owns the missing set.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/resume.txt",
        Some(init_body(data, 4, true)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upload_id"].as_u64().unwrap(), upload_id);
    let info = &body["missing_chunk_info"];
    assert_eq!(info["max_size"], 4);
    assert_eq!(info["chunk_numbers"], json!([1]));

    let (status, _) = post_chunk(&server.router, upload_id, 1, chunks[1].clone(), false).await;
    assert_eq!(status, StatusCode::OK);

    // The interrupted-then-resumed upload ends in the same state as an
    // uninterrupted one.
    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/resume.txt", None).await;
    assert_eq!(stats["status"], "UPLOADED");
    assert_eq!(stats["uploaded_chunks"], 3);

    let mut reassembled = Vec::new();
    for number in 0..3 {
        let path = server
            .storage_dir
            .join("resume.txt")
            .join(number.to_string());
        reassembled.extend(std::fs::read(&path).unwrap());
    }
    assert_eq!(reassembled, data);
}

#[tokio::test]
async fn test_conflicting_content_is_refused_until_deleted() {
    let server = TestServer::new().await;
    upload_file(&server, "a.txt", b"AAA", 4).await;

    // Same name, different content.
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/a.txt",
        Some(init_body(b"BBB", 4, false)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");

    // Refusal left the original untouched.
    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/a.txt", None).await;
    assert_eq!(stats["checksum"], sha256_hex(b"AAA"));

    // Deleting the old entry unblocks the new upload.
    let (status, _) = json_request(&server.router, "DELETE", "/api/v1/files/a.txt", None).await;
    assert_eq!(status, StatusCode::OK);
    upload_file(&server, "a.txt", b"BBB", 4).await;

    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/a.txt", None).await;
    assert_eq!(stats["checksum"], sha256_hex(b"BBB"));
}

#[tokio::test]
async fn test_reinit_of_uploaded_file_is_rejected() {
    let server = TestServer::new().await;
    let data = b"hello world";
    upload_file(&server, "final.txt", data, 4).await;

    for is_reupload in [false, true] {
        let (status, body) = json_request(
            &server.router,
            "POST",
            "/api/v1/files/upload/init/final.txt",
            Some(init_body(data, 4, is_reupload)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }
}

#[tokio::test]
async fn test_delete_removes_everything_and_is_not_idempotent() {
    let server = TestServer::new().await;
    let data = b"hello world";
    upload_file(&server, "victim.txt", data, 4).await;
    assert!(server.storage_dir.join("victim.txt").exists());

    let (status, _) = json_request(&server.router, "DELETE", "/api/v1/files/victim.txt", None).await;
    assert_eq!(status, StatusCode::OK);

    // Row, chunk rows and directory are all gone.
    assert!(!server.storage_dir.join("victim.txt").exists());
    let (_, listing) = json_request(&server.router, "GET", "/api/v1/files", None).await;
    assert_eq!(listing["files"], json!([]));
    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/victim.txt", None).await;
    assert_eq!(stats, Value::Null);

    // A second delete reports NOT_FOUND with no side effects.
    let (status, body) =
        json_request(&server.router, "DELETE", "/api/v1/files/victim.txt", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["status_code"], 404);
}

#[tokio::test]
async fn test_insufficient_space_is_file_storage_error() {
    let server = TestServer::with_space(100).await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/big.bin",
        Some(json!({
            "checksum": sha256_hex(b"irrelevant"),
            "total_size": 200,
            "total_chunks": 1,
            "chunk_size": 200,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "FILE_STORAGE");

    // No row was created and the accountant is unchanged.
    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/big.bin", None).await;
    assert_eq!(stats, Value::Null);
    assert_eq!(server.state.engine.space().available(), 100);
}

#[tokio::test]
async fn test_single_chunk_file_larger_chunk_size() {
    let server = TestServer::new().await;
    let data = b"tiny";

    // chunk_size larger than the file: exactly one chunk holding all bytes.
    let upload_id = upload_file(&server, "tiny.bin", data, 1024).await;
    assert!(upload_id > 0);

    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/tiny.bin", None).await;
    assert_eq!(stats["total_chunks"], 1);
    assert_eq!(stats["status"], "UPLOADED");

    let stored = std::fs::read(server.storage_dir.join("tiny.bin").join("0")).unwrap();
    assert_eq!(&stored, data);
}

#[tokio::test]
async fn test_chunks_accepted_in_any_order() {
    let server = TestServer::new().await;
    let data = b"hello world";
    let (_, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/reversed.txt",
        Some(init_body(data, 4, false)),
    )
    .await;
    let upload_id = body["upload_id"].as_u64().unwrap();

    // Completion order is not the chunk order.
    for (number, chunk) in split_into_chunks(data, 4).into_iter().enumerate().rev() {
        let (status, _) = post_chunk(&server.router, upload_id, number as u64, chunk, false).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/reversed.txt", None).await;
    assert_eq!(stats["status"], "UPLOADED");

    let mut reassembled = Vec::new();
    for number in 0..3 {
        let path = server
            .storage_dir
            .join("reversed.txt")
            .join(number.to_string());
        reassembled.extend(std::fs::read(&path).unwrap());
    }
    assert_eq!(reassembled, data);
}

#[tokio::test]
async fn test_concurrent_chunk_posts() {
    let server = TestServer::new().await;
    let data = common::fixtures::seeded_bytes(42, 8 * 1024);
    let chunk_size = 1024u64;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/parallel.bin",
        Some(init_body(&data, chunk_size, false)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let upload_id = body["upload_id"].as_u64().unwrap();

    // All eight chunks race through separate router clones.
    let mut tasks = Vec::new();
    for (number, chunk) in split_into_chunks(&data, chunk_size as usize)
        .into_iter()
        .enumerate()
    {
        let router = server.router.clone();
        tasks.push(tokio::spawn(async move {
            post_chunk(&router, upload_id, number as u64, chunk, false).await
        }));
    }
    for task in tasks {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK, "chunk failed: {body}");
    }

    // Exactly one promotion; the counter matches the chunk rows.
    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/parallel.bin", None).await;
    assert_eq!(stats["status"], "UPLOADED");
    assert_eq!(stats["uploaded_chunks"], 8);

    let row = server
        .metadata()
        .get_file_by_name("parallel.bin")
        .await
        .unwrap()
        .unwrap();
    let uploaded_rows = server
        .metadata()
        .get_chunks_by_parent(row.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.status == "UPLOADED")
        .count() as i64;
    assert_eq!(row.uploaded_chunks, uploaded_rows);
}

#[tokio::test]
async fn test_delete_of_partial_upload() {
    let server = TestServer::new().await;
    let data = b"hello world";
    let chunks = split_into_chunks(data, 4);

    let (_, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/partial.txt",
        Some(init_body(data, 4, false)),
    )
    .await;
    let upload_id = body["upload_id"].as_u64().unwrap();
    post_chunk(&server.router, upload_id, 0, chunks[0].clone(), false).await;

    // The client's failure path deletes the partial row; everything goes.
    let (status, _) =
        json_request(&server.router, "DELETE", "/api/v1/files/partial.txt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!server.storage_dir.join("partial.txt").exists());
    let (_, stats) = json_request(&server.router, "GET", "/api/v1/files/partial.txt", None).await;
    assert_eq!(stats, Value::Null);
}

#[tokio::test]
async fn test_chunk_write_for_unknown_upload() {
    let server = TestServer::new().await;
    let (status, body) = post_chunk(&server.router, 999, 0, b"data".to_vec(), false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(body["status_code"], 400);
}

#[tokio::test]
async fn test_list_contains_only_uploaded_files() {
    let server = TestServer::new().await;
    upload_file(&server, "full.txt", b"complete", 4).await;

    // A second file stays partial.
    let (_, body) = json_request(
        &server.router,
        "POST",
        "/api/v1/files/upload/init/half.txt",
        Some(init_body(b"incomplete", 4, false)),
    )
    .await;
    let upload_id = body["upload_id"].as_u64().unwrap();
    post_chunk(&server.router, upload_id, 0, b"inco".to_vec(), false).await;

    let (_, listing) = json_request(&server.router, "GET", "/api/v1/files", None).await;
    assert_eq!(listing["files"], json!(["full.txt"]));
}
