mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use docpipe::client::{
    HttpTransport,
    PayloadKind,
    ProgressCallback,
    TransferProgress,
    UploadRequest,
};
use docpipe::{
    Error,
    ErrorKind,
    NormalizedResponse,
    ReqwestTransport,
    RequestClient,
    RequestConfig,
    UploadFile,
};
use common::{http_response, spawn_http_server};

fn client(base_url: &str) -> RequestClient {
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new().unwrap());
    RequestClient::new(transport)
        .with_base_url(base_url)
        .unwrap()
        .with_defaults(
            RequestConfig::get()
                .timeout(Duration::from_secs(5))
                .retries(2)
                .retry_delay(Duration::from_millis(10)),
        )
}

#[tokio::test]
async fn test_json_response_over_http() {
    let (base_url, server) = spawn_http_server(vec![http_response(
        "200 OK",
        &[("content-type", "application/json; charset=utf-8")],
        br#"{"success":true,"data":{"templates":["memo"]}}"#,
    )])
    .await;

    let value = client(&base_url).get_json("/api/templates").await.unwrap();
    assert_eq!(value["data"]["templates"][0], "memo");

    let requests = server.await.unwrap();
    let request = String::from_utf8_lossy(&requests[0]).to_ascii_lowercase();
    assert!(request.starts_with("get /api/templates http/1.1"));
    assert!(request.contains("content-type: application/json"));
}

#[tokio::test]
async fn test_document_response_over_http() {
    let body = b"PK\x03\x04 not really a zip";
    let (base_url, server) = spawn_http_server(vec![http_response(
        "200 OK",
        &[
            ("content-type", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            ("content-disposition", "attachment; filename=\"result.docx\""),
        ],
        body,
    )])
    .await;

    let response = client(&base_url)
        .request("/api/download?task_id=t-1&format=docx", RequestConfig::get())
        .await
        .unwrap();

    match response {
        NormalizedResponse::Binary(payload) => {
            assert_eq!(payload.kind, PayloadKind::Document);
            assert_eq!(payload.filename, "result.docx");
            assert_eq!(payload.bytes.len(), body.len());
        }
        other => panic!("unexpected response: {:?}", other),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let (base_url, server) = spawn_http_server(vec![
        http_response("500 Internal Server Error", &[("content-type", "text/plain")], b"oops"),
        http_response("200 OK", &[("content-type", "application/json")], br#"{"ok":true}"#),
    ])
    .await;

    let value = client(&base_url)
        .post_json("/api/process", &serde_json::json!({ "upload_id": "u-1" }))
        .await
        .unwrap();
    assert_eq!(value["ok"], true);

    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in requests {
        let request = String::from_utf8_lossy(&request).to_string();
        assert!(request.starts_with("POST /api/process"));
        assert!(request.ends_with(r#"{"upload_id":"u-1"}"#));
    }
}

#[tokio::test]
async fn test_last_http_error_is_returned() {
    let (base_url, server) = spawn_http_server(vec![
        http_response("502 Bad Gateway", &[], b""),
        http_response("503 Service Unavailable", &[], b""),
    ])
    .await;

    let err = client(&base_url).get_json("/api/history").await.unwrap_err();
    match err {
        Error::Http { status, status_text } => {
            assert_eq!(status, 503);
            assert_eq!(status_text, "Service Unavailable");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // 绑定后立即释放，端口上没有监听者
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client(&base_url).get_json("/api/templates").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_multipart_upload_reports_progress() {
    let (base_url, server) = spawn_http_server(vec![http_response(
        "200 OK",
        &[("content-type", "application/json")],
        br#"{"success":true,"data":{"upload_id":"u-42"}}"#,
    )])
    .await;

    let content = vec![b'x'; 200 * 1024];
    let file = UploadFile::new("contract.docx", content.clone()).with_content_type("application/msword");
    let request = UploadRequest {
        url: format!("{}/api/upload", base_url),
        file,
        field_name: "file".to_string(),
        fields: [("template".to_string(), "memo".to_string())].into_iter().collect(),
        headers: [("Content-Type".to_string(), "application/json".to_string())].into_iter().collect(),
    };

    let reported: Arc<Mutex<Vec<TransferProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    let progress: ProgressCallback = Arc::new(move |progress| sink.lock().unwrap().push(progress));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let transport = ReqwestTransport::with_client(client);
    let response = transport.upload(request, progress).await.unwrap();
    assert!(response.is_success());

    let reported = reported.lock().unwrap().clone();
    assert!(!reported.is_empty());
    assert!(reported.windows(2).all(|pair| pair[0].bytes_sent <= pair[1].bytes_sent));
    let last = reported.last().unwrap();
    assert_eq!(last.bytes_sent, content.len() as u64);
    assert_eq!(last.percentage(), 100);

    let requests = server.await.unwrap();
    let request = String::from_utf8_lossy(&requests[0]).to_string();
    assert!(request.starts_with("POST /api/upload"));
    assert!(request.to_ascii_lowercase().contains("content-type: multipart/form-data; boundary="));
    assert!(request.contains(r#"name="file"; filename="contract.docx""#));
    assert!(request.contains(r#"name="template""#));
    assert!(request.to_ascii_lowercase().contains("content-type: application/msword"));
}
