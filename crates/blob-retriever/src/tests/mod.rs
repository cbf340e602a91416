mod args_test;

use blob_sync::mock::sample_signed_header;
use blob_sync::{BlockHeaderInfo, Root, Slot, WireBlobSidecar};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Minimal HTTP server answering GET requests from a fixed route table.
/// Unknown paths get a beacon-style 404.
#[derive(Clone, Default)]
pub struct StubBeacon {
    routes: Arc<Mutex<HashMap<String, (u16, String)>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl StubBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, path: &str, status: u16, body: String) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body));
    }

    /// Serve a block with `sidecars` at `slot` under both header and sidecar routes.
    pub fn block(&self, slot: Slot, root: Root, sidecars: &[WireBlobSidecar]) {
        let header = BlockHeaderInfo {
            root,
            canonical: true,
            header: sample_signed_header(slot),
        };
        self.route(
            &format!("/eth/v1/beacon/headers/{}", slot),
            200,
            json!({ "execution_optimistic": false, "finalized": true, "data": header }).to_string(),
        );
        self.route(
            &format!("/eth/v1/beacon/blob_sidecars/{}", root),
            200,
            json!({ "data": sidecars }).to_string(),
        );
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Bind to an ephemeral port and serve until the test ends.
    pub async fn serve(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stub = self.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let stub = stub.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&request);
                    let path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    *stub.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                    let (status, body) = stub
                        .routes
                        .lock()
                        .unwrap()
                        .get(&path)
                        .cloned()
                        .unwrap_or((404, r#"{"code":404,"message":"NOT_FOUND"}"#.to_string()));
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason(status),
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
