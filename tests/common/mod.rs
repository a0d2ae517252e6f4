#![allow(dead_code)]

use async_trait::async_trait;
use ispw::errors::ToolError;
use ispw::services::dispatcher::Dispatcher;
use ispw::services::executor::{
    RequestExecutor, Transport, UpstreamBody, UpstreamRequest, UpstreamResult,
};
use ispw::services::logger::Logger;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Barrier, Mutex};

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct MockTransport {
    status: u16,
    body: UpstreamBody,
    calls: AtomicUsize,
    requests: StdMutex<Vec<UpstreamRequest>>,
    barrier: Option<Arc<Barrier>>,
}

impl MockTransport {
    pub fn json(status: u16, body: Value) -> Arc<Self> {
        Arc::new(Self::new(status, UpstreamBody::Json(body), None))
    }

    pub fn empty(status: u16) -> Arc<Self> {
        Arc::new(Self::new(status, UpstreamBody::Empty, None))
    }

    /// Every call waits until `parties` calls are in flight at once.
    pub fn gated(parties: usize, body: Value) -> Arc<Self> {
        Arc::new(Self::new(
            200,
            UpstreamBody::Json(body),
            Some(Arc::new(Barrier::new(parties))),
        ))
    }

    fn new(status: u16, body: UpstreamBody, barrier: Option<Arc<Barrier>>) -> Self {
        Self {
            status,
            body,
            calls: AtomicUsize::new(0),
            requests: StdMutex::new(Vec::new()),
            barrier,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<UpstreamRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(barrier) = self.barrier.as_ref() {
            barrier.wait().await;
        }
        Ok(UpstreamResult {
            status: self.status,
            headers: BTreeMap::new(),
            body: self.body.clone(),
        })
    }
}

pub fn dispatcher_with(transport: Arc<MockTransport>) -> Dispatcher {
    let logger = Logger::new("test");
    let executor = RequestExecutor::new(transport, Duration::from_secs(5), logger.clone());
    Dispatcher::new(executor, "ISPW", logger)
}

/// Accepts connections and never answers. Returns the base URL and an accept counter.
pub async fn silent_upstream() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });
    (format!("http://{}/", addr), accepted)
}

/// A base URL on a port nothing listens on.
pub fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{}/", addr)
}

/// Answers a single request with `status` and `body`, handing back the raw request head.
pub async fn one_shot_upstream(status: u16, body: Value) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let Ok(n) = socket.read(&mut buf).await else {
                return;
            };
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&raw[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        let payload = body.to_string();
        let response = format!(
            "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
    });
    (format!("http://{}/", addr), rx)
}
