//! Shared fakes and a tiny HTTP responder for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use shelf_scout::domain::{
    CandidateProduct, EnrichmentFailure, FetchFailure, FetchedPage, PageFetcher, RankBonusConfig, TextGenerator,
};
use shelf_scout::infrastructure::config::{BatchConfig, FetchConfig};

pub const SHOP: &str = "https://shop.example";

/// Review text in the layout the review parser expects
pub const REVIEW: &str = "A sturdy pick for everyday use.\n\
###DETAILED_DESC###\nSolid build and simple controls.\n\
###TARGET_AUDIENCE###\nBusy households\n\
###USE_CASES###\nMorning routine\n\
###PROS###\n- Reliable\n- Easy to clean\n\
###CONS###\n- Bulky\n\
###SCORES###\n{\"Quality\": 90, \"Value for Money\": 80}\n\
###VERDICT###\nRecommended.";

pub fn detail_page(title: &str) -> String {
    format!(
        r#"<html><body>
            <span id="productTitle">{title}</span>
            <a id="bylineInfo">Visit the Acme Store</a>
            <span class="a-price"><span class="a-offscreen">AED 120.00</span></span>
            <div id="feature-bullets"><ul><li><span>Stainless steel</span></li></ul></div>
        </body></html>"#
    )
}

pub fn candidate(id: &str, weight: f64, rank: u32) -> CandidateProduct {
    CandidateProduct::observed(
        id,
        format!("{SHOP}/dp/{id}"),
        "bestsellers",
        weight,
        Some(rank),
        &RankBonusConfig::default(),
    )
}

/// Ranked list of `n` candidates with descending weight
pub fn ranked(n: usize) -> Vec<CandidateProduct> {
    (0..n).map(|i| candidate(&format!("B0000000{i:02}"), 100.0 - i as f64, 1)).collect()
}

pub fn fast_batch_config() -> BatchConfig {
    BatchConfig {
        batch_size: 2,
        min_delay_ms: 0,
        max_delay_ms: 0,
        ..BatchConfig::default()
    }
}

/// Fetch settings with every wait set to zero
pub fn fast_fetch_config() -> FetchConfig {
    FetchConfig {
        timeout_seconds: 5,
        max_attempts: 3,
        max_requests_per_second: 1000,
        min_delay_ms: 0,
        max_delay_ms: 0,
        retry_min_delay_ms: 0,
        retry_max_delay_ms: 0,
        backoff_base_ms: 0,
        backoff_max_ms: 0,
        rate_limited_min_ms: 0,
        rate_limited_max_ms: 0,
        ..FetchConfig::default()
    }
}

/// In-memory site: every product page renders, ids in `broken` answer 500
#[derive(Default)]
pub struct FakeShop {
    pub broken: HashSet<String>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeShop {
    pub fn with_broken(ids: &[&str]) -> Self {
        Self {
            broken: ids.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeShop {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchFailure> {
        self.fetched.lock().unwrap().push(url.to_string());
        let id = url.rsplit('/').next().unwrap_or_default();
        if self.broken.contains(id) {
            return Err(FetchFailure::Status {
                url: url.to_string(),
                status: 500,
                attempts: 3,
            });
        }
        Ok(FetchedPage::new(url, detail_page(&format!("Product {id}"))))
    }

    async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, FetchFailure> {
        Ok(vec![0x89, 0x50, 0x4E, 0x47])
    }
}

/// Generator that always answers with [`REVIEW`] and counts calls
#[derive(Default)]
pub struct CannedGenerator {
    pub calls: AtomicUsize,
}

impl CannedGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String, EnrichmentFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(REVIEW.to_string())
    }
}

/// One scripted HTTP answer
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
    /// Wait this long after reading the request before answering
    pub stall: Duration,
    /// Bytes promised in Content-Length beyond the real body
    pub missing_bytes: usize,
}

impl Reply {
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: "text/html; charset=utf-8",
            stall: Duration::ZERO,
            missing_bytes: 0,
        }
    }

    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            content_type: "application/json",
            ..Self::html(status, body)
        }
    }

    /// Accepts the request and stays silent for `stall`
    pub fn stalled(stall: Duration) -> Self {
        Self {
            stall,
            ..Self::html(200, "too late")
        }
    }

    /// Promises more body than it sends, then closes the connection
    pub fn truncated(status: u16, body: impl Into<String>) -> Self {
        Self {
            missing_bytes: 64,
            ..Self::html(status, body)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

type Routes = Arc<Mutex<HashMap<String, VecDeque<Reply>>>>;

/// Local HTTP/1.1 responder. Each path answers its replies in order and
/// repeats the last one; unknown paths answer 404.
pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Vec<Reply>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Routes = Arc::new(Mutex::new(
            routes
                .into_iter()
                .map(|(path, replies)| (path.to_string(), replies.into_iter().collect()))
                .collect(),
        ));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, routes, recorded).await;
                });
            }
        });

        Self { base_url, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.path == path).count()
    }
}

async fn serve(mut stream: TcpStream, routes: Routes, recorded: Arc<Mutex<Vec<RecordedRequest>>>) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers.get("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let reply = {
        let mut routes = routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    }
    .unwrap_or_else(|| Reply::html(404, "not found"));

    recorded.lock().unwrap().push(RecordedRequest {
        method,
        path,
        headers,
        body,
    });

    if !reply.stall.is_zero() {
        tokio::time::sleep(reply.stall).await;
    }

    let response = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.content_type,
        reply.body.len() + reply.missing_bytes,
        reply.body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
