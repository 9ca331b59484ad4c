//! Test doubles: a canned search backend, a scripted fetcher and a tiny
//! loopback HTTP server.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::config::FetchLimits;
use crate::errors::SearchError;
use crate::fetch::{outcome_from_content, Fetcher};
use crate::models::{FetchOutcome, RawHit};
use crate::search::{RawHits, SearchBackend};

/// Body text long enough to pass the default minimum length.
pub const FILLER: &str = "Rust is a general purpose programming language emphasizing \
    performance, type safety and concurrency. It enforces memory safety without a \
    garbage collector by tracking ownership and lifetimes at compile time. ";

/// A backend returning a fixed URL list.
#[derive(Debug, Clone, Default)]
pub struct StaticSearchBackend {
    urls: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl StaticSearchBackend {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            calls: Arc::default(),
        }
    }

    /// `https://site{i}.example.com/article` for `i` in `0..n`.
    pub fn numbered(n: usize) -> Self {
        Self::new((0..n).map(|i| format!("https://site{i}.example.com/article")))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchBackend for StaticSearchBackend {
    fn text(&self, _query: &str, max_results: usize) -> Result<RawHits, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hits: Vec<Result<RawHit, SearchError>> = self
            .urls
            .iter()
            .take(max_results)
            .enumerate()
            .map(|(i, url)| Ok(RawHit::new(url.clone(), format!("Result {i}"))))
            .collect();
        Ok(Box::new(hits.into_iter()))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// A fetcher with scripted per-URL behaviour that records its calls.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    delay: Duration,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes `url` fail with `HTTP 500`.
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Makes fetching `url` panic.
    pub fn panicking(mut self, url: &str) -> Self {
        self.panicking.insert(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// The content a successful fetch of `url` produces.
    pub fn page_for(url: &str) -> String {
        format!("# Page {url}\n\n{FILLER}{FILLER}{FILLER}{FILLER}")
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, limits: &FetchLimits, _user_agent: &str) -> FetchOutcome {
        self.calls.lock().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        assert!(!self.panicking.contains(url), "scripted panic for {url}");
        if self.failing.contains(url) {
            return FetchOutcome::failure(url, "HTTP 500");
        }
        outcome_from_content(url, Self::page_for(url), limits)
    }
}

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub struct Route {
    status: u16,
    body: String,
    delay: Duration,
    declared_length: Option<u64>,
    omit_length: bool,
}

impl Route {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            delay: Duration::ZERO,
            declared_length: None,
            omit_length: false,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            ..Self::html(body)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Overrides the `Content-Length` header.
    pub fn with_declared_length(mut self, length: u64) -> Self {
        self.declared_length = Some(length);
        self
    }

    /// Sends no `Content-Length`; the body ends when the connection closes.
    pub fn without_length(mut self) -> Self {
        self.omit_length = true;
        self
    }
}

/// A loopback HTTP/1.1 server answering each connection with one route.
pub struct TestServer {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&routes), Arc::clone(&log)));
            }
        });

        Self {
            addr,
            handle,
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Request heads received so far, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: Arc<HashMap<String, Route>>,
    requests: Arc<Mutex<Vec<String>>>,
) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&request).into_owned();
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    requests.lock().push(head);
    let route = routes
        .get(&path)
        .cloned()
        .unwrap_or_else(|| Route::status(404, "not found"));

    if !route.delay.is_zero() {
        tokio::time::sleep(route.delay).await;
    }

    let length = if route.omit_length {
        String::new()
    } else {
        let declared = route.declared_length.unwrap_or(route.body.len() as u64);
        format!("Content-Length: {declared}\r\n")
    };
    let response = format!(
        "HTTP/1.1 {} Test\r\nContent-Type: text/html; charset=utf-8\r\n{length}Connection: close\r\n\r\n{}",
        route.status, route.body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// A client that never goes through an environment proxy.
pub fn no_proxy_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
