//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use url::Url;

use render_proxy::config::{ProxyConfig, StrategyConfig, WaitConditionKind};
use render_proxy::render::{
    LaunchOptions, NavigationError, NetworkErrorKind, RenderBrowser, RenderEngine, RenderError, RenderPage,
    RequestInterceptor, WaitCondition,
};
use render_proxy::{HttpServer, Shutdown};

/// One request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockResponse {
    pub fn new(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }
}

pub struct Upstream {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Upstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a programmable upstream that answers each request with `f(request)`.
pub async fn start_upstream<F>(f: F) -> Upstream
where
    F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let recorded = requests.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let _ = serve_one(socket, f.as_ref(), &recorded).await;
            });
        }
    });

    Upstream { addr, requests }
}

async fn serve_one<F>(
    mut socket: TcpStream,
    f: &F,
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> std::io::Result<()>
where
    F: Fn(&RecordedRequest) -> MockResponse,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let request = RecordedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    };
    let response = f(&request);
    recorded.lock().unwrap().push(request);

    let reason = match response.status {
        200 => "OK",
        204 => "No Content",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    let raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        reason,
        response.content_type,
        response.body.len(),
        response.body
    );
    socket.write_all(raw.as_bytes()).await?;
    socket.shutdown().await
}

/// Engine double: every page serves the same markup; hosts under
/// `.invalid` fail to resolve.
pub struct FakeEngine {
    pub html: String,
    pub launch_delay: Duration,
    pub fail_launch: bool,
    pub launches: AtomicU64,
    pub open_pages: Arc<AtomicI64>,
    pub pages_created: Arc<AtomicU64>,
}

impl FakeEngine {
    pub fn serving(html: &str) -> Arc<Self> {
        Arc::new(Self {
            html: html.to_string(),
            launch_delay: Duration::from_millis(50),
            fail_launch: false,
            launches: AtomicU64::new(0),
            open_pages: Arc::new(AtomicI64::new(0)),
            pages_created: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            html: String::new(),
            launch_delay: Duration::from_millis(10),
            fail_launch: true,
            launches: AtomicU64::new(0),
            open_pages: Arc::new(AtomicI64::new(0)),
            pages_created: Arc::new(AtomicU64::new(0)),
        })
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn RenderBrowser>, RenderError> {
        tokio::time::sleep(self.launch_delay).await;
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(RenderError::Launch("browser binary crashed on startup".into()));
        }
        Ok(Arc::new(FakeBrowser {
            html: self.html.clone(),
            connected: AtomicBool::new(true),
            open_pages: self.open_pages.clone(),
            pages_created: self.pages_created.clone(),
        }))
    }
}

struct FakeBrowser {
    html: String,
    connected: AtomicBool,
    open_pages: Arc<AtomicI64>,
    pages_created: Arc<AtomicU64>,
}

#[async_trait]
impl RenderBrowser for FakeBrowser {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_page(&self, _interceptor: Arc<dyn RequestInterceptor>) -> Result<Box<dyn RenderPage>, RenderError> {
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        self.pages_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            html: self.html.clone(),
            open_pages: self.open_pages.clone(),
        }))
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

struct FakePage {
    html: String,
    open_pages: Arc<AtomicI64>,
}

#[async_trait]
impl RenderPage for FakePage {
    async fn navigate(&self, url: &Url, _condition: WaitCondition) -> Result<(), NavigationError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if url.host_str().is_some_and(|h| h.ends_with(".invalid")) {
            return Err(NavigationError::Network {
                kind: NetworkErrorKind::Unresolved,
                detail: format!("net::ERR_NAME_NOT_RESOLVED at {}", url),
            });
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<(), RenderError> {
        Ok(())
    }

    async fn content(&self) -> Result<String, RenderError> {
        Ok(self.html.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, RenderError> {
        Ok(vec![0x89, b'P', b'N', b'G', b'\r', b'\n'])
    }

    async fn pdf(&self) -> Result<Vec<u8>, RenderError> {
        Ok(b"%PDF-1.7\n".to_vec())
    }

    async fn close(self: Box<Self>) {
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Configuration with fast navigation and an executable that exists.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.render.executable = Some(existing_executable());
    config.navigation.strategies = vec![
        StrategyConfig { condition: WaitConditionKind::NetworkIdle0, timeout_secs: 2 },
        StrategyConfig { condition: WaitConditionKind::Load, timeout_secs: 2 },
    ];
    config.navigation.settle_ms = 0;
    config.navigation.scroll = false;
    config.navigation.post_scroll_settle_ms = 0;
    config
}

fn existing_executable() -> PathBuf {
    std::env::current_exe().unwrap()
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
    pub handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl RunningProxy {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    pub fn proxy_url(&self, target: &str) -> String {
        self.url(&format!("/proxy?url={}", urlencoding::encode(target)))
    }
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig, engine: Arc<dyn RenderEngine>) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, engine).unwrap();
    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(server.run(listener, updates_rx, shutdown.subscribe()));

    RunningProxy {
        addr,
        shutdown,
        config_updates,
        handle,
    }
}
