//! Shared fixtures: configuration, history store, stand-in crawlers and a
//! misbehaving file server

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::{load_config, Config};
use sumi_harvest::crawler::{
    CrawlError, Crawler, CrawlerContext, CrawlerRegistry, MediaItem, ScrapeItem, ScrapeItemKind,
    ScrapeOutput,
};
use sumi_harvest::download::FreeSpaceSource;
use sumi_harvest::storage::{open_storage, SharedStorage};
use sumi_harvest::Coordinator;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

/// A download folder, log folder and history database in one temp dir
pub struct Workspace {
    pub dir: TempDir,
    pub storage: SharedStorage,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = open_storage(&dir.path().join("history.db")).expect("Failed to open history");
        Self { dir, storage }
    }

    pub fn downloads(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    /// Loads a config with this workspace's paths plus `extra` TOML
    ///
    /// `extra` may add keys to `[general]` since it is appended right
    /// after that table's keys.
    pub fn config(&self, extra: &str) -> Config {
        let root = self.dir.path();
        let content = format!(
            r#"
[general]
download-folder = '{}'
database-path = '{}'
log-folder = '{}'
required-free-space-mb = 0
{}
"#,
            root.join("downloads").display(),
            root.join("history.db").display(),
            root.join("logs").display(),
            extra
        );

        let path = root.join("harvest.toml");
        let mut file = std::fs::File::create(&path).expect("Failed to write config");
        file.write_all(content.as_bytes()).expect("Failed to write config");
        load_config(&path).expect("Test config should be valid")
    }

    /// A coordinator with no retry pause
    pub fn coordinator(&self, config: Config, registry: CrawlerRegistry) -> Coordinator {
        Coordinator::new(config, registry, Arc::clone(&self.storage))
            .expect("Failed to create coordinator")
            .with_retry_backoff(Duration::ZERO)
    }
}

/// Host of a mock server, for registering crawlers against it
pub fn server_host(uri: &str) -> String {
    Url::parse(uri)
        .expect("Failed to parse server URI")
        .host_str()
        .expect("Server URI has a host")
        .to_string()
}

/// Crawler that serves a fixed list of file URLs per page path
///
/// Never touches the network itself, so only file requests reach the mock
/// server. Links to further pages become children of the crawler's kind.
pub struct ListingCrawler {
    domain: String,
    kind: ScrapeItemKind,
    folder: PathBuf,
    pages: HashMap<String, Vec<Url>>,
    links: HashMap<String, Vec<Url>>,
}

impl ListingCrawler {
    pub fn new(domain: &str, folder: &Path) -> Self {
        Self {
            domain: domain.to_string(),
            kind: ScrapeItemKind::Generic,
            folder: folder.to_path_buf(),
            pages: HashMap::new(),
            links: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: ScrapeItemKind) -> Self {
        self.kind = kind;
        self
    }

    /// Page at `path` lists `files`
    pub fn page(mut self, path: &str, files: Vec<Url>) -> Self {
        self.pages.insert(path.to_string(), files);
        self
    }

    /// Page at `path` links to the pages `children`
    pub fn links(mut self, path: &str, children: Vec<Url>) -> Self {
        self.pages.entry(path.to_string()).or_default();
        self.links.insert(path.to_string(), children);
        self
    }

    /// A registry holding only this crawler for its domain
    pub fn into_registry(self) -> CrawlerRegistry {
        let mut registry = CrawlerRegistry::new();
        let domain = self.domain.clone();
        registry.register(domain, Arc::new(self));
        registry
    }
}

#[async_trait]
impl Crawler for ListingCrawler {
    fn name(&self) -> &str {
        "Listing"
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn kind_of(&self, _url: &Url) -> ScrapeItemKind {
        self.kind
    }

    async fn scrape(&self, item: &ScrapeItem, _ctx: &CrawlerContext) -> Result<ScrapeOutput, CrawlError> {
        let Some(files) = self.pages.get(item.url.path()) else {
            return Err(CrawlError::Http {
                status: 404,
                url: item.url.to_string(),
            });
        };

        let mut output = ScrapeOutput::default();
        for url in files {
            let filename = url
                .path_segments()
                .and_then(|mut s| s.next_back())
                .unwrap_or("file")
                .to_string();
            output
                .media
                .push(MediaItem::new(url.clone(), item, self.folder.clone(), filename));
        }
        for link in self.links.get(item.url.path()).into_iter().flatten() {
            output.children.push(item.child(link.clone(), self.kind));
        }
        Ok(output)
    }
}

/// Free space source reporting a fixed number of bytes
pub struct FixedFreeSpace(pub u64);

impl FreeSpaceSource for FixedFreeSpace {
    fn available_space(&self, _folder: &Path) -> Option<u64> {
        Some(self.0)
    }
}

pub fn url(base: &str, path: &str) -> Url {
    Url::parse(&format!("{}{}", base, path)).expect("Failed to build URL")
}

/// How [`RawFileServer`] ends a response after the bytes it sends
#[derive(Debug, Clone, Copy)]
pub enum BodyEnd {
    /// Closes the connection, short of the announced length
    HangUp,
    /// Keeps the connection open without sending anything more
    Stall,
    /// Sends the rest one byte at a time, `interval` apart
    Trickle { interval: Duration },
}

/// Plain TCP file server that ignores `Range` and answers every request
/// with `200`, announcing `announced` bytes but sending only `sent`
///
/// wiremock always sends whole bodies, so truncated and slow transfers are
/// served from here.
pub struct RawFileServer {
    uri: String,
    requests: Arc<AtomicUsize>,
}

impl RawFileServer {
    pub async fn start(announced: usize, sent: usize, end: BodyEnd) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind file server");
        let addr = listener.local_addr().expect("Bound listener has an address");
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let counter = Arc::clone(&counter);
                tokio::spawn(serve(socket, counter, announced, sent, end));
            }
        });

        Self {
            uri: format!("http://{}", addr),
            requests,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Requests answered so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn serve(mut socket: TcpStream, counter: Arc<AtomicUsize>, announced: usize, sent: usize, end: BodyEnd) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    counter.fetch_add(1, Ordering::SeqCst);

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        announced
    );
    if socket.write_all(header.as_bytes()).await.is_err() {
        return;
    }
    if socket.write_all(&vec![7u8; sent]).await.is_err() {
        return;
    }
    let _ = socket.flush().await;

    match end {
        BodyEnd::HangUp => {}
        BodyEnd::Stall => tokio::time::sleep(Duration::from_secs(60)).await,
        BodyEnd::Trickle { interval } => {
            for _ in sent..announced {
                tokio::time::sleep(interval).await;
                if socket.write_all(&[7u8]).await.is_err() {
                    return;
                }
            }
        }
    }
}
