//! A simple downloader library for fetching catalogs and firmware binaries.
//!
//! # Features
//!
//! - Async
//! - Optional download progress through a [`futures::channel::mpsc`] channel.
//! - Non-success HTTP status codes are reported as errors instead of being parsed.
//! - [`MemoryFetcher`] serves canned responses for offline use and tests.
//!
//! Nothing is cached on disk. Every call goes to the network.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{Stream, StreamExt, channel::mpsc};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Upper bound for pre-allocating a response body from its advertised length.
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
/// Errors for this crate
pub enum Error {
    #[error("Reqwest Error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    /// Server responded, but not with a 2xx status
    #[error("HTTP {status} while fetching {url}")]
    HttpStatus { url: Url, status: u16 },
    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Source of remote documents and binaries.
pub trait Fetch {
    /// Fetch and decode a JSON document.
    fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> impl Future<Output = Result<T>>;

    /// Fetch a binary into memory.
    ///
    /// # Progress
    ///
    /// Download progress between 0 and 1 can be optionally tracked using a
    /// [`futures::channel::mpsc`].
    fn fetch_bytes(
        &self,
        url: &Url,
        chan: Option<mpsc::Sender<f32>>,
    ) -> impl Future<Output = Result<Vec<u8>>>;
}

/// Downloader backed by [`reqwest`].
///
/// You do not have to wrap the Client in an Rc or Arc to reuse it, because it already uses an Arc
/// internally.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response> {
        tracing::debug!("GET {url}");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            tracing::warn!("{url} responded with {status}");
            return Err(Error::HttpStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

impl Fetch for Downloader {
    async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let data = self.get(url).await?.bytes().await?;
        serde_json::from_slice(&data).map_err(Error::from)
    }

    async fn fetch_bytes(&self, url: &Url, mut chan: Option<mpsc::Sender<f32>>) -> Result<Vec<u8>> {
        chan_send(chan.as_mut(), 0.0);

        let response = self.get(url).await?;
        let response_size = response.content_length();
        let mut response_stream = response.bytes_stream();

        let response_size = match response_size {
            Some(x) => x as usize,
            None => response_stream.size_hint().0,
        };

        let mut data = Vec::with_capacity(initial_capacity(response_size));
        while let Some(x) = response_stream.next().await {
            let chunk = x?;
            data.extend_from_slice(&chunk);

            if response_size != 0 {
                chan_send(chan.as_mut(), (data.len() as f32) / (response_size as f32));
            }
        }

        chan_send(chan.as_mut(), 1.0);
        Ok(data)
    }
}

#[derive(Debug, Clone)]
enum MemoryResponse {
    Body(Vec<u8>),
    Status(u16),
}

/// Serves pre-registered responses from memory. Unknown URLs respond with HTTP 404.
///
/// Clones share the same responses and request counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    responses: Arc<HashMap<Url, MemoryResponse>>,
    requests: Arc<AtomicUsize>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn with_body(mut self, url: Url, body: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.responses).insert(url, MemoryResponse::Body(body.into()));
        self
    }

    /// Respond to `url` with a non-success status code.
    pub fn with_status(mut self, url: Url, status: u16) -> Self {
        Arc::make_mut(&mut self.responses).insert(url, MemoryResponse::Status(status));
        self
    }

    /// Number of requests served so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn get(&self, url: &Url) -> Result<&[u8]> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        match self.responses.get(url) {
            Some(MemoryResponse::Body(x)) => Ok(x),
            Some(MemoryResponse::Status(status)) => Err(Error::HttpStatus {
                url: url.clone(),
                status: *status,
            }),
            None => Err(Error::HttpStatus {
                url: url.clone(),
                status: 404,
            }),
        }
    }
}

impl Fetch for MemoryFetcher {
    async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        serde_json::from_slice(self.get(url)?).map_err(Error::from)
    }

    async fn fetch_bytes(&self, url: &Url, mut chan: Option<mpsc::Sender<f32>>) -> Result<Vec<u8>> {
        let data = self.get(url)?.to_vec();
        chan_send(chan.as_mut(), 1.0);
        Ok(data)
    }
}

/// The advertised length is not trusted beyond [`MAX_PREALLOC`]. The buffer grows as needed.
const fn initial_capacity(advertised: usize) -> usize {
    if advertised < MAX_PREALLOC {
        advertised
    } else {
        MAX_PREALLOC
    }
}

fn chan_send(chan: Option<&mut mpsc::Sender<f32>>, msg: f32) {
    if let Some(c) = chan {
        let _ = c.try_send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Doc {
        name: String,
    }

    fn url(path: &str) -> Url {
        Url::parse("https://example.com/").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn memory_fetcher_serves_bodies() {
        let fetcher = MemoryFetcher::new()
            .with_body(url("doc.json"), r#"{ "name": "fpvgate" }"#)
            .with_body(url("fw.bin"), vec![1, 2, 3]);

        let doc: Doc = fetcher.fetch_json(&url("doc.json")).await.unwrap();
        assert_eq!(doc.name, "fpvgate");

        let (tx, mut rx) = mpsc::channel(4);
        let data = fetcher.fetch_bytes(&url("fw.bin"), Some(tx)).await.unwrap();
        assert_eq!(data, [1, 2, 3]);
        assert_eq!(rx.next().await, Some(1.0));

        assert_eq!(fetcher.clone().requests(), 2);
    }

    #[test]
    fn advertised_length_is_capped() {
        assert_eq!(initial_capacity(1024), 1024);
        assert_eq!(initial_capacity(usize::MAX), MAX_PREALLOC);
    }

    #[tokio::test]
    async fn memory_fetcher_errors() {
        let fetcher = MemoryFetcher::new()
            .with_status(url("releases"), 500)
            .with_body(url("bad.json"), "{");

        let res = fetcher.fetch_json::<Doc>(&url("releases")).await;
        assert!(matches!(res, Err(Error::HttpStatus { status: 500, .. })));

        let res = fetcher.fetch_bytes(&url("missing.bin"), None).await;
        assert!(matches!(res, Err(Error::HttpStatus { status: 404, .. })));

        let res = fetcher.fetch_json::<Doc>(&url("bad.json")).await;
        assert!(matches!(res, Err(Error::JsonError(_))));
    }
}
