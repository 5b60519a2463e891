use std::time::Duration;
use reqwest::{Client, ClientBuilder, Proxy};
use crate::errors::Result;

const USER_AGENT: &str = concat!("mediagrab/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for the extraction server and direct transfers.
///
/// No overall request timeout is set here: server calls are timed per attempt
/// and direct transfers may legitimately run for a long time.
pub struct HttpPool {
    client: Client,
    max_connections: usize,
}

impl HttpPool {
    pub fn new(max_connections: usize) -> Result<Self> {
        let client = Self::builder(max_connections).build()?;
        Ok(Self {
            client,
            max_connections,
        })
    }

    pub fn with_proxy(mut self, proxy_url: &str) -> Result<Self> {
        let proxy = Proxy::all(proxy_url)?;
        self.client = Self::builder(self.max_connections).proxy(proxy).build()?;
        Ok(self)
    }

    /// Builds a pool from an optional proxy setting.
    pub fn from_settings(max_connections: usize, proxy: Option<&str>) -> Result<Self> {
        let pool = Self::new(max_connections)?;
        match proxy {
            Some(proxy_url) if !proxy_url.trim().is_empty() => {
                log::info!("[HTTP] Using proxy: {}", proxy_url);
                pool.with_proxy(proxy_url)
            }
            _ => Ok(pool),
        }
    }

    fn builder(max_connections: usize) -> ClientBuilder {
        ClientBuilder::new()
            .pool_max_idle_per_host(max_connections)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .connect_timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }
}
