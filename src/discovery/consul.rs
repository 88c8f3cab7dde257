//! Consul agent HTTP client.
//!
//! Covers the three agent endpoints the service needs:
//! - `PUT /v1/agent/service/register`
//! - `PUT /v1/agent/service/deregister/{id}`
//! - `GET /v1/kv/{key}?raw`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::discovery::{Discovery, DiscoveryError, ServiceRegistration};

const TOKEN_HEADER: &str = "X-Consul-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a single Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    base: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl ConsulClient {
    /// Create a client for `address` (`host:port` or a full `http(s)://` URL).
    pub fn new(address: &str) -> Result<Self, DiscoveryError> {
        let base = parse_address(address)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base,
            token: None,
            http,
        })
    }

    /// Attach an ACL token to every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, DiscoveryError> {
        self.base
            .join(path)
            .map_err(|_| DiscoveryError::InvalidAddress(format!("{}{}", self.base, path)))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        }
    }
}

fn parse_address(address: &str) -> Result<Url, DiscoveryError> {
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|_| DiscoveryError::InvalidAddress(address.to_string()))?;
    if url.host_str().is_none() {
        return Err(DiscoveryError::InvalidAddress(address.to_string()));
    }
    Ok(url)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DiscoveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DiscoveryError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Discovery for ConsulClient {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), DiscoveryError> {
        let url = self.endpoint("/v1/agent/service/register")?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(registration)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), DiscoveryError> {
        let mut url = self.endpoint("/v1/agent/service/deregister/")?;
        url.path_segments_mut()
            .map_err(|_| DiscoveryError::InvalidAddress(self.base.to_string()))?
            .pop_if_empty()
            .push(instance_id);

        let response = self.request(reqwest::Method::PUT, url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, DiscoveryError> {
        let mut url = self.endpoint("/v1/kv/")?;
        url.set_path(&format!("/v1/kv/{}", key.trim_start_matches('/')));
        url.set_query(Some("raw"));

        let response = self.request(reqwest::Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        Ok(Some(response.bytes().await?.to_vec()))
    }
}
