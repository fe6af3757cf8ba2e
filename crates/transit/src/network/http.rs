//! reqwest-backed [`DataFetcher`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::models::types::{Result, TransitError};
use crate::network::traits::DataFetcher;

#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("railwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl DataFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransitError::Network(format!("GET {url}: HTTP {status}")));
            }

            let bytes = response.bytes().await?;
            debug!(url, bytes = bytes.len(), "fetched");
            Ok(bytes.to_vec())
        })
    }
}
