//! Remote durable store sink.
//!
//! Speaks the Ledger Image transport: `GET {base}/api/pds/load` returns the
//! raw binary export (404 while no snapshot exists), `POST
//! {base}/api/pds/persist` overwrites it wholesale. No content hashing, no
//! conflict detection; last POST wins. Requests carry an explicit timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{PdsError, Result};
use crate::store::SnapshotSink;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-backed snapshot store, shared across client instances.
pub struct RemoteStore {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { base_url, client })
    }

    fn load_url(&self) -> String {
        format!("{}/api/pds/load", self.base_url)
    }

    fn persist_url(&self) -> String {
        format!("{}/api/pds/persist", self.base_url)
    }
}

#[async_trait]
impl SnapshotSink for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn store(&self, image: &[u8]) -> Result<()> {
        let response = self
            .client
            .post(self.persist_url())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PdsError::Transport(format!(
                "remote persist returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        let response = self.client.get(self.load_url()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            status => Err(PdsError::Transport(format!(
                "remote load returned {}",
                status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let store = RemoteStore::new("http://pds.local:8080///", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(store.load_url(), "http://pds.local:8080/api/pds/load");
        assert_eq!(
            store.persist_url(),
            "http://pds.local:8080/api/pds/persist"
        );
    }
}
