use anyhow::Context;

use courier_protocol::peer::{HermesAddress, HERMES_ADDRESS_PATH, UPDATE_ALL_PATH};

/// HTTP client for the remote Courier peer protocol. The connect address
/// is wherever the physical connection terminates (usually a tunnel's
/// loopback bind); `host_header`, when given, carries the peer's real
/// hostname so virtual-hosted setups still route to the right backend.
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build peer http client")?;
        Ok(Self { http })
    }

    /// Asks a peer where it keeps its data: `GET /hermes_address`.
    pub async fn hermes_address(
        &self,
        connect_addr: &str,
        host_header: Option<&str>,
    ) -> anyhow::Result<HermesAddress> {
        let url = format!("http://{connect_addr}{HERMES_ADDRESS_PATH}");
        let mut request = self.http.get(&url);
        if let Some(host) = host_header {
            request = request.header(reqwest::header::HOST, host);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("could not get ssh address from {url}: HTTP {status}\n{body}");
        }
        response
            .json()
            .await
            .with_context(|| format!("invalid hermes address from {url}"))
    }

    /// Triggers a full reconciliation on a peer: `POST /update_all`.
    pub async fn update_all(
        &self,
        connect_addr: &str,
        host_header: Option<&str>,
    ) -> anyhow::Result<()> {
        let url = format!("http://{connect_addr}{UPDATE_ALL_PATH}");
        let mut request = self.http.post(&url);
        if let Some(host) = host_header {
            request = request.header(reqwest::header::HOST, host);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("update_all on {url} failed: HTTP {status}\n{body}");
        }
        Ok(())
    }
}
