use anyhow::Context;
use async_trait::async_trait;
use tokio::time::Duration;

use courier_protocol::peer::DiscoveryReply;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(7);

/// Resolves a logical service name to the addresses of its healthy
/// instances. The agent is expected to have filtered out anything with a
/// critical health check.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn healthy_instances(&self, service: &str) -> anyhow::Result<Vec<String>>;
}

/// Discovery backed by the local armada agent's HTTP listing endpoint.
pub struct HttpDiscovery {
    agent_addr: String,
    http: reqwest::Client,
}

impl HttpDiscovery {
    pub fn new(agent_addr: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()
            .context("failed to build discovery http client")?;
        Ok(Self {
            agent_addr: agent_addr.into(),
            http,
        })
    }
}

#[async_trait]
impl Discovery for HttpDiscovery {
    async fn healthy_instances(&self, service: &str) -> anyhow::Result<Vec<String>> {
        let url = format!(
            "http://{}/list?microservice_name={service}",
            self.agent_addr
        );
        let reply: DiscoveryReply = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("discovery query failed: {url}"))?
            .error_for_status()
            .with_context(|| format!("discovery query rejected: {url}"))?
            .json()
            .await
            .context("discovery reply was not valid json")?;
        Ok(reply
            .result
            .into_iter()
            .map(|instance| instance.address)
            .collect())
    }
}
