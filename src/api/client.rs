use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{JobHandle, Page, SendPayload};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Test seam: a scripted backend standing in for the remote node.
#[cfg(test)]
pub trait MockNodeBackend: Send + Sync {
    fn send_turn(&self, conversation_id: &str, payload: &SendPayload) -> Result<JobHandle>;
    fn open_event_stream(&self, job: &JobHandle) -> Result<ByteStream>;
    fn fetch_page(&self, conversation_id: &str, cursor: Option<&str>) -> Result<Page>;
    fn request_stop(&self, job: &JobHandle) -> Result<()>;
}

/// HTTP client for the Shinkai node's conversation surface. Owns transport
/// concerns only; conversation state lives in the session layer.
#[derive(Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    node_url: String,
    api_key: Option<String>,
    page_size: usize,
    streaming_supported: bool,
    #[cfg(test)]
    mock_backend: Option<Arc<dyn MockNodeBackend>>,
}

impl NodeClient {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http: reqwest::Client::new(),
            node_url: config.node_url.clone(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
            streaming_supported: config.streaming_enabled(),
            #[cfg(test)]
            mock_backend: None,
        })
    }

    #[cfg(test)]
    pub fn new_mock(backend: Arc<dyn MockNodeBackend>) -> Self {
        Self {
            http: reqwest::Client::new(),
            node_url: "http://localhost:9550".to_string(),
            api_key: None,
            page_size: 30,
            streaming_supported: true,
            mock_backend: Some(backend),
        }
    }

    #[cfg(test)]
    pub fn with_streaming_supported(mut self, enabled: bool) -> Self {
        self.streaming_supported = enabled;
        self
    }

    /// Whether the selected node/provider delivers incremental events. When
    /// false, callers reconcile turns by polling `fetch_page`.
    pub fn supports_streaming(&self) -> bool {
        self.streaming_supported
    }

    /// Dispatch a user turn. A 2xx response means the node accepted the job;
    /// any other status carries the node's rejection reason in the body.
    pub async fn send_turn(
        &self,
        conversation_id: &str,
        payload: &SendPayload,
    ) -> Result<JobHandle> {
        #[cfg(test)]
        {
            if let Some(backend) = &self.mock_backend {
                return backend.send_turn(conversation_id, payload);
            }
        }

        let request_url = format!(
            "{}/v2/conversations/{conversation_id}/messages",
            self.node_url
        );

        if debug_payload_enabled() {
            let body = serde_json::to_value(payload)
                .unwrap_or_else(|_| serde_json::Value::String("<unserializable>".to_string()));
            emit_debug_payload(&request_url, &body);
        }

        let response = self
            .authorized(self.http.post(&request_url))
            .json(payload)
            .send()
            .await
            .map_err(|error| map_node_request_error(error, &request_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "node '{}' rejected the send with HTTP {}: {}",
                request_url,
                status,
                body.trim()
            ));
        }

        let handle = response
            .json::<JobHandle>()
            .await
            .map_err(|error| map_node_request_error(error, &request_url))?;
        Ok(handle)
    }

    /// Open the per-job SSE stream of `TurnEvent` frames.
    pub async fn open_event_stream(&self, job: &JobHandle) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(backend) = &self.mock_backend {
                return backend.open_event_stream(job);
            }
        }

        let request_url = format!(
            "{}/v2/conversations/{}/jobs/{}/events",
            self.node_url, job.conversation_id, job.job_id
        );

        let response = self
            .authorized(self.http.get(&request_url))
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|error| map_node_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_node_request_error(error, &request_url))?;

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_node_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    /// Fetch one page of history. `cursor` of `None` returns the newest page;
    /// otherwise the page strictly older than the cursor.
    pub async fn fetch_page(&self, conversation_id: &str, cursor: Option<&str>) -> Result<Page> {
        #[cfg(test)]
        {
            if let Some(backend) = &self.mock_backend {
                return backend.fetch_page(conversation_id, cursor);
            }
        }

        let request_url = format!(
            "{}/v2/conversations/{conversation_id}/messages",
            self.node_url
        );

        let mut request = self
            .authorized(self.http.get(&request_url))
            .query(&[("limit", self.page_size.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("before", cursor)]);
        }

        let page = request
            .send()
            .await
            .map_err(|error| map_node_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_node_request_error(error, &request_url))?
            .json::<Page>()
            .await
            .map_err(|error| map_node_request_error(error, &request_url))?;
        Ok(page)
    }

    /// Ask the node to stop generating for the job. A 2xx response is the
    /// acknowledgment; the turn stays running until it arrives.
    pub async fn request_stop(&self, job: &JobHandle) -> Result<()> {
        #[cfg(test)]
        {
            if let Some(backend) = &self.mock_backend {
                return backend.request_stop(job);
            }
        }

        let request_url = format!(
            "{}/v2/conversations/{}/jobs/{}/stop",
            self.node_url, job.conversation_id, job.job_id
        );

        self.authorized(self.http.post(&request_url))
            .send()
            .await
            .map_err(|error| map_node_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_node_request_error(error, &request_url))?;
        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) => request.header("authorization", format!("Bearer {api_key}")),
            None => request,
        }
    }
}

fn map_node_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && crate::config::is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local node '{}': {}. Start the node or update SHINKAI_NODE_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach node '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("request to node '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!("node '{}' returned HTTP {}: {}", request_url, status, error);
    }
    anyhow!("request to node '{}' failed: {}", request_url, error)
}
