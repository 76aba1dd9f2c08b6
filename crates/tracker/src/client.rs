use crate::layer::NetworkLayer;
use curtain_core::OverlayError;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

/// HTTP client whose requests are visible to the overlay.
///
/// Each call is one request scope covering both the response head and the
/// body read.
#[derive(Clone)]
pub struct TrackedClient {
    client: Client,
    layer: NetworkLayer,
}

impl TrackedClient {
    pub fn new(layer: NetworkLayer) -> Self {
        Self::with_client(Client::new(), layer)
    }

    pub fn with_client(client: Client, layer: NetworkLayer) -> Self {
        Self { client, layer }
    }

    pub fn layer(&self) -> &NetworkLayer {
        &self.layer
    }

    /// Sends a GET and checks the status. The caller holds the request
    /// scope so it also covers the body read.
    async fn send(&self, url: &str) -> Result<Response, OverlayError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| to_overlay_error(e, url))
    }

    pub async fn get_text(&self, url: &str) -> Result<String, OverlayError> {
        let _scope = self.layer.begin_request();
        let response = self.send(url).await?;
        response.text().await.map_err(|e| to_overlay_error(e, url))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, OverlayError> {
        let _scope = self.layer.begin_request();
        let response = self.send(url).await?;
        response.json().await.map_err(|e| to_overlay_error(e, url))
    }
}

pub fn to_overlay_error(e: reqwest::Error, url: &str) -> OverlayError {
    let context = json!({ "url": url, "status": e.status().map(|s| s.as_u16()) });
    let err = if e.is_timeout() {
        OverlayError::timeout_error(format!("request timed out: {}", e))
    } else if e.is_decode() {
        OverlayError::parsing_error(format!("response decode failed: {}", e))
    } else {
        OverlayError::network_error(format!("request failed: {}", e))
    };
    err.with_context(context)
}
