use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{RoomId, ThreadId},
    error::{ApiError, ApiException},
    protocol::{DirectMessageRequest, GifSearchResponse, RoomMessageRequest, UploadedImage},
};
use tracing::debug;
use url::Url;

use crate::{
    config::ComposerSettings, types::PendingFile, AttachmentUploader, ChannelRefresher,
    DirectMessageSender, GifSearcher, RoomMessageSender,
};

/// reqwest client for the chat API. Implements every network collaborator the composer
/// and the tab controller use.
#[derive(Clone)]
pub struct HttpChatBackend {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpChatBackend {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn from_settings(settings: &ComposerSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build http client")?;
        Self::with_client(http, &settings.api_base_url, settings.api_token.clone())
    }

    fn with_client(http: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid api url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("api url '{base_url}' cannot carry a path"));
        }
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn direct_threads_refresher(self: &Arc<Self>) -> Arc<dyn ChannelRefresher> {
        Arc::new(EndpointRefresher {
            backend: Arc::clone(self),
            segments: &["api", "debug", "direct-messages", "threads"],
        })
    }

    pub fn friend_graph_refresher(self: &Arc<Self>) -> Arc<dyn ChannelRefresher> {
        Arc::new(EndpointRefresher {
            backend: Arc::clone(self),
            segments: &["api", "debug", "friends", "overview"],
        })
    }

    /// Appends percent-encoded path segments to the base url.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("api url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Non-2xx responses become [`ApiException`] carrying the server's `message`.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .ok()
        .map(|error| error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
    debug!(status = status.as_u16(), "chat api request failed: {message}");
    Err(ApiException::new(status.as_u16(), message).into())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    Ok(response.json().await?)
}

#[async_trait]
impl AttachmentUploader for HttpChatBackend {
    async fn upload(&self, file: &PendingFile) -> Result<UploadedImage> {
        let mut part = multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        if let Some(mime) = &file.mime_type {
            part = part
                .mime_str(mime)
                .with_context(|| format!("invalid mime type '{mime}'"))?;
        }
        let form = multipart::Form::new().part("image", part);
        let url = self.endpoint(&["api", "media", "images"])?;
        let response = self
            .request(Method::POST, url)
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }
}

#[async_trait]
impl GifSearcher for HttpChatBackend {
    async fn search(&self, query: &str, limit: usize) -> Result<GifSearchResponse> {
        let url = self.endpoint(&["api", "chats", "gif-search"])?;
        let response = self
            .request(Method::GET, url)
            .query(&[("q", query.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;
        read_json(response).await
    }
}

#[async_trait]
impl RoomMessageSender for HttpChatBackend {
    async fn send_room_message(
        &self,
        room_id: &RoomId,
        request: RoomMessageRequest,
    ) -> Result<bool> {
        let url = self.endpoint(&["api", "chats", "rooms", room_id.as_str(), "messages"])?;
        let response = self
            .request(Method::POST, url)
            .json(&request)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(true)
    }
}

#[async_trait]
impl DirectMessageSender for HttpChatBackend {
    async fn send_direct_message(
        &self,
        thread_id: &ThreadId,
        request: DirectMessageRequest,
    ) -> Result<()> {
        let url = self.endpoint(&[
            "api",
            "debug",
            "direct-messages",
            "threads",
            thread_id.as_str(),
            "messages",
        ])?;
        let response = self
            .request(Method::POST, url)
            .json(&request)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

/// GETs a listing endpoint so the server-side view is fresh; the body is not used here.
struct EndpointRefresher {
    backend: Arc<HttpChatBackend>,
    segments: &'static [&'static str],
}

#[async_trait]
impl ChannelRefresher for EndpointRefresher {
    async fn refresh(&self) -> Result<()> {
        let url = self.backend.endpoint(self.segments)?;
        let response = self.backend.request(Method::GET, url).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
