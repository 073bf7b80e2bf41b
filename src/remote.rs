//! Remote store: the authoritative chat API, consumed over HTTP.
//!
//! DESIGN
//! ======
//! `RemoteStore` is the seam: the session only ever talks to the trait, so
//! tests swap in a mock and the HTTP client stays a thin wrapper. Response
//! decoding lives in pure `parse_*` functions for testability.
//!
//! Every method is a single request with no retries; the next scheduler
//! tick is the retry.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Serialize;

use crate::config::SyncConfig;
use crate::error::RemoteError;
use crate::model::{Attachment, Message, RemoteTopic};

// =============================================================================
// TRAIT
// =============================================================================

/// A message on its way to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub author_id: String,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<i64>,
    pub topic_id: String,
}

/// Remote chat API. Enables mocking in tests.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// `GET /topics`.
    async fn list_topics(&self) -> Result<Vec<RemoteTopic>, RemoteError>;

    /// `POST /topics`.
    async fn create_topic(&self, topic: &RemoteTopic) -> Result<(), RemoteError>;

    /// `DELETE /topics/{id}`.
    async fn delete_topic(&self, topic_id: &str) -> Result<(), RemoteError>;

    /// `GET /messages?topic_id={id}`, newest first.
    async fn list_messages(&self, topic_id: &str) -> Result<Vec<Message>, RemoteError>;

    /// `POST /messages` for text-only sends.
    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), RemoteError>;

    /// `POST /upload` (multipart) for sends carrying a file.
    async fn upload(&self, message: &OutgoingMessage, attachment: &Attachment) -> Result<(), RemoteError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpRemote {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    /// Build a client for `config.api_base_url` with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the TLS backend cannot be initialized.
    pub fn new(config: &SyncConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| RemoteError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.api_base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteError::Status { status: status.as_u16(), body: text });
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl RemoteStore for HttpRemote {
    async fn list_topics(&self) -> Result<Vec<RemoteTopic>, RemoteError> {
        let text = self.send(self.http.get(self.url("/topics"))).await?;
        parse_topics(&text)
    }

    async fn create_topic(&self, topic: &RemoteTopic) -> Result<(), RemoteError> {
        self.send(self.http.post(self.url("/topics")).json(topic))
            .await
            .map(drop)
    }

    async fn delete_topic(&self, topic_id: &str) -> Result<(), RemoteError> {
        let url = topic_url(&self.base_url, topic_id)?;
        self.send(self.http.delete(url))
            .await
            .map(drop)
    }

    async fn list_messages(&self, topic_id: &str) -> Result<Vec<Message>, RemoteError> {
        let request = self
            .http
            .get(self.url("/messages"))
            .query(&[("topic_id", topic_id)]);
        let text = self.send(request).await?;
        parse_messages(&text)
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), RemoteError> {
        self.send(self.http.post(self.url("/messages")).json(message))
            .await
            .map(drop)
    }

    async fn upload(&self, message: &OutgoingMessage, attachment: &Attachment) -> Result<(), RemoteError> {
        let form = upload_form(message, attachment);
        self.send(self.http.post(self.url("/upload")).multipart(form))
            .await
            .map(drop)
    }
}

// =============================================================================
// WIRE HELPERS
// =============================================================================

/// `DELETE` target for a topic; the id is percent-encoded as one segment.
fn topic_url(base_url: &str, topic_id: &str) -> Result<reqwest::Url, RemoteError> {
    let mut url = reqwest::Url::parse(base_url).map_err(|e| RemoteError::Request(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| RemoteError::Request(format!("base url cannot take a path: {base_url}")))?
        .pop_if_empty()
        .extend(["topics", topic_id]);
    Ok(url)
}

fn upload_form(message: &OutgoingMessage, attachment: &Attachment) -> Form {
    let file = Part::bytes(attachment.bytes.clone()).file_name(attachment.file_name.clone());
    let mut form = Form::new()
        .part("file", file)
        .text("authorId", message.author_id.clone())
        .text("authorName", message.author_name.clone())
        .text("topicId", message.topic_id.clone());
    if let Some(content) = &message.content {
        form = form.text("content", content.clone());
    }
    if let Some(reply_to_id) = message.reply_to_id {
        form = form.text("replyToId", reply_to_id.to_string());
    }
    form
}

fn parse_topics(json: &str) -> Result<Vec<RemoteTopic>, RemoteError> {
    serde_json::from_str(json).map_err(|e| RemoteError::Parse(e.to_string()))
}

fn parse_messages(json: &str) -> Result<Vec<Message>, RemoteError> {
    serde_json::from_str(json).map_err(|e| RemoteError::Parse(e.to_string()))
}

#[cfg(test)]
#[path = "remote_test.rs"]
mod tests;
