use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Completion, Message, Part, Provider, Role};

pub struct Ollama {
    pub url: String,
    pub model: String,
    pub embedding_model: String,
    client: Client,
}

impl Ollama {
    pub fn new(url: String, model: String, embedding_model: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self { url, model, embedding_model, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), path)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Serialize, Default)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Serialize)]
struct Msg {
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    content: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama wants bare base64 image payloads, not data URLs.
fn strip_data_url(url: &str) -> String {
    match url.split_once(";base64,") {
        Some((_, data)) => data.to_string(),
        None => url.to_string(),
    }
}

fn to_msg(m: &Message) -> Msg {
    let images = m
        .content
        .iter()
        .filter_map(|p| match p {
            Part::Image(url) => Some(strip_data_url(url)),
            Part::Text(_) => None,
        })
        .collect();
    Msg { role: m.role, content: m.joined_text(), images }
}

#[async_trait]
impl Provider for Ollama {
    async fn complete(&self, req: &Completion) -> Result<String> {
        let url = self.endpoint("api/chat");
        let body = ChatRequest {
            model: &self.model,
            messages: req.messages.iter().map(to_msg).collect(),
            stream: false,
            format: req.json_object.then_some("json"),
            options: OllamaOptions { temperature: req.temperature, num_predict: req.max_tokens },
        };
        tracing::debug!(%url, "ollama request");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("ollama request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("ollama read body failed")?;
        if !status.is_success() {
            return Err(anyhow!("ollama error ({}): {}", status, text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("ollama response parse error: {e}"))?;
        Ok(parsed.message.content)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self
            .client
            .post(self.endpoint("api/embed"))
            .json(&serde_json::json!({ "model": self.embedding_model, "input": inputs }))
            .send()
            .await
            .context("ollama embed request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("ollama read body failed")?;
        if !status.is_success() {
            return Err(anyhow!("ollama error ({}): {}", status, text));
        }
        let parsed: EmbedResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("ollama embed parse error: {e}"))?;
        Ok(parsed.embeddings)
    }
}
