use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{Completion, Message, Part, Provider};

/// OpenAI-compatible chat completions and embeddings.
pub struct OpenAIProvider {
    api_base: String,
    api_key: String,
    model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(
        api_base: String,
        api_key: String,
        model: String,
        embedding_model: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self { api_base, api_key, model, embedding_model, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<String> {
        let url = self.url(path);
        tracing::debug!(%url, "openai request");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("openai request to {path} failed"))?;

        let status = resp.status();
        let text = resp.text().await.context("openai read body failed")?;
        if !status.is_success() {
            return Err(anyhow!("OpenAI API error ({}): {}", status, text));
        }
        Ok(text)
    }
}

fn wire_message(m: &Message) -> Value {
    // Plain string content for text-only turns keeps the payload identical
    // to what non-vision models expect.
    let content = match m.content.as_slice() {
        [Part::Text(t)] => json!(t),
        parts => Value::Array(
            parts
                .iter()
                .map(|p| match p {
                    Part::Text(t) => json!({ "type": "text", "text": t }),
                    Part::Image(url) => json!({ "type": "image_url", "image_url": { "url": url } }),
                })
                .collect(),
        ),
    };
    json!({ "role": m.role, "content": content })
}

pub(crate) fn chat_body(model: &str, req: &Completion) -> Value {
    let mut body = json!({
        "model": model,
        "messages": req.messages.iter().map(wire_message).collect::<Vec<_>>(),
    });
    if let Some(t) = req.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(n) = req.max_tokens {
        body["max_tokens"] = json!(n);
    }
    if req.json_object {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn complete(&self, req: &Completion) -> Result<String> {
        #[derive(Deserialize)]
        struct ChatMessage {
            #[serde(default)]
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessage,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        let text = self.post("chat/completions", &chat_body(&self.model, req)).await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse OpenAI response: {e}\nRaw: {text}"))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI returned no completion choices"))
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(Deserialize)]
        struct Datum {
            index: usize,
            embedding: Vec<f32>,
        }
        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<Datum>,
        }

        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({ "model": self.embedding_model, "input": inputs });
        let text = self.post("embeddings", &body).await?;
        let mut parsed: EmbeddingResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse OpenAI embeddings: {e}"))?;
        if parsed.data.len() != inputs.len() {
            return Err(anyhow!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            ));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
