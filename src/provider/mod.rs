use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::cli::ProviderKind;
use crate::config::Config;

pub mod ollama;
pub mod openai;
#[cfg(test)]
pub mod scripted;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Part {
    Text(String),
    /// Data URL (`data:image/png;base64,...`) or a remote image URL.
    Image(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Part>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self { role, content: vec![Part::Text(text.into())] }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Text parts joined with blank lines; images are skipped.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Completion {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the backend to constrain output to a single JSON object.
    pub json_object: bool,
}

impl Completion {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, ..Default::default() }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_object = true;
        self
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// One chat completion; returns the first choice's text.
    async fn complete(&self, req: &Completion) -> Result<String>;

    /// One embedding vector per input, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub type DynProvider = Arc<dyn Provider>;

pub fn make_provider(cfg: &Config) -> Result<DynProvider> {
    match cfg.provider {
        ProviderKind::OpenAI => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow!("OPENAI_API_KEY env var is not set"))?;
            Ok(Arc::new(openai::OpenAIProvider::new(
                cfg.openai_url.clone(),
                api_key,
                cfg.model.clone(),
                cfg.embedding_model.clone(),
                cfg.timeout_secs,
            )?))
        }
        ProviderKind::Ollama => {
            let url = cfg
                .ollama_url
                .clone()
                .ok_or_else(|| anyhow!("ollama provider selected but no ollama_url configured"))?;
            Ok(Arc::new(ollama::Ollama::new(
                url,
                cfg.model.clone(),
                cfg.embedding_model.clone(),
                cfg.timeout_secs,
            )?))
        }
    }
}

/// Extracts the first top-level JSON object substring from a string.
/// Handles nested braces and braces inside string literals; returns None if
/// no balanced object is found.
pub fn extract_first_json_object(s: &str) -> Option<&str> {
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in s.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                start.get_or_insert(i);
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|st| &s[st..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_inside_prose() {
        let raw = "Sure! Here it is:\n{\"a\": {\"b\": \"}\"}, \"c\": 1}\nThanks";
        assert_eq!(extract_first_json_object(raw), Some("{\"a\": {\"b\": \"}\"}, \"c\": 1}"));
    }

    #[test]
    fn unbalanced_object_is_none() {
        assert_eq!(extract_first_json_object("{\"a\": 1"), None);
        assert_eq!(extract_first_json_object("no json here"), None);
    }

    #[test]
    fn joined_text_skips_images() {
        let msg = Message {
            role: Role::User,
            content: vec![
                Part::Image("data:image/png;base64,AAAA".into()),
                Part::Text("one".into()),
                Part::Text("two".into()),
            ],
        };
        assert_eq!(msg.joined_text(), "one\n\ntwo");
    }
}
