use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::{Completion, Provider};

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    pub requests: Mutex<Vec<Completion>>,
    pub embedded: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|s| Ok(s.into())).collect()),
            ..Default::default()
        }
    }

    pub fn push_err(&self, msg: &str) {
        self.replies.lock().push_back(Err(msg.to_string()));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, req: &Completion) -> Result<String> {
        self.requests.lock().push(req.clone());
        match self.replies.lock().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("scripted provider has no reply queued")),
        }
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedded.lock().extend(inputs.iter().cloned());
        Ok(inputs.iter().map(|s| vec![s.chars().count() as f32, 1.0]).collect())
    }
}
