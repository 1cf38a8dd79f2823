use anyhow::Context;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::{Args, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub provider: ProviderKind,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub openai_url: String,
    pub ollama_url: Option<String>,
    /// Unset means the in-memory store is used.
    pub supabase_url: Option<String>,
    pub history_window: usize,
    pub chunk_chars: usize,
    pub brand_text_limit: usize,
    pub trial_days: i64,
    pub inspiration_count: usize,
    pub max_upload_bytes: usize,
    pub transcript_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".into(),
            provider: ProviderKind::OpenAI,
            model: "gpt-4o".into(),
            embedding_model: "text-embedding-3-small".into(),
            timeout_secs: 300,
            openai_url: "https://api.openai.com/v1".into(),
            ollama_url: Some("http://localhost:11434".into()),
            supabase_url: None,
            history_window: 10,
            chunk_chars: 1000,
            brand_text_limit: 4000,
            trial_days: 7,
            inspiration_count: 3,
            max_upload_bytes: 20 * 1024 * 1024,
            transcript_dir: None,
        }
    }
}

impl Config {
    /// File, then environment, then command-line flags.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::from_file(Path::new(path))?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.apply_args(args);
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ZOLTRAK_BIND") {
            self.bind = v;
        }
        if let Some(v) = var("ZOLTRAK_MODEL") {
            self.model = v;
        }
        if let Some(v) = var("SUPABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.supabase_url = Some(v);
        }
        if let Some(v) = var("OLLAMA_URL") {
            self.ollama_url = Some(v);
        }
        if let Some(v) = var("ZOLTRAK_TRANSCRIPT_DIR") {
            self.transcript_dir = Some(v);
        }
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(bind) = &args.bind {
            self.bind = bind.clone();
        }
        if let Some(provider) = args.provider {
            self.provider = provider;
        }
        if let Some(model) = &args.model {
            self.model = model.clone();
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str("model = \"gpt-4o-mini\"\nhistory_window = 4\n").unwrap();
        assert_eq!(cfg.model, "gpt-4o-mini");
        assert_eq!(cfg.history_window, 4);
        assert_eq!(cfg.chunk_chars, 1000);
        assert_eq!(cfg.trial_days, 7);
    }

    #[test]
    fn env_then_flags_override() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ZOLTRAK_MODEL", "env-model"),
            ("SUPABASE_URL", "https://demo.supabase.co"),
            ("ZOLTRAK_BIND", "127.0.0.1:8080"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.supabase_url.as_deref(), Some("https://demo.supabase.co"));

        let args = Args::parse_from(["zoltrak", "--model", "flag-model"]);
        cfg.apply_args(&args);
        assert_eq!(cfg.model, "flag-model");
        assert_eq!(cfg.bind, "127.0.0.1:8080");
    }

    #[test]
    fn blank_supabase_url_is_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env(|k| (k == "SUPABASE_URL").then(|| "  ".to_string()));
        assert!(cfg.supabase_url.is_none());
    }
}
