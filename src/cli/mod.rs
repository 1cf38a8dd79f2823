use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(name = "openai", alias = "open-ai")]
    OpenAI,
    Ollama,
}

#[derive(Parser, Debug)]
#[command(name = "zoltrak", version, about = "Zoltrak website assistant API server")]
pub struct Args {
    /// Optional TOML config file; environment and flags override it.
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_aliases() {
        let args = Args::parse_from(["zoltrak", "--provider", "open-ai", "--bind", "127.0.0.1:9000"]);
        assert_eq!(args.provider, Some(ProviderKind::OpenAI));
        assert_eq!(args.bind.as_deref(), Some("127.0.0.1:9000"));
        assert!(!args.debug);
    }
}
