use fs_err as fs;
use serde_json::{json, to_string_pretty};
use std::path::Path;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use crate::provider::Completion;

/// `RUST_LOG` wins when set; otherwise `info`, or `debug` for this crate
/// when `--debug` is passed.
pub fn init(debug: bool) {
    let fallback = if debug { "info,zoltrak=debug,tower_http=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    if let Err(e) = fmt().with_env_filter(filter).with_target(false).try_init() {
        warn!(error = %e, "tracing init failed");
    }
}

/// Writes one completion exchange as `<root>/<tx>/<stage>.{request,response}.json`.
pub fn save_exchange(
    root: &Path,
    tx: Uuid,
    stage: &str,
    req: &Completion,
    reply: &str,
) -> anyhow::Result<()> {
    let dir = root.join(tx.to_string());
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(format!("{stage}.request.json")), to_string_pretty(req)?)?;
    fs::write(dir.join(format!("{stage}.response.json")), to_string_pretty(&json!({ "content": reply }))?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    #[test]
    fn writes_request_and_response_under_tx_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let tx = Uuid::new_v4();
        let req = Completion::new(vec![Message::user("hello")]).temperature(0.2);

        save_exchange(tmp.path(), tx, "generate", &req, "hi there").unwrap();
        let dir = tmp.path().join(tx.to_string());

        let body: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("generate.request.json")).unwrap()).unwrap();
        assert_eq!(body["messages"][0]["role"], "user");
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);

        let reply: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("generate.response.json")).unwrap()).unwrap();
        assert_eq!(reply["content"], "hi there");
    }
}
