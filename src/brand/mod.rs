use anyhow::{bail, Context, Result};
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::prompt;
use crate::provider::{extract_first_json_object, Provider};
use crate::store::{BrandAssets, FontPair, Store, MAX_PALETTE};

pub const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

static BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<body(?:[^>"']|"[^"]*"|'[^']*')*>(.*)</body>"#).expect("valid regex")
});
static INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<!--.*?-->")
        .expect("valid regex")
});
// Quoted attribute values may contain `>`.
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"</?[A-Za-z!](?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("valid regex"));
static SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandAnalysis {
    pub color_palette: Vec<String>,
    pub font_pair: FontPair,
}

/// Only absolute http(s) URLs are fetched.
pub fn parse_target(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Body text with scripts, styles and markup removed, whitespace collapsed,
/// truncated to `limit` characters.
pub fn visible_text(html: &str, limit: usize) -> String {
    let body = BODY.captures(html).and_then(|c| c.get(1)).map_or(html, |m| m.as_str());
    let stripped = INVISIBLE.replace_all(body, " ");
    let text = TAG.replace_all(&stripped, " ");
    let text = decode_entities(&text);
    let collapsed = SPACE.replace_all(&text, " ");
    collapsed.trim().chars().take(limit).collect()
}

/// `None` when the reply is not a usable analysis.
pub fn parse_analysis(raw: &str) -> Option<BrandAnalysis> {
    let json = extract_first_json_object(raw)?;
    match serde_json::from_str::<BrandAnalysis>(json) {
        Ok(mut a) => {
            a.color_palette.truncate(MAX_PALETTE);
            Some(a)
        }
        Err(e) => {
            tracing::warn!(error = %e, "brand analysis had an unexpected shape");
            None
        }
    }
}

pub async fn fetch_page(client: &Client, url: Url) -> Result<String> {
    let resp = client
        .get(url.clone())
        .header(reqwest::header::USER_AGENT, BROWSER_UA)
        .send()
        .await
        .with_context(|| format!("fetching {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        bail!("Failed to fetch the website. Status: {status}");
    }
    resp.text().await.context("reading page body")
}

pub async fn scan(
    client: &Client,
    provider: &dyn Provider,
    store: &dyn Store,
    user_id: &str,
    url: Url,
    text_limit: usize,
) -> Result<Option<BrandAnalysis>> {
    let html = fetch_page(client, url).await?;
    analyze(provider, store, user_id, &html, text_limit).await
}

/// Runs the analysis over a fetched page and saves it. Returns `None`,
/// writing nothing, when the model's answer cannot be used.
pub async fn analyze(
    provider: &dyn Provider,
    store: &dyn Store,
    user_id: &str,
    html: &str,
    text_limit: usize,
) -> Result<Option<BrandAnalysis>> {
    let text = visible_text(html, text_limit);
    let reply = provider
        .complete(&prompt::brand_analysis(&text))
        .await
        .context("brand analysis completion")?;

    let Some(analysis) = parse_analysis(&reply) else {
        return Ok(None);
    };
    store
        .upsert_brand_assets(&BrandAssets {
            color_palette: Some(analysis.color_palette.clone()),
            font_pair: Some(analysis.font_pair.clone()),
            ..BrandAssets::for_user(user_id)
        })
        .await
        .context("saving brand assets")?;
    Ok(Some(analysis))
}
