use serde::{Deserialize, Serialize};

pub const INDEX_MARKER: &str = "---[index.html]---";
pub const STYLE_MARKER: &str = "---[style.css]---";
pub const SCRIPT_MARKER: &str = "---[script.js]---";
pub const SUGGESTIONS_MARKER: &str = "---[suggestions]---";

const HTML_FENCE: &str = "```html";
const FENCE: &str = "```";
pub const DEFAULT_VISUAL_TEXT: &str = "Here are the changes you requested.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFiles {
    pub html: String,
    pub css: String,
    pub js: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Project { files: ProjectFiles, suggestions: Vec<String> },
    Visual { html: String, text: String, suggestions: Vec<String> },
    Text { text: String, suggestions: Vec<String> },
}

pub fn parse(raw: &str) -> Reply {
    let (body, suggestions) = split_suggestions(raw);

    if body.contains(INDEX_MARKER) {
        return Reply::Project { files: split_project(body), suggestions };
    }

    if let Some((html, text)) = extract_html_block(body) {
        let text = if text.is_empty() { DEFAULT_VISUAL_TEXT.to_string() } else { text };
        return Reply::Visual { html, text, suggestions };
    }

    Reply::Text { text: raw.to_string(), suggestions }
}

/// Splits off the trailing suggestions section. The body is everything
/// before the delimiter; suggestions are empty when the delimiter is missing
/// or not followed by a JSON array of strings.
pub fn split_suggestions(raw: &str) -> (&str, Vec<String>) {
    let Some(at) = raw.find(SUGGESTIONS_MARKER) else {
        return (raw, Vec::new());
    };
    let body = &raw[..at];
    let tail = raw[at + SUGGESTIONS_MARKER.len()..].trim_start();

    let suggestions = match (tail.starts_with('['), tail.rfind(']')) {
        (true, Some(end)) => match serde_json::from_str::<Vec<String>>(&tail[..=end]) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparseable suggestions");
                Vec::new()
            }
        },
        _ => Vec::new(),
    };
    (body, suggestions)
}

fn section<'a>(body: &'a str, start: &str, end: Option<&str>) -> &'a str {
    let Some(at) = body.find(start) else {
        return "";
    };
    let rest = &body[at + start.len()..];
    let rest = match end.and_then(|e| rest.find(e)) {
        Some(stop) => &rest[..stop],
        None => rest,
    };
    rest.trim()
}

fn split_project(body: &str) -> ProjectFiles {
    ProjectFiles {
        html: section(body, INDEX_MARKER, Some(STYLE_MARKER)).to_string(),
        css: section(body, STYLE_MARKER, Some(SCRIPT_MARKER)).to_string(),
        js: section(body, SCRIPT_MARKER, None).to_string(),
    }
}

/// First fenced html block: `(inner html, surrounding text)`, both trimmed.
/// An unterminated block runs to the end of the text.
fn extract_html_block(body: &str) -> Option<(String, String)> {
    let open = body.find(HTML_FENCE)?;
    let inner_start = open + HTML_FENCE.len();
    let (inner, after) = match body[inner_start..].find(FENCE) {
        Some(close) => (
            &body[inner_start..inner_start + close],
            &body[inner_start + close + FENCE.len()..],
        ),
        None => (&body[inner_start..], ""),
    };

    let mut text = String::with_capacity(open + after.len());
    text.push_str(&body[..open]);
    text.push_str(after);
    Some((inner.trim().to_string(), text.trim().to_string()))
}
